use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tp_engine::{PlaybackControl, Player, PlayerConfig};
use tp_ir::{Cell, FormatTag, Pattern, Sample, Song};

/// Eight channels of looping notes with an arpeggio and a slide running.
fn busy_song() -> Song {
    let mut song = Song::new("bench", FormatTag::EightChannel);
    let wave: Vec<i8> = (0..2048).map(|i| ((i % 64) as i8 - 32) * 3).collect();
    song.samples[0] = Sample::from_signed("saw", 64, &wave).with_loop(0, 2048);

    let mut pattern = Pattern::new(8);
    for div in (0..64).step_by(4) {
        for ch in 0..8 {
            let period = [428, 381, 339, 320, 285, 254, 226, 214][ch];
            let cell = match ch {
                0 => Cell::note(1, period).with_effect(0x0, 0x37),
                1 => Cell::note(1, period).with_effect(0x1, 0x02),
                2 => Cell::note(1, period).with_effect(0x2, 0x02),
                _ => Cell::note(1, period),
            };
            *pattern.cell_mut(div, ch) = cell;
        }
    }
    let idx = song.add_pattern(pattern);
    song.push_sequence(idx);
    song
}

fn bench_render_pattern(c: &mut Criterion) {
    let song = busy_song();
    let mut out: Vec<i16> = Vec::with_capacity(64 * 6 * 882 * 2);

    c.bench_function("render_pattern_8ch_44100", |b| {
        b.iter(|| {
            out.clear();
            let mut player = Player::new(&song, PlayerConfig::new(44100)).unwrap();
            let summary = player.play(&mut out, &PlaybackControl::new()).unwrap();
            black_box(summary.frames)
        })
    });
}

criterion_group!(benches, bench_render_pattern);
criterion_main!(benches);
