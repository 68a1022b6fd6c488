//! Song sequencing: positions, divisions and ticks.
//!
//! A [`Player`] borrows a [`Song`] for one playback session. For every
//! division it sets up the channels from their cells, runs the effect
//! processor, then resamples and mixes each channel once per tick. All
//! buffers are sized in [`Player::new`]; nothing allocates while playing.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use tp_ir::{Cell, Song};
use tracing::warn;

use crate::channel::ChannelState;
use crate::effects::{DivisionContext, EffectError, EffectProcessor};
use crate::frequency::{max_tick_buffer_size, min_tick_buffer_size};
use crate::mixer::{Mixer, MixerConfig, DEFAULT_BLOCK_SIZE};
use crate::resampler::{fill_clear, resample_tick};
use crate::sink::{AudioSink, DeviceError};
use crate::transport::{unpack_progress, Cursor, Timing};

/// Output rate used when none is given.
pub const DEFAULT_RATE: u32 = 22050;

/// Lowest output rate a player accepts: every tempo still gets a tick of
/// at least one sample.
pub const MIN_RATE: u32 = 102;

/// Highest output rate a player accepts.
pub const MAX_RATE: u32 = 384_000;

/// How channels are spread over the output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Layout {
    /// Everything in one lane
    #[default]
    Mono,
    /// Channels 1 and 4 left, 2 and 3 right
    AmigaStereo,
}

/// Playback session configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlayerConfig {
    /// Output rate in Hz
    pub rate: u32,
    /// Channel layout
    pub layout: Layout,
    /// Mixer block size in samples
    pub block_size: usize,
    /// Stop after this many output frames (checked between divisions)
    pub max_frames: Option<u64>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_RATE)
    }
}

impl PlayerConfig {
    pub fn new(rate: u32) -> Self {
        Self {
            rate,
            layout: Layout::Mono,
            block_size: DEFAULT_BLOCK_SIZE,
            max_frames: None,
        }
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
        self.max_frames = max_frames;
        self
    }

    /// Move to another output rate, keeping the frame limit the same length
    /// in time.
    pub fn with_rate(mut self, rate: u32) -> Self {
        if rate != self.rate && self.rate != 0 {
            let old = self.rate as u64;
            self.max_frames = self.max_frames.map(|frames| frames * rate as u64 / old);
        }
        self.rate = rate;
        self
    }

    /// Interleaved output channels for this layout.
    pub fn output_channels(&self) -> u16 {
        match self.layout {
            Layout::Mono => 1,
            Layout::AmigaStereo => 2,
        }
    }

    /// Mixer settings for a song with `channels` channels.
    pub fn mixer_config(&self, channels: usize) -> MixerConfig {
        let max_tick = max_tick_buffer_size(self.rate) as usize;
        let config = match self.layout {
            Layout::Mono => MixerConfig::mono(channels, max_tick),
            Layout::AmigaStereo => MixerConfig::amiga_stereo(channels, max_tick),
        };
        config.with_block_size(self.block_size)
    }
}

/// Stop flag and progress shared with whoever controls playback.
#[derive(Debug, Default)]
pub struct PlaybackControl {
    stop: AtomicBool,
    progress: AtomicU32,
}

impl PlaybackControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask playback to stop before the next division.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// The (song position, division) most recently started.
    pub fn progress(&self) -> (u8, u8) {
        unpack_progress(self.progress.load(Ordering::Relaxed))
    }

    fn report(&self, cursor: &Cursor) {
        self.progress.store(cursor.packed(), Ordering::Relaxed);
    }
}

/// What a finished playback session did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaybackSummary {
    /// Divisions processed, including ones skipped by a bad jump
    pub divisions: u64,
    /// Frames written to the sink
    pub frames: u64,
    /// Bad effects and bad jumps seen
    pub effect_faults: u32,
    /// Playback ended on the stop flag
    pub stopped: bool,
    /// Playback ended on the frame limit
    pub limited: bool,
}

/// One playback session over a borrowed song.
pub struct Player<'a> {
    song: &'a Song,
    config: PlayerConfig,
    channels: Vec<ChannelState>,
    timing: Timing,
    cursor: Cursor,
    effects: EffectProcessor,
    mixer: Mixer,
    tick_buf: Vec<u8>,
    frames_mixed: u64,
    summary: PlaybackSummary,
}

impl<'a> Player<'a> {
    /// Size every buffer for `song` at the configured rate.
    pub fn new(song: &'a Song, config: PlayerConfig) -> Result<Self, DeviceError> {
        if min_tick_buffer_size(config.rate) == 0 || config.rate > MAX_RATE {
            return Err(DeviceError::BadArg(format!(
                "output rate {} Hz is outside {}..={}",
                config.rate, MIN_RATE, MAX_RATE
            )));
        }
        if let Some(index) = song.misshapen_pattern() {
            return Err(DeviceError::BadArg(format!(
                "pattern {} does not hold 64 divisions of {} channels",
                index,
                song.channels()
            )));
        }
        let channels = song.channels() as usize;
        let mixer = Mixer::new(config.mixer_config(channels))?;
        let tick_len = max_tick_buffer_size(config.rate).max(1) as usize;
        Ok(Self {
            song,
            config,
            channels: vec![ChannelState::new(); channels],
            timing: Timing::new(config.rate),
            cursor: Cursor::default(),
            effects: EffectProcessor::new(),
            mixer,
            tick_buf: vec![0; tick_len],
            frames_mixed: 0,
            summary: PlaybackSummary::default(),
        })
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn channel(&self, index: usize) -> &ChannelState {
        &self.channels[index]
    }

    /// Interleaved output channels.
    pub fn output_channels(&self) -> u16 {
        self.mixer.output_channels()
    }

    /// Pattern cell for `channel` at the cursor; empty if the pattern is missing.
    fn cell(&self, channel: usize) -> Cell {
        let pattern = self.song.pattern_index(self.cursor.position);
        self.song
            .cell(pattern, self.cursor.division as usize, channel)
            .copied()
            .unwrap_or_default()
    }

    /// Load each channel's sample, position and division pitch from the
    /// current division's cells.
    pub fn setup_channels(&mut self) {
        for ch in 0..self.channels.len() {
            let cell = self.cell(ch);
            self.channels[ch].setup(&cell, self.song, self.config.rate);
        }
    }

    /// Run every channel's effect for the current division. Stops at the
    /// first faulty effect; channels after it keep last division's effect.
    pub fn process_effects(&mut self) -> Result<(), EffectError> {
        for ch in 0..self.channels.len() {
            let cell = self.cell(ch);
            let mut ctx = DivisionContext {
                timing: &mut self.timing,
                cursor: &mut self.cursor,
                song_length: self.song.length,
            };
            self.effects.apply(ch, &mut self.channels[ch], &cell, &mut ctx)?;
        }
        Ok(())
    }

    /// Resample and mix every tick of the current division.
    pub fn play_division<S: AudioSink + ?Sized>(&mut self, sink: &mut S) -> Result<(), DeviceError> {
        let song = self.song;
        let timing = self.timing;
        let len = timing.tick_buffer_size as usize;
        for tick in 0..timing.ticks_per_division as u32 {
            for ch in 0..self.channels.len() {
                let buf = &mut self.tick_buf[..len];
                let state = &mut self.channels[ch];
                let sample = state.sample.and_then(|i| song.samples.get(i));
                realtime(|| match sample {
                    Some(sample) => resample_tick(state, sample, tick, &timing, buf),
                    None => fill_clear(state, buf),
                });
                if self.mixer.mix(ch, buf, sink)? != 0 {
                    return Err(DeviceError::BadArg(format!(
                        "mix ring of {} slots cannot hold a tick",
                        self.mixer.capacity()
                    )));
                }
            }
        }
        self.frames_mixed += timing.division_len() as u64;
        Ok(())
    }

    /// Play the division under the cursor. Effect faults are logged and
    /// counted; a bad jump skips the division's audio.
    pub fn step<S: AudioSink + ?Sized>(&mut self, sink: &mut S) -> Result<(), DeviceError> {
        self.setup_channels();
        let played = match self.process_effects() {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    position = self.cursor.position,
                    division = self.cursor.division,
                    %err,
                    "effect fault"
                );
                self.summary.effect_faults += 1;
                matches!(err, EffectError::BadEffect { .. })
            }
        };
        if played {
            self.play_division(sink)?;
        }
        self.summary.divisions += 1;
        Ok(())
    }

    /// Play from the cursor to the end of the song, the stop flag or the
    /// frame limit, then flush the mixer.
    pub fn play<S: AudioSink + ?Sized>(
        &mut self,
        sink: &mut S,
        control: &PlaybackControl,
    ) -> Result<PlaybackSummary, DeviceError> {
        let wanted = sink.channels();
        if wanted != 0 && wanted != self.output_channels() {
            return Err(DeviceError::BadArg(format!(
                "sink takes {} channels, player produces {}",
                wanted,
                self.output_channels()
            )));
        }

        let mut more = self.cursor.position < self.song.length;
        while more {
            if control.is_stopped() {
                self.summary.stopped = true;
                break;
            }
            if self.config.max_frames.is_some_and(|limit| self.frames_mixed >= limit) {
                self.summary.limited = true;
                break;
            }
            control.report(&self.cursor);
            self.step(sink)?;
            more = self.cursor.advance(self.song.length);
        }

        self.mixer.finish(sink)?;
        self.summary.frames = self.mixer.samples_out() / self.output_channels() as u64;
        Ok(self.summary)
    }
}

#[cfg(feature = "alloc_check")]
fn realtime<T>(f: impl FnOnce() -> T) -> T {
    assert_no_alloc::assert_no_alloc(f)
}

#[cfg(not(feature = "alloc_check"))]
fn realtime<T>(f: impl FnOnce() -> T) -> T {
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ActiveEffect;
    use crate::mixer::to_signed_centered;
    use tp_ir::{FormatTag, Pattern, Sample};

    /// A four-channel song with `patterns` empty patterns played in order.
    fn song(patterns: usize) -> Song {
        let mut song = Song::new("test", FormatTag::MK);
        let ramp: Vec<i8> = (0..100).map(|i| i as i8).collect();
        song.samples[0] = Sample::from_signed("ramp", 64, &ramp);
        for _ in 0..patterns {
            let idx = song.add_pattern(Pattern::new(4));
            song.push_sequence(idx);
        }
        song
    }

    fn one_division_song() -> Song {
        let mut s = song(1);
        *s.patterns[0].cell_mut(0, 0) = Cell::note(1, 428);
        s
    }

    #[test]
    fn single_note_division() {
        let song = one_division_song();
        let mut player = Player::new(&song, PlayerConfig::new(22050).with_block_size(2)).unwrap();
        player.setup_channels();
        player.process_effects().unwrap();

        assert_eq!(player.channel(0).increment, 12315);
        assert_eq!(player.timing().tick_buffer_size, 441);
        assert!(!player.channel(1).is_active());

        let mut out: Vec<i16> = Vec::new();
        player.play_division(&mut out).unwrap();
        assert_eq!(out.len(), 6 * 441);

        // Channel 1 reads the sample at 12315/32768 bytes per output sample;
        // channels 2-4 contribute their clear value of 0. Shift 6 for four channels.
        let data = &song.samples[0].data;
        for (n, &v) in out.iter().take(100).enumerate() {
            let pos = (n as u64 * 12315) >> 15;
            let expect = to_signed_centered((data[pos as usize] as u32) << 6);
            assert_eq!(v, expect, "sample {}", n);
        }
    }

    #[test]
    fn play_runs_whole_song() {
        let song = song(2);
        let mut player = Player::new(&song, PlayerConfig::new(8000)).unwrap();
        let mut out: Vec<i16> = Vec::new();
        let summary = player.play(&mut out, &PlaybackControl::new()).unwrap();

        assert_eq!(summary.divisions, 128);
        assert_eq!(summary.frames, 128 * 6 * 160);
        assert_eq!(out.len() as u64, summary.frames);
        assert!(!summary.stopped);
    }

    #[test]
    fn stop_flag_ends_before_first_division() {
        let song = song(1);
        let mut player = Player::new(&song, PlayerConfig::new(8000)).unwrap();
        let control = PlaybackControl::new();
        control.stop();
        let mut out: Vec<i16> = Vec::new();
        let summary = player.play(&mut out, &control).unwrap();
        assert!(summary.stopped);
        assert_eq!(summary.divisions, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn frame_limit_is_checked_between_divisions() {
        let song = song(1);
        let config = PlayerConfig::new(8000).with_max_frames(Some(1000));
        let mut player = Player::new(&song, config).unwrap();
        let mut out: Vec<i16> = Vec::new();
        let summary = player.play(&mut out, &PlaybackControl::new()).unwrap();
        assert!(summary.limited);
        // 960 frames per division: the second one crosses the limit
        assert_eq!(summary.divisions, 2);
        assert_eq!(summary.frames, 1920);
    }

    #[test]
    fn position_jump_resumes_at_division_zero() {
        let mut s = song(3);
        // Division 1 of position 0 jumps to position 2
        *s.patterns[0].cell_mut(1, 3) = Cell::empty().with_effect(0xB, 2);
        let mut player = Player::new(&s, PlayerConfig::new(8000)).unwrap();
        let mut out: Vec<i16> = Vec::new();
        let summary = player.play(&mut out, &PlaybackControl::new()).unwrap();
        assert_eq!(summary.divisions, 2 + 64);
        assert_eq!(summary.effect_faults, 0);
    }

    #[test]
    fn bad_jump_skips_division_audio() {
        let mut s = song(1);
        *s.patterns[0].cell_mut(0, 0) = Cell::empty().with_effect(0xB, 5);
        let mut player = Player::new(&s, PlayerConfig::new(8000)).unwrap();
        let mut out: Vec<i16> = Vec::new();
        let summary = player.play(&mut out, &PlaybackControl::new()).unwrap();
        assert_eq!(summary.effect_faults, 1);
        assert_eq!(summary.divisions, 64);
        assert_eq!(summary.frames, 63 * 6 * 160);
    }

    #[test]
    fn bad_effect_stops_later_channels_but_plays() {
        let mut s = song(1);
        *s.patterns[0].cell_mut(0, 1) = Cell::empty().with_effect(0x8, 0);
        *s.patterns[0].cell_mut(0, 2) = Cell::empty().with_effect(0xC, 0x10);
        let mut player = Player::new(&s, PlayerConfig::new(8000)).unwrap();
        player.setup_channels();
        let err = player.process_effects().unwrap_err();
        assert!(matches!(err, EffectError::BadEffect { channel: 1, .. }));
        // Channel 2's set-volume never ran
        assert_eq!(player.channel(2).volume, 0);

        let mut out: Vec<i16> = Vec::new();
        let summary = player.play(&mut out, &PlaybackControl::new()).unwrap();
        assert_eq!(summary.effect_faults, 1);
        assert_eq!(summary.frames, 64 * 6 * 160);
    }

    #[test]
    fn set_speed_changes_division_length() {
        let mut s = song(1);
        *s.patterns[0].cell_mut(0, 0) = Cell::empty().with_effect(0xF, 0x02);
        let mut player = Player::new(&s, PlayerConfig::new(8000)).unwrap();
        let mut out: Vec<i16> = Vec::new();
        let summary = player.play(&mut out, &PlaybackControl::new()).unwrap();
        assert_eq!(summary.frames, 64 * 2 * 160);
    }

    #[test]
    fn stereo_output_is_interleaved() {
        let song = song(1);
        let config = PlayerConfig::new(8000).with_layout(Layout::AmigaStereo);
        let mut player = Player::new(&song, config).unwrap();
        assert_eq!(player.output_channels(), 2);
        let mut out: Vec<i16> = Vec::new();
        let summary = player.play(&mut out, &PlaybackControl::new()).unwrap();
        assert_eq!(out.len() as u64, summary.frames * 2);
    }

    #[test]
    fn rejects_zero_rate() {
        let song = song(1);
        assert!(matches!(
            Player::new(&song, PlayerConfig::new(0)),
            Err(DeviceError::BadArg(_))
        ));
    }

    #[test]
    fn changing_rate_rescales_frame_limit() {
        let config = PlayerConfig::new(22050).with_max_frames(Some(22050 * 3));
        let moved = config.with_rate(48000);
        assert_eq!(moved.rate, 48000);
        assert_eq!(moved.max_frames, Some(48000 * 3));
        assert_eq!(config.with_rate(22050), config);
        assert_eq!(PlayerConfig::new(8000).with_rate(44100).max_frames, None);
    }

    #[test]
    fn rate_bounds_keep_every_tick_nonempty() {
        let song = song(1);
        for rate in [MIN_RATE - 1, MAX_RATE + 1] {
            assert!(matches!(
                Player::new(&song, PlayerConfig::new(rate)),
                Err(DeviceError::BadArg(_))
            ));
        }
        assert!(Player::new(&song, PlayerConfig::new(MIN_RATE)).is_ok());
        assert!(Player::new(&song, PlayerConfig::new(MAX_RATE)).is_ok());
    }

    #[test]
    fn fastest_tempo_at_lowest_rate_reaches_frame_limit() {
        let mut s = song(1);
        *s.patterns[0].cell_mut(0, 0) = Cell::empty().with_effect(0xF, 0xFF);
        *s.patterns[0].cell_mut(63, 0) = Cell::empty().with_effect(0xB, 0);
        let config = PlayerConfig::new(MIN_RATE).with_max_frames(Some(60));
        let mut player = Player::new(&s, config).unwrap();
        let mut out: Vec<i16> = Vec::new();
        let summary = player.play(&mut out, &PlaybackControl::new()).unwrap();

        assert_eq!(player.timing().tick_buffer_size, 1);
        assert!(summary.limited);
        assert_eq!(summary.divisions, 10);
        assert_eq!(summary.frames, 60);
    }

    #[test]
    fn pattern_narrower_than_song_is_rejected() {
        let mut s = Song::new("test", FormatTag::EightChannel);
        let idx = s.add_pattern(Pattern::new(4));
        s.push_sequence(idx);
        let err = Player::new(&s, PlayerConfig::new(8000)).err().unwrap();
        assert!(matches!(err, DeviceError::BadArg(_)));
        assert_eq!(err.code(), 256);
    }

    #[test]
    fn arpeggio_override_is_installed() {
        let mut s = song(1);
        *s.patterns[0].cell_mut(0, 0) = Cell::note(1, 428).with_effect(0x0, 0x47);
        let mut player = Player::new(&s, PlayerConfig::new(22050)).unwrap();
        player.setup_channels();
        player.process_effects().unwrap();
        assert!(matches!(player.channel(0).effect, ActiveEffect::Arpeggio(_)));
    }
}
