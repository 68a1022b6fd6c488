//! Fixed-point resampling of one channel for one tick.

use tp_ir::Sample;

use crate::channel::ChannelState;
use crate::frequency::FRAC_BITS;
use crate::transport::Timing;

/// Render one tick of `ch` into `out`, which holds exactly one tick.
///
/// Each slot reads the sample byte under the read position, scales it by
/// the channel volume (out of 64) and advances by the increment. At the
/// end of a looping sample the position wraps to the loop start; otherwise
/// the channel turns off and the rest of the tick repeats the last value.
pub fn resample_tick(ch: &mut ChannelState, sample: &Sample, tick: u32, timing: &Timing, out: &mut [u8]) {
    let volume = ch.volume.min(64) as u32;
    let end = ch.end().min(sample.data.len() as u32);
    let mut last = ch.clear_value;

    for slot in 0..out.len() {
        if let Some(inc) = ch.effect.next_increment(timing.division_pos(tick, slot as u32), timing) {
            ch.increment = inc;
        }

        let Some(&byte) = sample.data.get(ch.byte_offset()) else {
            stop(ch, last, &mut out[slot..]);
            return;
        };
        let value = ((byte as u32 * volume) >> 6) as u8;
        out[slot] = value;
        last = value;

        ch.position = ch.position.saturating_add(ch.increment);
        if (ch.position >> FRAC_BITS) >= end {
            if ch.has_loop() {
                ch.position = ch.repeat_point << FRAC_BITS;
            } else {
                stop(ch, value, &mut out[slot + 1..]);
                return;
            }
        }
    }
}

/// Fill a tick for a channel with nothing to play.
pub fn fill_clear(ch: &ChannelState, out: &mut [u8]) {
    out.fill(ch.clear_value);
}

fn stop(ch: &mut ChannelState, last: u8, rest: &mut [u8]) {
    ch.clear_value = last;
    ch.sample = None;
    rest.fill(last);
}
