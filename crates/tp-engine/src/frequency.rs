//! Period, increment and tick-size arithmetic.
//!
//! Pitch is carried as a 17.15 fixed-point increment: the amount added to a
//! channel's read position for every output sample. Slides work on a
//! 20-fractional-bit period instead, and convert back per sample.
//!
//! All intermediate products are computed in `u64`; the order of shifts and
//! divisions matches the reference integer formulas exactly, so the
//! truncation points (and thus the audible pitch) are reproducible.

/// PAL Amiga clock in Hz.
pub const AMIGA_CLOCK: u64 = 7_093_789;

/// Fractional bits of a read position or increment.
pub const FRAC_BITS: u32 = 15;

/// Fractional bits of a slide period.
pub const SLIDE_FRAC_BITS: u32 = 20;

/// Lowest period a slide may reach (highest pitch).
pub const PERIOD_MIN: u64 = 113;

/// Highest period a slide may reach (lowest pitch).
pub const PERIOD_MAX: u64 = 856;

/// Initial tempo of every module.
pub const DEFAULT_TEMPO: u32 = 125;

/// Initial ticks per division of every module.
pub const DEFAULT_TICKS_PER_DIVISION: u8 = 6;

/// Smallest tempo a set-speed command can select; gives the largest tick.
pub const MIN_TEMPO: u32 = 32;

/// Largest tempo a set-speed command can select; gives the smallest tick.
pub const MAX_TEMPO: u32 = 255;

/// Fractional bits of [`SEMITONE_FACTOR`].
pub const SEMITONE_BITS: u32 = 13;

/// `2^(n/12)` for n = 0..=15, with 13 fractional bits.
pub const SEMITONE_FACTOR: [u32; 16] = [
    0x2000, 0x21E7, 0x23EB, 0x260E, 0x2851, 0x2AB7, 0x2D41, 0x2FF2, 0x32CC, 0x35D1, 0x3904,
    0x3C68, 0x4000, 0x43CE, 0x47D6, 0x4C1C,
];

/// Convert an Amiga period to a read increment at `rate` Hz.
///
/// Returns 0 for period 0 or rate 0.
pub fn period_to_increment(period: u16, rate: u32) -> u32 {
    if period == 0 || rate == 0 {
        return 0;
    }
    let step = (AMIGA_CLOCK << 8) / ((period as u64) << 1);
    ((step << 7) / rate as u64) as u32
}

/// Raise an increment by `semitones` (0-15).
pub fn transpose(increment: u32, semitones: u8) -> u32 {
    let factor = SEMITONE_FACTOR[(semitones & 0x0F) as usize] as u64;
    ((increment as u64 * factor) >> SEMITONE_BITS) as u32
}

/// Convert an increment back to a period with 20 fractional bits.
///
/// Returns 0 for increment 0 or rate 0.
pub fn increment_to_slide_period(increment: u32, rate: u32) -> u64 {
    if increment == 0 || rate == 0 {
        return 0;
    }
    ((((AMIGA_CLOCK << 8) / rate as u64) << 12) / ((increment as u64) << 1)) << 15
}

/// Convert a 20-fractional-bit period to an increment at `rate` Hz.
pub fn slide_period_to_increment(slide_period: u64, rate: u32) -> u32 {
    if rate == 0 {
        return 0;
    }
    let double_period = (slide_period >> (SLIDE_FRAC_BITS - 1)).max(1);
    (((AMIGA_CLOCK / double_period) << FRAC_BITS) / rate as u64) as u32
}

/// Per-sample slide step for a slide of `amount` periods per tick.
pub fn slide_delta(amount: u8, tick_buffer_size: u32) -> u64 {
    ((amount as u64) << SLIDE_FRAC_BITS) / tick_buffer_size.max(1) as u64
}

/// Whole-period part of a slide period.
pub const fn slide_period_whole(slide_period: u64) -> u64 {
    slide_period >> SLIDE_FRAC_BITS
}

/// Output samples per tick at `rate` Hz and `tempo` beats per minute.
pub fn tick_buffer_size(rate: u32, tempo: u32) -> u32 {
    (5 * rate) / (tempo.max(1) << 1)
}

/// The largest tick any set-speed command can produce at `rate` Hz.
pub fn max_tick_buffer_size(rate: u32) -> u32 {
    tick_buffer_size(rate, MIN_TEMPO)
}

/// The smallest tick any set-speed command can produce at `rate` Hz.
pub fn min_tick_buffer_size(rate: u32) -> u32 {
    tick_buffer_size(rate, MAX_TEMPO)
}
