//! Channel state for tracker playback.

use tp_ir::{Cell, Sample, Song};

use crate::frequency::{
    period_to_increment, slide_period_to_increment, slide_period_whole, FRAC_BITS, PERIOD_MAX,
    PERIOD_MIN,
};
use crate::transport::Timing;

/// Precomputed arpeggio: three increments cycled over one division.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Arpeggio {
    /// Base note
    pub inc_a: u32,
    /// Base raised by x semitones
    pub inc_b: u32,
    /// Base raised by y semitones
    pub inc_c: u32,
    /// Last division position that plays `inc_a`
    pub one_third: u32,
    /// Last division position that plays `inc_b`
    pub two_thirds: u32,
}

/// A running pitch slide on a 20-fractional-bit period.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Slide {
    /// Current period, 20 fractional bits
    pub period: u64,
    /// Period change per output sample
    pub delta: u64,
    /// Increment to fall back to once the period limit is hit
    pub base: u32,
}

/// Per-sample pitch override installed by an effect for one division.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ActiveEffect {
    /// The division increment applies unchanged
    #[default]
    None,
    Arpeggio(Arpeggio),
    SlideUp(Slide),
    SlideDown(Slide),
}

impl ActiveEffect {
    /// Increment for the output sample at `division_pos`, or `None` to keep
    /// the channel's current increment.
    pub fn next_increment(&mut self, division_pos: u32, timing: &Timing) -> Option<u32> {
        match self {
            ActiveEffect::None => None,
            ActiveEffect::Arpeggio(arp) => Some(if division_pos <= arp.one_third {
                arp.inc_a
            } else if division_pos <= arp.two_thirds {
                arp.inc_b
            } else if division_pos < timing.max_division_pos {
                arp.inc_c
            } else {
                arp.inc_a
            }),
            ActiveEffect::SlideUp(slide) => {
                slide.period = slide.period.saturating_sub(slide.delta);
                if slide_period_whole(slide.period) < PERIOD_MIN {
                    slide.delta = 0;
                    Some(slide.base)
                } else {
                    Some(slide_period_to_increment(slide.period, timing.rate))
                }
            }
            ActiveEffect::SlideDown(slide) => {
                slide.period = slide.period.saturating_add(slide.delta);
                if slide_period_whole(slide.period) > PERIOD_MAX {
                    slide.delta = 0;
                    Some(slide.base)
                } else {
                    Some(slide_period_to_increment(slide.period, timing.rate))
                }
            }
        }
    }
}

/// Mixing state for a single tracker channel.
#[derive(Clone, Debug, Default)]
pub struct ChannelState {
    /// Index into the song's sample slots; `None` means the channel is off
    pub sample: Option<usize>,
    /// Stored length of the current sample in bytes
    pub sample_length: u32,
    /// Read position (17.15 fixed-point)
    pub position: u32,
    /// Current increment (17.15 fixed-point)
    pub increment: u32,
    /// Increment set by this division's note
    pub division_increment: u32,
    /// Current volume (0-64)
    pub volume: u8,
    /// Loop start in bytes
    pub repeat_point: u32,
    /// Loop length in bytes (<= 2 means no loop)
    pub repeat_length: u32,
    /// Last emitted value, used to fill silent ticks
    pub clear_value: u8,
    /// Per-sample override for this division
    pub effect: ActiveEffect,
}

impl ChannelState {
    /// Create a silent channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the channel has a sample to play.
    pub fn is_active(&self) -> bool {
        self.sample.is_some()
    }

    /// Returns true if the current sample loops.
    pub fn has_loop(&self) -> bool {
        self.repeat_length > 2
    }

    /// Byte offset at which the sample ends or wraps.
    pub fn end(&self) -> u32 {
        if self.has_loop() {
            self.repeat_point + self.repeat_length
        } else {
            self.sample_length
        }
    }

    /// Current byte offset into the sample.
    pub fn byte_offset(&self) -> usize {
        (self.position >> FRAC_BITS) as usize
    }

    /// Start a division from its pattern cell.
    ///
    /// A sample number selects and restarts a sample (or turns the channel
    /// off if the slot is too short to play). A period without a sample
    /// number restarts the current one. Either way a period sets the
    /// division increment; without one the current increment carries over.
    pub fn setup(&mut self, cell: &Cell, song: &Song, rate: u32) {
        if cell.sample != 0 {
            match song.samples.get(cell.sample as usize - 1) {
                Some(sample) if sample.is_playable() => self.start_sample(cell.sample as usize - 1, sample),
                Some(sample) => {
                    self.sample_length = sample.length;
                    self.sample = None;
                }
                None => self.sample = None,
            }
        } else if cell.period != 0 {
            self.position = 0;
        }

        self.division_increment = if cell.period != 0 {
            period_to_increment(cell.period, rate)
        } else {
            self.increment
        };
    }

    fn start_sample(&mut self, index: usize, sample: &Sample) {
        self.sample = Some(index);
        self.sample_length = sample.length;
        self.volume = sample.volume.min(64);
        self.position = 0;
        self.repeat_point = sample.repeat_point;
        self.repeat_length = sample.repeat_length;
    }

    /// Drop any effect override and play the division increment.
    pub fn reset_to_division(&mut self) {
        self.increment = self.division_increment;
        self.effect = ActiveEffect::None;
    }
}
