//! Division-level effect processing.
//!
//! Runs once per channel at the start of every division, after the channel
//! has been set up from its cell. Pitch effects install an [`ActiveEffect`]
//! that the resampler consults per output sample; flow effects request a
//! jump through the cursor's resume field; set-speed retimes the ticks.

use thiserror::Error;
use tp_ir::{Cell, DIVISIONS_PER_PATTERN};
use tracing::{info, warn};

use crate::channel::{ActiveEffect, Arpeggio, ChannelState, Slide};
use crate::frequency::{increment_to_slide_period, slide_delta, transpose};
use crate::transport::{Cursor, Resume, Timing};

/// A malformed effect in the pattern data.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum EffectError {
    /// Unused or invalid effect code
    #[error("bad effect {effect:X}{param:02X} on channel {channel}")]
    BadEffect { channel: usize, effect: u8, param: u8 },
    /// Jump target outside the song or pattern
    #[error("bad jump effect {effect:X}{param:02X} on channel {channel}")]
    BadJump { channel: usize, effect: u8, param: u8 },
}

impl EffectError {
    /// Process exit status for this error.
    pub fn code(&self) -> i32 {
        match self {
            EffectError::BadEffect { .. } => 512,
            EffectError::BadJump { .. } => 1024,
        }
    }

    fn bad_effect(channel: usize, cell: &Cell) -> Self {
        EffectError::BadEffect { channel, effect: cell.effect, param: cell.param() }
    }

    fn bad_jump(channel: usize, cell: &Cell) -> Self {
        EffectError::BadJump { channel, effect: cell.effect, param: cell.param() }
    }
}

/// Effects that only log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stub {
    Effect(u8),
    Extended(u8),
}

impl Stub {
    fn bit(self) -> u32 {
        match self {
            Stub::Effect(code) => 1 << (code & 0x0F),
            Stub::Extended(sub) => 1 << (16 + (sub & 0x0F) as u32),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Stub::Effect(0x3) => "slide to note",
            Stub::Effect(0x4) => "vibrato",
            Stub::Effect(0x5) => "slide to note + volume slide",
            Stub::Effect(0x6) => "vibrato + volume slide",
            Stub::Effect(0x7) => "tremolo",
            Stub::Effect(0x9) => "set sample offset",
            Stub::Effect(0xA) => "volume slide",
            Stub::Extended(0x1) => "fine slide up",
            Stub::Extended(0x2) => "fine slide down",
            Stub::Extended(0x3) => "set glissando",
            Stub::Extended(0x4) => "set vibrato waveform",
            Stub::Extended(0x5) => "set finetune",
            Stub::Extended(0x6) => "pattern loop",
            Stub::Extended(0x7) => "set tremolo waveform",
            Stub::Extended(0x9) => "retrigger sample",
            Stub::Extended(0xA) => "fine volume slide up",
            Stub::Extended(0xB) => "fine volume slide down",
            Stub::Extended(0xC) => "cut sample",
            Stub::Extended(0xD) => "delay sample",
            Stub::Extended(0xE) => "delay pattern",
            Stub::Extended(0xF) => "invert loop",
            _ => "unknown",
        }
    }
}

/// Session-wide state for effect processing.
#[derive(Debug, Default)]
pub struct EffectProcessor {
    /// One bit per stub already reported
    warned: u32,
}

/// The parts of the sequencer an effect may change.
pub struct DivisionContext<'a> {
    pub timing: &'a mut Timing,
    pub cursor: &'a mut Cursor,
    pub song_length: u8,
}

impl EffectProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one channel's effect for the current division.
    pub fn apply(
        &mut self,
        channel: usize,
        ch: &mut ChannelState,
        cell: &Cell,
        ctx: &mut DivisionContext<'_>,
    ) -> Result<(), EffectError> {
        let (x, y, z) = (cell.x, cell.y, cell.param());

        // Pitch effects 0-4 decide the increment themselves
        if cell.effect > 0x4 {
            ch.increment = ch.division_increment;
        }

        match cell.effect {
            0x0 => {
                if z == 0 {
                    ch.reset_to_division();
                } else {
                    let base = ch.division_increment;
                    let max = ctx.timing.max_division_pos;
                    ch.effect = ActiveEffect::Arpeggio(Arpeggio {
                        inc_a: base,
                        inc_b: transpose(base, x),
                        inc_c: transpose(base, y),
                        one_third: max / 3,
                        two_thirds: (max << 1) / 3,
                    });
                }
            }
            0x1 | 0x2 => {
                if z == 0 || ch.division_increment == 0 {
                    ch.reset_to_division();
                } else {
                    let slide = Slide {
                        period: increment_to_slide_period(ch.division_increment, ctx.timing.rate),
                        delta: slide_delta(z, ctx.timing.tick_buffer_size),
                        base: ch.division_increment,
                    };
                    ch.effect = if cell.effect == 0x1 {
                        ActiveEffect::SlideUp(slide)
                    } else {
                        ActiveEffect::SlideDown(slide)
                    };
                }
            }
            0x3 => {
                self.report(Stub::Effect(0x3), channel);
                // An empty slide-to-note continues whatever was running
                if z != 0 {
                    ch.effect = ActiveEffect::None;
                }
            }
            0x4..=0x7 | 0x9 | 0xA => {
                self.report(Stub::Effect(cell.effect), channel);
                ch.effect = ActiveEffect::None;
            }
            0xB => {
                ch.effect = ActiveEffect::None;
                if z >= ctx.song_length {
                    return Err(EffectError::bad_jump(channel, cell));
                }
                ctx.cursor.resume = Some(Resume { position: z, division: 0 });
            }
            0xC => {
                ch.effect = ActiveEffect::None;
                ch.volume = z.min(64);
            }
            0xD => {
                ch.effect = ActiveEffect::None;
                let target = x as usize * 10 + y as usize;
                if target > DIVISIONS_PER_PATTERN {
                    return Err(EffectError::bad_jump(channel, cell));
                }
                let base = ctx
                    .cursor
                    .resume
                    .map_or(ctx.cursor.position, |resume| resume.position);
                let next = base as usize + 1;
                if next >= ctx.song_length as usize {
                    return Err(EffectError::bad_jump(channel, cell));
                }
                ctx.cursor.resume = Some(Resume { position: next as u8, division: target as u8 });
            }
            0xE => {
                ch.effect = ActiveEffect::None;
                self.apply_extended(channel, cell)?;
            }
            0xF => {
                ch.effect = ActiveEffect::None;
                ctx.timing.set_speed(z);
            }
            _ => {
                ch.effect = ActiveEffect::None;
                return Err(EffectError::bad_effect(channel, cell));
            }
        }
        Ok(())
    }

    fn apply_extended(&mut self, channel: usize, cell: &Cell) -> Result<(), EffectError> {
        match (cell.x, cell.y) {
            (0x0, 0) => info!(channel, "filter/power LED on"),
            (0x0, 1) => info!(channel, "filter/power LED off"),
            (0x0, _) | (0x8, _) => return Err(EffectError::bad_effect(channel, cell)),
            (sub, _) => {
                self.report(Stub::Extended(sub), channel);
            }
        }
        Ok(())
    }

    /// Warn about a stub the first time it appears. Returns true if it warned.
    fn report(&mut self, stub: Stub, channel: usize) -> bool {
        if self.warned & stub.bit() != 0 {
            return false;
        }
        self.warned |= stub.bit();
        warn!(channel, effect = stub.name(), "effect not implemented");
        true
    }

    /// Returns true if the stub for `effect` has already been reported.
    pub fn has_reported(&self, effect: u8) -> bool {
        self.warned & Stub::Effect(effect).bit() != 0
    }

    /// Returns true if the `E` sub-effect `sub` has already been reported.
    pub fn has_reported_extended(&self, sub: u8) -> bool {
        self.warned & Stub::Extended(sub).bit() != 0
    }
}
