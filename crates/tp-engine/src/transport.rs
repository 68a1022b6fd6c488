//! Song position and tick timing.

use tp_ir::DIVISIONS_PER_PATTERN;

use crate::frequency::{tick_buffer_size, DEFAULT_TEMPO, DEFAULT_TICKS_PER_DIVISION};

/// Set-speed arguments below this select ticks per division; the rest are tempos.
pub const TEMPO_THRESHOLD: u8 = 32;

/// Tick timing at a fixed output rate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timing {
    /// Output rate in Hz
    pub rate: u32,
    /// Ticks in one division (1-31)
    pub ticks_per_division: u8,
    /// Output samples in one tick
    pub tick_buffer_size: u32,
    /// Index of the last output sample of a division
    pub max_division_pos: u32,
}

impl Timing {
    /// Initial timing: tempo 125, six ticks per division.
    pub fn new(rate: u32) -> Self {
        let mut timing = Self {
            rate,
            ticks_per_division: DEFAULT_TICKS_PER_DIVISION,
            tick_buffer_size: tick_buffer_size(rate, DEFAULT_TEMPO),
            max_division_pos: 0,
        };
        timing.update_division_pos();
        timing
    }

    /// Apply a set-speed argument.
    ///
    /// Values below 32 set ticks per division (0 counts as 1); larger values
    /// set the tempo and so the tick length.
    pub fn set_speed(&mut self, z: u8) {
        if z < TEMPO_THRESHOLD {
            self.ticks_per_division = z.max(1);
        } else {
            self.tick_buffer_size = tick_buffer_size(self.rate, z as u32);
        }
        self.update_division_pos();
    }

    /// Output samples in one division.
    pub fn division_len(&self) -> u32 {
        self.ticks_per_division as u32 * self.tick_buffer_size
    }

    /// Offset of a sample within the division.
    pub fn division_pos(&self, tick: u32, slot: u32) -> u32 {
        tick * self.tick_buffer_size + slot
    }

    fn update_division_pos(&mut self) {
        self.max_division_pos = self.division_len().saturating_sub(1);
    }
}

/// Where a jump effect asks playback to continue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resume {
    /// Song position
    pub position: u8,
    /// Division within the pattern (64 means "after the last division")
    pub division: u8,
}

/// The sequencer's place in the song.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cursor {
    /// Current song position
    pub position: u8,
    /// Current division (0-63)
    pub division: u8,
    /// Jump requested by the division being processed
    pub resume: Option<Resume>,
}

impl Cursor {
    /// Move to the next division to play.
    ///
    /// A pending jump wins over the natural advance. Returns false once the
    /// position runs past `song_length`.
    pub fn advance(&mut self, song_length: u8) -> bool {
        match self.resume.take() {
            Some(resume) => {
                self.position = resume.position;
                self.division = resume.division;
            }
            None => self.division += 1,
        }
        if self.division as usize >= DIVISIONS_PER_PATTERN {
            self.division = 0;
            self.position = self.position.saturating_add(1);
        }
        self.position < song_length
    }

    /// Pack position and division into one word for lock-free progress reports.
    pub const fn packed(&self) -> u32 {
        ((self.position as u32) << 8) | self.division as u32
    }
}

/// Split a word produced by [`Cursor::packed`] back into (position, division).
pub const fn unpack_progress(packed: u32) -> (u8, u8) {
    ((packed >> 8) as u8, packed as u8)
}
