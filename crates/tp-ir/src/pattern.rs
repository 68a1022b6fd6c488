//! Pattern and cell types.

use alloc::vec::Vec;

/// Every MOD pattern has exactly 64 divisions.
pub const DIVISIONS_PER_PATTERN: usize = 64;

/// One channel's entry in one division.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cell {
    /// Sample number (0 = keep the channel's current sample, 1-31 otherwise)
    pub sample: u8,
    /// Amiga period, 12 bits (0 = keep the current pitch)
    pub period: u16,
    /// Effect code (0x0-0xF)
    pub effect: u8,
    /// First effect argument nibble
    pub x: u8,
    /// Second effect argument nibble
    pub y: u8,
}

impl Cell {
    /// An empty cell: no sample, no period, effect 0 with zero arguments.
    pub const fn empty() -> Self {
        Self { sample: 0, period: 0, effect: 0, x: 0, y: 0 }
    }

    /// A note cell with no effect.
    pub const fn note(sample: u8, period: u16) -> Self {
        Self { sample, period, effect: 0, x: 0, y: 0 }
    }

    /// Attach an effect code and its argument byte.
    pub const fn with_effect(mut self, effect: u8, param: u8) -> Self {
        self.effect = effect & 0x0F;
        self.x = param >> 4;
        self.y = param & 0x0F;
        self
    }

    /// The two argument nibbles combined into one byte (`x * 16 + y`).
    pub const fn param(&self) -> u8 {
        (self.x << 4) | self.y
    }

    /// Returns true if the cell carries no note and no effect.
    pub fn is_empty(&self) -> bool {
        *self == Self::empty()
    }
}

/// A 64-division grid of cells, stored division-major:
/// `data[division * channels + channel]`.
#[derive(Clone, Debug)]
pub struct Pattern {
    /// Number of channels per division
    pub channels: u8,
    /// Cell data
    pub data: Vec<Cell>,
}

impl Pattern {
    /// Create a pattern with empty cells.
    pub fn new(channels: u8) -> Self {
        Self {
            channels,
            data: alloc::vec![Cell::empty(); DIVISIONS_PER_PATTERN * channels as usize],
        }
    }

    /// Get a mutable reference to a cell.
    pub fn cell_mut(&mut self, division: usize, channel: usize) -> &mut Cell {
        debug_assert!(division < DIVISIONS_PER_PATTERN);
        debug_assert!(channel < self.channels as usize);
        &mut self.data[division * self.channels as usize + channel]
    }

    /// Look up a cell; `None` outside the pattern, even if `data` is short.
    pub fn cell(&self, division: usize, channel: usize) -> Option<&Cell> {
        if channel >= self.channels as usize {
            return None;
        }
        self.data.get(division * self.channels as usize + channel)
    }

    /// Returns true if the pattern holds 64 full divisions of `channels` cells.
    pub fn fits(&self, channels: u8) -> bool {
        self.channels == channels && self.data.len() == DIVISIONS_PER_PATTERN * channels as usize
    }
}
