//! Sample descriptors and waveform data.

use alloc::vec::Vec;
use arrayvec::ArrayString;

/// One of the 31 sample slots of a module.
///
/// All lengths and loop bounds are in bytes. `data` holds the waveform
/// already bias-flipped from signed to unsigned 8-bit, so silence is 0x80.
#[derive(Clone, Debug, Default)]
pub struct Sample {
    /// Sample name
    pub name: ArrayString<32>,
    /// Length in bytes
    pub length: u32,
    /// Finetune, low nibble only (0-15)
    pub finetune: u8,
    /// Default volume (0-64)
    pub volume: u8,
    /// Loop start in bytes
    pub repeat_point: u32,
    /// Loop length in bytes (<= 2 means no loop)
    pub repeat_length: u32,
    /// Unsigned 8-bit waveform
    pub data: Vec<u8>,
}

impl Sample {
    /// Create an empty sample slot.
    pub fn new(name: &str) -> Self {
        let mut sample = Self::default();
        crate::push_truncated(&mut sample.name, name);
        sample
    }

    /// Create a sample from signed PCM, as stored in a module file.
    pub fn from_signed(name: &str, volume: u8, pcm: &[i8]) -> Self {
        let mut sample = Self::new(name);
        sample.volume = volume.min(64);
        sample.length = pcm.len() as u32;
        sample.data = pcm.iter().map(|&s| to_unsigned(s)).collect();
        sample
    }

    /// Set the loop bounds (bytes).
    pub fn with_loop(mut self, repeat_point: u32, repeat_length: u32) -> Self {
        self.repeat_point = repeat_point;
        self.repeat_length = repeat_length;
        self
    }

    /// Returns true if the sample loops.
    pub fn has_loop(&self) -> bool {
        self.repeat_length > 2
    }

    /// Samples of two bytes or less are treated as "channel off".
    pub fn is_playable(&self) -> bool {
        self.length > 2
    }
}

/// Flip the sign bit: signed PCM to unsigned PCM centered on 0x80.
pub const fn to_unsigned(sample: i8) -> u8 {
    (sample as u8) ^ 0x80
}
