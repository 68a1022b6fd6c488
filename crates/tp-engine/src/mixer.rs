//! Channel mixer: sums per-tick channel buffers and feeds the sink.
//!
//! Channels are identified by their bit in the left and right masks. With
//! both masks non-empty the output is interleaved stereo; otherwise every
//! channel goes to a single mono lane.

use crate::ring::{MixRing, MAX_CHANNELS};
use crate::sink::{AudioSink, DeviceError};

/// Output block size in samples when none is configured.
pub const DEFAULT_BLOCK_SIZE: usize = 256;

/// Ring size the default capacity aims for.
pub const TARGET_RING_SLOTS: usize = 32768;

/// Right-shift that keeps the sum of n 8-bit channels within 16 bits.
pub const DIV_TABLE: [u32; MAX_CHANNELS + 1] = [0, 0, 1, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4];

/// Bits of the per-channel samples fed to the mixer.
const SAMPLE_BITS: i32 = 8;

/// Shift pair `(left, right)` for a side summing `channels` channels.
/// At most one of the two is nonzero.
pub fn rescale_shifts(channels: usize) -> (u32, u32) {
    let shift = SAMPLE_BITS - DIV_TABLE[channels.min(MAX_CHANNELS)] as i32;
    if shift > 0 {
        (shift as u32, 0)
    } else {
        (0, shift.unsigned_abs())
    }
}

/// Unsigned 16-bit sample to signed, by flipping the sign bit.
pub const fn to_signed_centered(value: u32) -> i16 {
    ((value as u16) ^ 0x8000) as i16
}

/// Default ring capacity for a block size: the largest multiple of the
/// block that fits the target, but never less than two blocks.
pub fn default_capacity(block_size: usize) -> usize {
    let block = block_size.max(1);
    if 2 * block > TARGET_RING_SLOTS {
        2 * block
    } else {
        TARGET_RING_SLOTS / block * block
    }
}

/// Mixer configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MixerConfig {
    /// Channels mixed into the left lane (bit n = channel n)
    pub left: u32,
    /// Channels mixed into the right lane
    pub right: u32,
    /// Samples per block handed to the sink; even, at least 2
    pub block_size: usize,
    /// Ring capacity in slots; `None` picks one from the block size
    pub capacity: Option<usize>,
    /// Longest tick any channel will submit, in samples
    pub max_tick: usize,
}

impl MixerConfig {
    /// All channels in one mono lane.
    pub fn mono(channels: usize, max_tick: usize) -> Self {
        Self {
            left: lane_mask(channels),
            right: 0,
            block_size: DEFAULT_BLOCK_SIZE,
            capacity: None,
            max_tick,
        }
    }

    /// Amiga panning: channels 1 and 4 left, 2 and 3 right, repeating.
    pub fn amiga_stereo(channels: usize, max_tick: usize) -> Self {
        let all = lane_mask(channels);
        let left = all & 0x9999_9999;
        Self {
            left,
            right: all & !left,
            block_size: DEFAULT_BLOCK_SIZE,
            capacity: None,
            max_tick,
        }
    }

    /// Override the block size.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Whether both lanes carry channels.
    pub fn is_stereo(&self) -> bool {
        self.left != 0 && self.right != 0
    }

    /// Total channel count.
    pub fn channels(&self) -> usize {
        (self.left | self.right).count_ones() as usize
    }

    /// Check the masks and block size.
    pub fn validate(&self) -> Result<(), DeviceError> {
        let all = self.left | self.right;
        if self.left & self.right != 0 {
            return Err(DeviceError::BadArg(format!(
                "channels {:#x} are on both sides",
                self.left & self.right
            )));
        }
        if all == 0 {
            return Err(DeviceError::BadArg("no channels to mix".into()));
        }
        if all & (all + 1) != 0 || self.channels() > MAX_CHANNELS {
            return Err(DeviceError::BadArg(format!(
                "channel mask {:#x} must cover channels 0..n with n <= {}",
                all, MAX_CHANNELS
            )));
        }
        if self.block_size < 2 || self.block_size % 2 != 0 {
            return Err(DeviceError::BadArg(format!(
                "block size {} must be even and at least 2",
                self.block_size
            )));
        }
        Ok(())
    }

    /// Ring capacity: the configured or default size, grown in whole blocks
    /// until a full tick from every lane fits behind a partial block.
    pub fn ring_capacity(&self) -> usize {
        let block = self.block_size;
        let needed = (self.max_tick << self.is_stereo() as u32) + block + 1;
        let mut capacity = self.capacity.unwrap_or_else(|| default_capacity(block));
        capacity = capacity.div_ceil(block) * block;
        if capacity < needed {
            capacity = needed.div_ceil(block) * block;
        }
        capacity
    }
}

/// Mask with the low `channels` bits set.
pub fn lane_mask(channels: usize) -> u32 {
    if channels >= 32 {
        u32::MAX
    } else {
        (1u32 << channels) - 1
    }
}

/// Ring-buffer mixer.
pub struct Mixer {
    config: MixerConfig,
    ring: MixRing,
    /// Shift pairs for even (left) and odd (right) slots
    shifts: [(u32, u32); 2],
    block: Vec<i16>,
    samples_out: u64,
}

impl Mixer {
    /// Create a mixer. Fails with [`DeviceError::BadArg`] on bad masks or
    /// block size.
    pub fn new(config: MixerConfig) -> Result<Self, DeviceError> {
        config.validate()?;
        let (left_count, right_count) = if config.is_stereo() {
            (config.left.count_ones(), config.right.count_ones())
        } else {
            let n = config.channels() as u32;
            (n, n)
        };
        Ok(Self {
            config,
            ring: MixRing::new(config.ring_capacity(), config.channels()),
            shifts: [
                rescale_shifts(left_count as usize),
                rescale_shifts(right_count as usize),
            ],
            block: vec![0; config.block_size],
            samples_out: 0,
        })
    }

    /// Interleaved output channels: 2 for stereo, 1 for mono.
    pub fn output_channels(&self) -> u16 {
        if self.config.is_stereo() {
            2
        } else {
            1
        }
    }

    /// Ring capacity in slots.
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Samples handed to the sink so far.
    pub fn samples_out(&self) -> u64 {
        self.samples_out
    }

    fn stride_shift(&self) -> u32 {
        self.config.is_stereo() as u32
    }

    /// Samples `channel` can submit right now.
    pub fn write_available(&self, channel: usize) -> usize {
        self.ring.write_available(channel) >> self.stride_shift()
    }

    /// Slots every channel has written that are not yet flushed.
    pub fn flush_available(&self) -> usize {
        self.ring.read_available()
    }

    /// Accumulate one channel's samples, then flush what is complete.
    ///
    /// Returns the number of samples that did not fit.
    pub fn mix<S: AudioSink + ?Sized>(
        &mut self,
        channel: usize,
        samples: &[u8],
        sink: &mut S,
    ) -> Result<usize, DeviceError> {
        let stereo = self.config.is_stereo();
        let side = (stereo && self.config.right & (1 << channel) != 0) as usize;
        let taken = self.ring.push(channel, side, self.stride_shift(), samples);
        self.flush(sink)?;
        Ok(samples.len() - taken)
    }

    /// Write every complete block to the sink.
    pub fn flush<S: AudioSink + ?Sized>(&mut self, sink: &mut S) -> Result<(), DeviceError> {
        let block = self.config.block_size;
        while self.ring.read_available() >= block {
            self.write_block(block, sink)?;
        }
        Ok(())
    }

    /// Flush everything written so far, including a final partial block.
    pub fn finish<S: AudioSink + ?Sized>(&mut self, sink: &mut S) -> Result<(), DeviceError> {
        self.flush(sink)?;
        let rest = self.ring.read_available();
        if rest > 0 {
            self.write_block(rest, sink)?;
        }
        Ok(())
    }

    fn write_block<S: AudioSink + ?Sized>(&mut self, len: usize, sink: &mut S) -> Result<(), DeviceError> {
        let shifts = self.shifts;
        let out = &mut self.block[..len];
        self.ring.pop_block(out, |i, acc| {
            let (l, r) = shifts[i & 1];
            to_signed_centered((acc << l) >> r)
        });
        sink.write_all(out)?;
        self.samples_out += len as u64;
        Ok(())
    }
}
