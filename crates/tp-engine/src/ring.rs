//! Shared accumulation ring for the mixer.
//!
//! Every channel has its own write cursor; there is one read cursor. A
//! channel may only write into the free space between its cursor and the
//! read cursor, and the reader may only consume what the slowest channel
//! has written, so the read cursor never passes a write cursor.

use heapless::Vec as HVec;

/// Most channels a ring can track.
pub const MAX_CHANNELS: usize = 16;

/// Circular buffer of `u32` accumulators.
#[derive(Debug)]
pub struct MixRing {
    slots: Vec<u32>,
    read: usize,
    writers: HVec<usize, MAX_CHANNELS>,
}

impl MixRing {
    /// Create a zeroed ring. `channels` is clamped to [`MAX_CHANNELS`] and
    /// `capacity` to at least 2.
    pub fn new(capacity: usize, channels: usize) -> Self {
        let mut writers = HVec::new();
        for _ in 0..channels.min(MAX_CHANNELS) {
            // Cannot fail: bounded by MAX_CHANNELS above
            let _ = writers.push(0);
        }
        Self {
            slots: vec![0; capacity.max(2)],
            read: 0,
            writers,
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Free slots ahead of `lane`'s write cursor. One slot is always kept
    /// empty so a full ring can be told apart from an empty one.
    pub fn write_available(&self, lane: usize) -> usize {
        let cap = self.capacity();
        let write = self.writers[lane];
        (self.read + cap - write - 1) % cap
    }

    /// Slots that every lane has written past the read cursor.
    pub fn read_available(&self) -> usize {
        let cap = self.capacity();
        self.writers
            .iter()
            .map(|&write| (write + cap - self.read) % cap)
            .min()
            .unwrap_or(0)
    }

    /// Add `samples` into `lane`, one every `1 << stride_shift` slots starting
    /// `offset` slots past the cursor, and advance the cursor past them.
    ///
    /// Returns how many samples were taken; never more than fit.
    pub fn push(&mut self, lane: usize, offset: usize, stride_shift: u32, samples: &[u8]) -> usize {
        let cap = self.capacity();
        let count = samples.len().min(self.write_available(lane) >> stride_shift);
        let start = self.writers[lane] + offset;
        for (i, &sample) in samples[..count].iter().enumerate() {
            let index = ((i << stride_shift) + start) % cap;
            self.slots[index] += sample as u32;
        }
        self.writers[lane] = (self.writers[lane] + (count << stride_shift)) % cap;
        count
    }

    /// Consume `out.len()` slots from the read cursor, converting each with
    /// `convert(index_in_block, accumulator)` and zeroing it for reuse.
    ///
    /// The caller must not ask for more than [`read_available`](Self::read_available).
    pub fn pop_block(&mut self, out: &mut [i16], convert: impl Fn(usize, u32) -> i16) {
        let cap = self.capacity();
        debug_assert!(out.len() <= self.read_available());
        for (i, dst) in out.iter_mut().enumerate() {
            let slot = &mut self.slots[(self.read + i) % cap];
            *dst = convert(i, *slot);
            *slot = 0;
        }
        self.read = (self.read + out.len()) % cap;
    }
}
