//! Song model types for the tickplay MOD player.
//!
//! The loader fills these in once; the playback engine only ever reads
//! them. Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod pattern;
mod sample;
pub mod song;

pub use pattern::{Cell, Pattern, DIVISIONS_PER_PATTERN};
pub use sample::{to_unsigned, Sample};
pub use song::{FormatTag, Song, MAX_PATTERNS, NUM_SAMPLES, SEQUENCE_LEN, STANDARD_PATTERNS};

use arrayvec::ArrayString;

/// Copy as much of `src` as fits into `dst`, stopping at a char boundary.
pub(crate) fn push_truncated<const N: usize>(dst: &mut ArrayString<N>, src: &str) {
    for c in src.chars() {
        if dst.try_push(c).is_err() {
            break;
        }
    }
}
