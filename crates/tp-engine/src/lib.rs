//! Playback engine for the tickplay MOD player.
//!
//! Sequences a [`tp_ir::Song`] division by division, resamples each
//! channel in 17.15 fixed point and mixes the result through a shared ring
//! into an [`AudioSink`].

mod channel;
mod effects;
pub mod frequency;
mod mixer;
mod resampler;
mod ring;
mod sequencer;
mod sink;
mod transport;

pub use channel::{ActiveEffect, Arpeggio, ChannelState, Slide};
pub use effects::{DivisionContext, EffectError, EffectProcessor};
pub use mixer::{
    default_capacity, lane_mask, rescale_shifts, to_signed_centered, Mixer, MixerConfig,
    DEFAULT_BLOCK_SIZE, DIV_TABLE,
};
pub use resampler::{fill_clear, resample_tick};
pub use ring::{MixRing, MAX_CHANNELS};
pub use sequencer::{
    Layout, PlaybackControl, PlaybackSummary, Player, PlayerConfig, DEFAULT_RATE, MAX_RATE,
    MIN_RATE,
};
pub use sink::{AudioSink, DeviceError};
pub use transport::{unpack_progress, Cursor, Resume, Timing};
