//! Audio output backends for the tickplay MOD player.

mod cpal_backend;

pub use cpal_backend::CpalOutput;
