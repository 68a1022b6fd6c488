//! Module loader for the tickplay MOD player.
//!
//! Parses ProTracker MOD files into the song model.

mod mod_format;

pub use mod_format::{load_mod, HEADER_SIZE};

use thiserror::Error;

/// Error type for module loading.
///
/// Loading stops at the first failing phase, so each variant names the
/// phase that failed.
#[derive(Debug, Error)]
pub enum FormatError {
    /// Header or pattern data missing or malformed
    #[error("bad module file: {0}")]
    BadFile(String),
    /// A sample buffer could not be allocated
    #[error("out of memory allocating {bytes} bytes for sample {sample}")]
    NoMemory { sample: usize, bytes: usize },
    /// The sequence table is inconsistent with the format
    #[error("bad sequence table: {0}")]
    BadTable(String),
    /// Unrecognized format tag
    #[error("unrecognized format tag {0:?}")]
    BadDescription(String),
    /// Sample data ends before the descriptors say it should
    #[error("unexpected end of file in sample {sample}")]
    UnexpectedEof { sample: usize },
}

impl FormatError {
    /// Process exit status for this error.
    pub fn code(&self) -> i32 {
        match self {
            FormatError::BadFile(_) => 1,
            FormatError::NoMemory { .. } => 2,
            FormatError::BadTable(_) => 8,
            FormatError::BadDescription(_) => 16,
            FormatError::UnexpectedEof { .. } => 32,
        }
    }
}
