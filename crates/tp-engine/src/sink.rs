//! Audio sink trait and error types.

use thiserror::Error;

/// Error type for audio output.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// No output device could be opened
    #[error("audio device unavailable: {0}")]
    Unavailable(String),
    /// The device failed while playing
    #[error("audio device error: {0}")]
    Failed(String),
    /// The device or mixer rejected its configuration
    #[error("bad audio configuration: {0}")]
    BadArg(String),
}

impl DeviceError {
    /// Process exit status for this error.
    pub fn code(&self) -> i32 {
        match self {
            DeviceError::Unavailable(_) => 64,
            DeviceError::Failed(_) => 128,
            DeviceError::BadArg(_) => 256,
        }
    }
}

/// A blocking consumer of interleaved 16-bit PCM.
pub trait AudioSink {
    /// Write some prefix of `samples` and return how many were taken.
    ///
    /// Returning fewer than `samples.len()` is not an error; the caller
    /// retries with the remainder.
    fn write(&mut self, samples: &[i16]) -> Result<usize, DeviceError>;

    /// Interleaved channels per frame (1 or 2), or 0 if the sink takes
    /// whatever layout it is given.
    fn channels(&self) -> u16;

    /// Write all of `samples`, retrying partial writes.
    fn write_all(&mut self, mut samples: &[i16]) -> Result<(), DeviceError> {
        while !samples.is_empty() {
            let written = self.write(samples)?;
            if written == 0 {
                return Err(DeviceError::Failed("sink accepted no samples".into()));
            }
            samples = &samples[written.min(samples.len())..];
        }
        Ok(())
    }
}

/// Collects everything in memory; used for offline rendering and tests.
impl AudioSink for Vec<i16> {
    fn write(&mut self, samples: &[i16]) -> Result<usize, DeviceError> {
        self.extend_from_slice(samples);
        Ok(samples.len())
    }

    fn channels(&self) -> u16 {
        0
    }
}

impl<S: AudioSink + ?Sized> AudioSink for &mut S {
    fn write(&mut self, samples: &[i16]) -> Result<usize, DeviceError> {
        (**self).write(samples)
    }

    fn channels(&self) -> u16 {
        (**self).channels()
    }
}
