//! WAV encoding for 16-bit PCM.

use std::io::{Seek, SeekFrom, Write};

use tp_engine::{AudioSink, DeviceError};

const BITS_PER_SAMPLE: u16 = 16;
const HEADER_LEN: u32 = 44;

/// Streams 16-bit PCM into a WAV container. The RIFF and data sizes are
/// patched in by [`finish`](Self::finish).
pub struct WavSink<W: Write + Seek> {
    writer: W,
    channels: u16,
    data_size: u32,
}

impl<W: Write + Seek> WavSink<W> {
    /// Write a header with placeholder sizes.
    pub fn new(mut writer: W, sample_rate: u32, channels: u16) -> std::io::Result<Self> {
        write_riff_header(&mut writer, 0)?;
        write_fmt_chunk(&mut writer, channels, sample_rate)?;
        writer.write_all(b"data")?;
        writer.write_all(&0u32.to_le_bytes())?;
        Ok(Self { writer, channels, data_size: 0 })
    }

    /// Bytes of sample data written so far.
    pub fn data_size(&self) -> u32 {
        self.data_size
    }

    /// Patch the chunk sizes and hand back the writer.
    pub fn finish(mut self) -> std::io::Result<W> {
        self.writer.seek(SeekFrom::Start(4))?;
        self.writer.write_all(&(HEADER_LEN - 8 + self.data_size).to_le_bytes())?;
        self.writer.seek(SeekFrom::Start(HEADER_LEN as u64 - 4))?;
        self.writer.write_all(&self.data_size.to_le_bytes())?;
        self.writer.seek(SeekFrom::End(0))?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write + Seek> AudioSink for WavSink<W> {
    fn write(&mut self, samples: &[i16]) -> Result<usize, DeviceError> {
        for sample in samples {
            self.writer
                .write_all(&sample.to_le_bytes())
                .map_err(|e| DeviceError::Failed(e.to_string()))?;
        }
        self.data_size = self.data_size.saturating_add(samples.len() as u32 * 2);
        Ok(samples.len())
    }

    fn channels(&self) -> u16 {
        self.channels
    }
}

/// Encode interleaved samples as a complete in-memory WAV file.
pub fn samples_to_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN as usize + samples.len() * 2);
    // Writing into a Vec cannot fail
    let _ = write_riff_header(&mut buf, samples.len() as u32 * 2);
    let _ = write_fmt_chunk(&mut buf, channels, sample_rate);
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&(samples.len() as u32 * 2).to_le_bytes());
    for sample in samples {
        buf.extend_from_slice(&sample.to_le_bytes());
    }
    buf
}

fn write_riff_header(w: &mut impl Write, data_size: u32) -> std::io::Result<()> {
    w.write_all(b"RIFF")?;
    w.write_all(&(HEADER_LEN - 8 + data_size).to_le_bytes())?;
    w.write_all(b"WAVE")
}

fn write_fmt_chunk(w: &mut impl Write, channels: u16, sample_rate: u32) -> std::io::Result<()> {
    let block_align = channels * (BITS_PER_SAMPLE / 8);
    w.write_all(b"fmt ")?;
    w.write_all(&16u32.to_le_bytes())?;
    w.write_all(&1u16.to_le_bytes())?;
    w.write_all(&channels.to_le_bytes())?;
    w.write_all(&sample_rate.to_le_bytes())?;
    w.write_all(&(sample_rate * block_align as u32).to_le_bytes())?;
    w.write_all(&block_align.to_le_bytes())?;
    w.write_all(&BITS_PER_SAMPLE.to_le_bytes())
}
