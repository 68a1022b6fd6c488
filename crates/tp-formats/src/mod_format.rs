//! ProTracker MOD format parser.

use std::io::Cursor;

use binrw::BinRead;
use tp_ir::{
    to_unsigned, Cell, FormatTag, Pattern, Sample, Song, DIVISIONS_PER_PATTERN, MAX_PATTERNS,
    NUM_SAMPLES, SEQUENCE_LEN, STANDARD_PATTERNS,
};
use tracing::debug;

use crate::FormatError;

/// Bytes before the first pattern: title, descriptors, sequence, tag.
pub const HEADER_SIZE: usize = 1084;

const CELL_SIZE: usize = 4;

/// A 30-byte sample descriptor. Word counts are doubled into bytes later.
#[derive(BinRead, Debug)]
#[br(big)]
struct RawSampleHeader {
    name: [u8; 22],
    length_words: u16,
    finetune: u8,
    volume: u8,
    repeat_point_words: u16,
    repeat_length_words: u16,
}

#[derive(BinRead, Debug)]
#[br(big)]
struct RawHeader {
    title: [u8; 20],
    #[br(count = NUM_SAMPLES)]
    samples: Vec<RawSampleHeader>,
    song_length: u8,
    ignored: u8,
    sequence: [u8; SEQUENCE_LEN],
    tag: [u8; 4],
}

/// Load a MOD file from bytes.
pub fn load_mod(data: &[u8]) -> Result<Song, FormatError> {
    let header = read_header(data)?;

    if header.song_length as usize > SEQUENCE_LEN {
        return Err(FormatError::BadTable(format!(
            "song length {} exceeds {}",
            header.song_length, SEQUENCE_LEN
        )));
    }

    let highest = check_highest_pattern(&header.sequence, &header.tag)?;
    let tag = FormatTag::from_bytes(&header.tag).ok_or_else(|| {
        FormatError::BadDescription(String::from_utf8_lossy(&header.tag).into_owned())
    })?;

    let mut song = Song::new(&parse_string(&header.title), tag);
    song.length = header.song_length;
    song.ignored = header.ignored;
    song.sequence = header.sequence;
    for (slot, raw) in song.samples.iter_mut().zip(&header.samples) {
        *slot = parse_sample_header(raw);
    }

    let channels = tag.channels();
    let pattern_size = DIVISIONS_PER_PATTERN * channels as usize * CELL_SIZE;
    let mut offset = HEADER_SIZE;
    for pat_idx in 0..=highest as usize {
        let bytes = data.get(offset..offset + pattern_size).ok_or_else(|| {
            FormatError::BadFile(format!("pattern {} is truncated", pat_idx))
        })?;
        song.patterns.push(parse_pattern(bytes, channels));
        offset += pattern_size;
    }

    load_sample_data(&mut song.samples, &data[offset..])?;

    debug!(
        title = song.title.as_str(),
        tag = tag.as_str(),
        channels,
        length = song.length,
        patterns = song.patterns.len(),
        "loaded module"
    );
    Ok(song)
}

fn read_header(data: &[u8]) -> Result<RawHeader, FormatError> {
    RawHeader::read(&mut Cursor::new(data)).map_err(|e| {
        if e.is_eof() {
            FormatError::BadFile(format!(
                "header needs {} bytes, file has {}",
                HEADER_SIZE,
                data.len()
            ))
        } else {
            FormatError::BadFile(e.to_string())
        }
    })
}

/// Highest pattern referenced anywhere in the table. Patterns 64 and up
/// require the `M!K!` tag.
fn check_highest_pattern(sequence: &[u8; SEQUENCE_LEN], tag: &[u8; 4]) -> Result<u8, FormatError> {
    let highest = sequence.iter().copied().max().unwrap_or(0);
    if highest as usize >= MAX_PATTERNS {
        return Err(FormatError::BadTable(format!(
            "pattern {} out of range",
            highest
        )));
    }
    let extended = FormatTag::from_bytes(tag).is_some_and(FormatTag::extended_patterns);
    if highest as usize >= STANDARD_PATTERNS && !extended {
        return Err(FormatError::BadTable(format!(
            "pattern {} needs the M!K! tag",
            highest
        )));
    }
    Ok(highest)
}

/// Parse a null-terminated string from bytes.
fn parse_string(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).trim().to_string()
}

fn parse_sample_header(raw: &RawSampleHeader) -> Sample {
    let mut sample = Sample::new(&parse_string(&raw.name));
    sample.length = raw.length_words as u32 * 2;
    sample.finetune = raw.finetune & 0x0F;
    sample.volume = raw.volume.min(64);
    sample.repeat_point = raw.repeat_point_words as u32 * 2;
    sample.repeat_length = raw.repeat_length_words as u32 * 2;

    // Loop bounds past the end of the data are common in real files
    if sample.has_loop() {
        if sample.repeat_point >= sample.length {
            sample.repeat_point = 0;
            sample.repeat_length = 0;
        } else if sample.repeat_point + sample.repeat_length > sample.length {
            sample.repeat_length = sample.length - sample.repeat_point;
        }
    }
    sample
}

fn parse_pattern(data: &[u8], channels: u8) -> Pattern {
    let mut pattern = Pattern::new(channels);
    for (cell, bytes) in pattern.data.iter_mut().zip(data.chunks_exact(CELL_SIZE)) {
        *cell = parse_cell(bytes);
    }
    pattern
}

/// Parse a single pattern cell (4 bytes).
fn parse_cell(data: &[u8]) -> Cell {
    // Byte 0: upper 4 bits of sample number, upper 4 bits of period
    // Byte 1: lower 8 bits of period
    // Byte 2: lower 4 bits of sample number, effect code
    // Byte 3: effect arguments x and y
    Cell {
        sample: (data[0] & 0xF0) | (data[2] >> 4),
        period: (((data[0] & 0x0F) as u16) << 8) | data[1] as u16,
        effect: data[2] & 0x0F,
        x: data[3] >> 4,
        y: data[3] & 0x0F,
    }
}

/// Copy each sample's waveform, flipping signed PCM to unsigned.
fn load_sample_data(samples: &mut [Sample], mut data: &[u8]) -> Result<(), FormatError> {
    for (i, sample) in samples.iter_mut().enumerate() {
        let len = sample.length as usize;
        if len == 0 {
            continue;
        }
        if data.len() < len {
            return Err(FormatError::UnexpectedEof { sample: i + 1 });
        }

        let mut buf = Vec::new();
        buf.try_reserve_exact(len)
            .map_err(|_| FormatError::NoMemory { sample: i + 1, bytes: len })?;
        buf.extend(data[..len].iter().map(|&b| to_unsigned(b as i8)));
        sample.data = buf;
        data = &data[len..];
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_nibbles_unpack() {
        // sample 0x1F, period 0x1AC (428), effect 0xC, args 0x40
        let cell = parse_cell(&[0x11, 0xAC, 0xFC, 0x40]);
        assert_eq!(cell.sample, 0x1F);
        assert_eq!(cell.period, 428);
        assert_eq!(cell.effect, 0xC);
        assert_eq!((cell.x, cell.y), (4, 0));
    }

    #[test]
    fn strings_stop_at_nul_and_trim() {
        assert_eq!(parse_string(b"snare \0garbage"), "snare");
        assert_eq!(parse_string(b"full"), "full");
    }

    #[test]
    fn loop_past_end_is_clamped() {
        let raw = RawSampleHeader {
            name: [0; 22],
            length_words: 100,
            finetune: 0xF3,
            volume: 70,
            repeat_point_words: 80,
            repeat_length_words: 50,
        };
        let s = parse_sample_header(&raw);
        assert_eq!(s.length, 200);
        assert_eq!(s.finetune, 3);
        assert_eq!(s.volume, 64);
        assert_eq!(s.repeat_point, 160);
        assert_eq!(s.repeat_length, 40);
    }

    #[test]
    fn loop_starting_past_end_is_dropped() {
        let raw = RawSampleHeader {
            name: [0; 22],
            length_words: 10,
            finetune: 0,
            volume: 64,
            repeat_point_words: 20,
            repeat_length_words: 4,
        };
        let s = parse_sample_header(&raw);
        assert!(!s.has_loop());
    }

    #[test]
    fn high_patterns_need_extended_tag() {
        let mut seq = [0u8; SEQUENCE_LEN];
        seq[5] = 64;
        assert!(matches!(
            check_highest_pattern(&seq, b"M.K."),
            Err(FormatError::BadTable(_))
        ));
        assert_eq!(check_highest_pattern(&seq, b"M!K!").unwrap(), 64);

        seq[5] = 128;
        assert!(check_highest_pattern(&seq, b"M!K!").is_err());
    }
}
