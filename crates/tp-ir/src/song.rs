//! Song structure and sequencing types.

use alloc::vec::Vec;
use arrayvec::ArrayString;

use crate::pattern::{Cell, Pattern};
use crate::sample::Sample;

/// Number of sample slots in a 31-sample module.
pub const NUM_SAMPLES: usize = 31;

/// Entries in the sequence table.
pub const SEQUENCE_LEN: usize = 128;

/// Highest pattern count any module may reference.
pub const MAX_PATTERNS: usize = 128;

/// Pattern count allowed without the extended-pattern tag.
pub const STANDARD_PATTERNS: usize = 64;

/// The four-byte format tag at offset 1080, which fixes the channel count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatTag {
    /// `M.K.`: ProTracker, 4 channels
    MK,
    /// `M!K!`: ProTracker with more than 64 patterns
    MKExtended,
    /// `FLT4`: StarTrekker, 4 channels
    Flt4,
    /// `FLT8`: StarTrekker, 8 channels
    Flt8,
    /// `6CHN`: 6 channels
    SixChannel,
    /// `8CHN`: 8 channels
    EightChannel,
}

impl FormatTag {
    /// Recognize a tag, or `None` for anything unknown.
    pub fn from_bytes(tag: &[u8; 4]) -> Option<Self> {
        match tag {
            b"M.K." => Some(Self::MK),
            b"M!K!" => Some(Self::MKExtended),
            b"FLT4" => Some(Self::Flt4),
            b"FLT8" => Some(Self::Flt8),
            b"6CHN" => Some(Self::SixChannel),
            b"8CHN" => Some(Self::EightChannel),
            _ => None,
        }
    }

    /// The tag as it appears in the file.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MK => "M.K.",
            Self::MKExtended => "M!K!",
            Self::Flt4 => "FLT4",
            Self::Flt8 => "FLT8",
            Self::SixChannel => "6CHN",
            Self::EightChannel => "8CHN",
        }
    }

    /// Number of playback channels.
    pub const fn channels(self) -> u8 {
        match self {
            Self::MK | Self::MKExtended | Self::Flt4 => 4,
            Self::SixChannel => 6,
            Self::Flt8 | Self::EightChannel => 8,
        }
    }

    /// Whether the sequence table may reference patterns 64 and up.
    pub const fn extended_patterns(self) -> bool {
        matches!(self, Self::MKExtended)
    }
}

/// A complete module, immutable for the duration of a playback session.
#[derive(Clone, Debug)]
pub struct Song {
    /// Song title
    pub title: ArrayString<32>,
    /// The 31 sample slots (empty slots have length 0)
    pub samples: Vec<Sample>,
    /// Number of sequence positions that play (1-128)
    pub length: u8,
    /// The byte after the song length; kept for display
    pub ignored: u8,
    /// Song position to pattern index
    pub sequence: [u8; SEQUENCE_LEN],
    /// Format tag
    pub tag: FormatTag,
    /// Patterns 0..=highest referenced
    pub patterns: Vec<Pattern>,
}

impl Song {
    /// Create an empty song with 31 empty sample slots.
    pub fn new(title: &str, tag: FormatTag) -> Self {
        let mut song = Self {
            title: ArrayString::new(),
            samples: (0..NUM_SAMPLES).map(|_| Sample::default()).collect(),
            length: 0,
            ignored: 0,
            sequence: [0; SEQUENCE_LEN],
            tag,
            patterns: Vec::new(),
        };
        crate::push_truncated(&mut song.title, title);
        song
    }

    /// Number of playback channels.
    pub fn channels(&self) -> u8 {
        self.tag.channels()
    }

    /// Append a pattern and return its index.
    pub fn add_pattern(&mut self, pattern: Pattern) -> u8 {
        self.patterns.push(pattern);
        (self.patterns.len() - 1) as u8
    }

    /// Append a pattern index to the sequence table.
    pub fn push_sequence(&mut self, pattern: u8) {
        if (self.length as usize) < SEQUENCE_LEN {
            self.sequence[self.length as usize] = pattern;
            self.length += 1;
        }
    }

    /// Pattern index at a song position.
    pub fn pattern_index(&self, position: u8) -> u8 {
        self.sequence[position as usize % SEQUENCE_LEN]
    }

    /// Look up a cell; `None` if the pattern or cell does not exist.
    pub fn cell(&self, pattern: u8, division: usize, channel: usize) -> Option<&Cell> {
        self.patterns
            .get(pattern as usize)
            .and_then(|p| p.cell(division, channel))
    }

    /// Index of the first pattern whose shape does not match the channel count.
    pub fn misshapen_pattern(&self) -> Option<usize> {
        let channels = self.channels();
        self.patterns.iter().position(|p| !p.fits(channels))
    }

    /// Samples that carry data, with their 1-based numbers.
    pub fn used_samples(&self) -> impl Iterator<Item = (usize, &Sample)> {
        self.samples
            .iter()
            .enumerate()
            .filter(|(_, s)| s.length > 0)
            .map(|(i, s)| (i + 1, s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_map_to_channel_counts() {
        let cases: [(&[u8; 4], u8); 6] = [
            (b"M.K.", 4),
            (b"M!K!", 4),
            (b"FLT4", 4),
            (b"6CHN", 6),
            (b"FLT8", 8),
            (b"8CHN", 8),
        ];
        for (bytes, channels) in cases {
            let tag = FormatTag::from_bytes(bytes).unwrap();
            assert_eq!(tag.channels(), channels, "{}", tag.as_str());
            assert_eq!(tag.as_str().as_bytes(), bytes);
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert_eq!(FormatTag::from_bytes(b"OCTA"), None);
        assert_eq!(FormatTag::from_bytes(b"m.k."), None);
    }

    #[test]
    fn only_mk_extended_allows_high_patterns() {
        assert!(FormatTag::MKExtended.extended_patterns());
        assert!(!FormatTag::MK.extended_patterns());
        assert!(!FormatTag::EightChannel.extended_patterns());
    }

    #[test]
    fn new_song_has_31_empty_slots() {
        let song = Song::new("test", FormatTag::MK);
        assert_eq!(song.samples.len(), NUM_SAMPLES);
        assert_eq!(song.used_samples().count(), 0);
        assert_eq!(song.channels(), 4);
    }

    #[test]
    fn sequence_tracks_length() {
        let mut song = Song::new("test", FormatTag::SixChannel);
        let a = song.add_pattern(Pattern::new(6));
        let b = song.add_pattern(Pattern::new(6));
        song.push_sequence(b);
        song.push_sequence(a);
        assert_eq!(song.length, 2);
        assert_eq!(song.pattern_index(0), 1);
        assert!(song.cell(1, 0, 5).is_some());
        assert!(song.cell(2, 0, 0).is_none());
        assert_eq!(song.misshapen_pattern(), None);
    }

    #[test]
    fn narrow_pattern_is_reported_not_indexed() {
        let mut song = Song::new("test", FormatTag::EightChannel);
        song.add_pattern(Pattern::new(8));
        song.add_pattern(Pattern::new(4));
        song.push_sequence(1);
        assert_eq!(song.misshapen_pattern(), Some(1));
        assert!(song.cell(1, 0, 3).is_some());
        assert!(song.cell(1, 0, 7).is_none());
    }
}
