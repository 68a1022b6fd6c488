//! Synthetic module images for integration tests.

#![allow(dead_code)]

/// Bytes before the first pattern.
pub const HEADER_SIZE: usize = 1084;

struct SampleSpec {
    name: String,
    pcm: Vec<i8>,
    volume: u8,
    repeat_point: u16,
    repeat_length: u16,
}

/// Builds a module file cell by cell.
pub struct ModuleBuilder {
    title: String,
    tag: [u8; 4],
    channels: usize,
    sequence: Vec<u8>,
    samples: Vec<SampleSpec>,
    cells: Vec<(u8, usize, usize, [u8; 4])>,
}

impl ModuleBuilder {
    /// A 4-channel `M.K.` module.
    pub fn new() -> Self {
        Self::with_tag(b"M.K.", 4)
    }

    pub fn with_tag(tag: &[u8; 4], channels: usize) -> Self {
        Self {
            title: "synthetic".into(),
            tag: *tag,
            channels,
            sequence: vec![0],
            samples: Vec::new(),
            cells: Vec::new(),
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = title.into();
        self
    }

    pub fn sequence(mut self, sequence: &[u8]) -> Self {
        self.sequence = sequence.to_vec();
        self
    }

    /// Add the next sample slot. `pcm` must have an even length.
    pub fn sample(mut self, name: &str, volume: u8, pcm: Vec<i8>) -> Self {
        self.samples.push(SampleSpec {
            name: name.into(),
            pcm,
            volume,
            repeat_point: 0,
            repeat_length: 1,
        });
        self
    }

    /// Add a sample looping over `[point, point + len)` bytes.
    pub fn looped_sample(mut self, name: &str, volume: u8, pcm: Vec<i8>, point: u16, len: u16) -> Self {
        self.samples.push(SampleSpec {
            name: name.into(),
            pcm,
            volume,
            repeat_point: point / 2,
            repeat_length: len / 2,
        });
        self
    }

    /// Put a cell at `(pattern, division, channel)`.
    pub fn cell(
        mut self,
        pattern: u8,
        division: usize,
        channel: usize,
        sample: u8,
        period: u16,
        effect: u8,
        param: u8,
    ) -> Self {
        let bytes = [
            (sample & 0xF0) | ((period >> 8) as u8 & 0x0F),
            period as u8,
            ((sample & 0x0F) << 4) | (effect & 0x0F),
            param,
        ];
        self.cells.push((pattern, division, channel, bytes));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut data = Vec::new();
        let mut title = [0u8; 20];
        let n = self.title.len().min(20);
        title[..n].copy_from_slice(&self.title.as_bytes()[..n]);
        data.extend_from_slice(&title);

        for i in 0..31 {
            let mut name = [0u8; 22];
            match self.samples.get(i) {
                Some(s) => {
                    let n = s.name.len().min(22);
                    name[..n].copy_from_slice(&s.name.as_bytes()[..n]);
                    data.extend_from_slice(&name);
                    data.extend_from_slice(&((s.pcm.len() / 2) as u16).to_be_bytes());
                    data.push(0);
                    data.push(s.volume);
                    data.extend_from_slice(&s.repeat_point.to_be_bytes());
                    data.extend_from_slice(&s.repeat_length.to_be_bytes());
                }
                None => {
                    data.extend_from_slice(&name);
                    data.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 1]);
                }
            }
        }

        data.push(self.sequence.len() as u8);
        data.push(0x7F);
        let mut table = [0u8; 128];
        table[..self.sequence.len()].copy_from_slice(&self.sequence);
        data.extend_from_slice(&table);
        data.extend_from_slice(&self.tag);
        assert_eq!(data.len(), HEADER_SIZE);

        let highest = self.sequence.iter().copied().max().unwrap_or(0) as usize;
        let row = self.channels * 4;
        let mut patterns = vec![0u8; (highest + 1) * 64 * row];
        for &(pattern, division, channel, bytes) in &self.cells {
            let at = pattern as usize * 64 * row + division * row + channel * 4;
            patterns[at..at + 4].copy_from_slice(&bytes);
        }
        data.extend_from_slice(&patterns);

        for s in &self.samples {
            data.extend(s.pcm.iter().map(|&v| v as u8));
        }
        data
    }
}

impl Default for ModuleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// One cycle of a square wave, repeated to `len` bytes.
pub fn square(len: usize, period: usize) -> Vec<i8> {
    (0..len)
        .map(|i| if (i / (period / 2).max(1)) % 2 == 0 { 96 } else { -96 })
        .collect()
}

/// A module with one looping note on channel 1 for a whole pattern.
pub fn one_note_module() -> Vec<u8> {
    ModuleBuilder::new()
        .title("one note")
        .looped_sample("square", 64, square(64, 16), 0, 64)
        .cell(0, 0, 0, 1, 428, 0, 0)
        .build()
}
