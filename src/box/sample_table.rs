use derivative::Derivative;

use crate::r#box::{decode_entries, Decode, Error, FullBoxHeader, Result};

// 8.5
/// Sample tables of one track, filled box by box while `stbl` is parsed.
#[derive(Derivative, Default, Clone)]
#[derivative(Debug)]
pub struct SampleTable {
    #[derivative(Debug = "ignore")]
    pub time_to_sample: Vec<TimeToSampleEntry>,
    pub sample_to_chunk: Vec<SampleToChunkEntry>,
    #[derivative(Debug = "ignore")]
    pub sample_size: SampleSize,
    #[derivative(Debug = "ignore")]
    pub chunk_offsets: Vec<u64>,
}

/// Where one sample lives in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleLocation {
    /// Zero-based index into the chunk offset table.
    pub chunk_index: u32,
    pub offset_in_chunk: u64,
    pub offset: u64,
    pub size: u32,
}

impl SampleTable {
    // 8.6.1.2
    pub fn decode_time_to_sample(&mut self, input: &mut &[u8]) -> Result<()> {
        FullBoxHeader::decode(input)?;
        let entry_count = u32::decode(input)?;
        decode_entries(input, entry_count, &mut self.time_to_sample)
    }

    // 8.7.4
    pub fn decode_sample_to_chunk(&mut self, input: &mut &[u8]) -> Result<()> {
        FullBoxHeader::decode(input)?;
        let entry_count = u32::decode(input)?;
        decode_entries(input, entry_count, &mut self.sample_to_chunk)
    }

    // 8.7.3.2
    pub fn decode_sample_size(&mut self, input: &mut &[u8]) -> Result<()> {
        FullBoxHeader::decode(input)?;
        let sample_size = u32::decode(input)?;
        let sample_count = u32::decode(input)?;
        if sample_size != 0 {
            self.sample_size = SampleSize::Global {
                sample_size,
                sample_count,
            };
            return Ok(());
        }

        let mut samples = Vec::new();
        let result = decode_entries(input, sample_count, &mut samples);
        self.sample_size = SampleSize::Unique(samples);
        result
    }

    // 8.7.5
    pub fn decode_chunk_offset(&mut self, input: &mut &[u8]) -> Result<()> {
        FullBoxHeader::decode(input)?;
        let entry_count = u32::decode(input)?;
        for _ in 0..entry_count {
            let chunk_offset = u32::decode(input)?;
            self.chunk_offsets.push(chunk_offset as u64);
        }
        Ok(())
    }

    // 8.7.5, co64
    pub fn decode_chunk_large_offset(&mut self, input: &mut &[u8]) -> Result<()> {
        FullBoxHeader::decode(input)?;
        let entry_count = u32::decode(input)?;
        decode_entries(input, entry_count, &mut self.chunk_offsets)
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_size.sample_count()
    }

    pub fn chunk_count(&self) -> u32 {
        self.chunk_offsets.len() as u32
    }

    pub fn size_of(&self, sample_index: u32) -> Option<u32> {
        self.sample_size.get(sample_index)
    }

    /// Resolves the chunk and absolute file offset of a zero-based sample.
    ///
    /// The `stsc` runs are walked from the start on every call; nothing is
    /// cached between consecutive samples.
    pub fn locate(&self, sample_index: u32) -> Result<SampleLocation> {
        let out_of_range = Error::SampleOutOfRange {
            index: sample_index,
        };
        let size = self.size_of(sample_index).ok_or(out_of_range)?;
        let index = sample_index as u64;
        let chunk_count = self.chunk_offsets.len() as u64;

        let mut samples_seen = 0u64;
        for (i, run) in self.sample_to_chunk.iter().enumerate() {
            let first_chunk = run.first_chunk.max(1) as u64;
            let run_chunks = match self.sample_to_chunk.get(i + 1) {
                Some(next) => (next.first_chunk as u64).saturating_sub(first_chunk),
                None => chunk_count.saturating_sub(first_chunk - 1),
            };
            let samples_per_chunk = run.samples_per_chunk as u64;
            let run_samples = run_chunks * samples_per_chunk;
            if index >= samples_seen + run_samples {
                samples_seen += run_samples;
                continue;
            }

            let within_run = index - samples_seen;
            let chunk_index = first_chunk - 1 + within_run / samples_per_chunk;
            let sample_in_chunk = (within_run % samples_per_chunk) as u32;
            let chunk_offset = *self
                .chunk_offsets
                .get(chunk_index as usize)
                .ok_or(Error::SampleOutOfRange {
                    index: sample_index,
                })?;

            let offset_in_chunk = match self.sample_size {
                SampleSize::Global { sample_size, .. } => {
                    sample_in_chunk as u64 * sample_size as u64
                }
                SampleSize::Unique(_) => (sample_index - sample_in_chunk..sample_index)
                    .map(|i| self.size_of(i).unwrap_or(0) as u64)
                    .sum(),
            };

            return Ok(SampleLocation {
                chunk_index: chunk_index as u32,
                offset_in_chunk,
                offset: chunk_offset + offset_in_chunk,
                size,
            });
        }

        Err(Error::SampleOutOfRange {
            index: sample_index,
        })
    }
}

// 8.6.1.2
/// Decoded for completeness; sample location does not depend on timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeToSampleEntry {
    pub sample_count: u32,
    pub sample_delta: u32,
}

impl Decode for TimeToSampleEntry {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            sample_count: Decode::decode(input)?,
            sample_delta: Decode::decode(input)?,
        })
    }
}

// 8.7.4
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleToChunkEntry {
    /// One-based.
    pub first_chunk: u32,
    pub samples_per_chunk: u32,
    pub sample_description_index: u32,
}

impl Decode for SampleToChunkEntry {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            first_chunk: Decode::decode(input)?,
            samples_per_chunk: Decode::decode(input)?,
            sample_description_index: Decode::decode(input)?,
        })
    }
}

// 8.7.3
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleSize {
    Global { sample_size: u32, sample_count: u32 },
    Unique(Vec<u32>),
}

impl Default for SampleSize {
    fn default() -> Self {
        SampleSize::Unique(Vec::new())
    }
}

impl SampleSize {
    pub fn sample_count(&self) -> u32 {
        match self {
            SampleSize::Global { sample_count, .. } => *sample_count,
            SampleSize::Unique(samples) => samples.len() as u32,
        }
    }

    pub fn get(&self, sample_index: u32) -> Option<u32> {
        match self {
            SampleSize::Global {
                sample_size,
                sample_count,
            } => (sample_index < *sample_count).then_some(*sample_size),
            SampleSize::Unique(samples) => samples.get(sample_index as usize).copied(),
        }
    }
}
