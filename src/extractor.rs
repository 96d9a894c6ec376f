use derivative::Derivative;
use tracing::{info, trace, warn};

use crate::{
    codec::{
        aac::{AdtsHeader, AudioSpecificConfig},
        CodecConfig,
    },
    config::DemuxerConfig,
    r#box::sample_table::{SampleSize, SampleTable},
    sink::{Frame, FrameSink},
};

/// Unusable samples in a row after which extraction gives up.
const MAX_SKIPPED_SAMPLES: u32 = 1 << 12;

/// Position of the next sample to extract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleCursor {
    pub sample_index: u32,
    pub offset: u64,
    pub size: u32,
}

/// Cuts the samples of the adopted track out of the `mdat` byte stream.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct MediaExtractor {
    table: Option<SampleTable>,
    codec: CodecConfig,
    adts: Option<AudioSpecificConfig>,
    cursor: Option<SampleCursor>,
    #[derivative(Debug = "ignore")]
    sample: Vec<u8>,
    #[derivative(Debug = "ignore")]
    frame: Vec<u8>,
    adts_framing: bool,
    max_sample_size: u32,
    emitted: u32,
}

impl MediaExtractor {
    pub fn new(config: &DemuxerConfig) -> Self {
        Self {
            table: None,
            codec: CodecConfig::default(),
            adts: None,
            cursor: None,
            sample: Vec::new(),
            frame: Vec::new(),
            adts_framing: config.adts_framing,
            max_sample_size: config.max_sample_size,
            emitted: 0,
        }
    }

    pub fn load(&mut self, table: SampleTable, codec: CodecConfig) {
        self.adts = match self.adts_framing {
            true => codec.audio_specific_config(),
            false => None,
        };
        self.codec = codec;
        self.table = Some(table);
        self.sample.clear();
        self.emitted = 0;
        self.cursor = self.locate_from(0);
    }

    pub fn reset(&mut self) {
        self.table = None;
        self.codec = CodecConfig::default();
        self.adts = None;
        self.cursor = None;
        self.sample = Vec::new();
        self.frame = Vec::new();
        self.emitted = 0;
    }

    pub fn is_loaded(&self) -> bool {
        self.table.is_some()
    }

    pub fn table(&self) -> Option<&SampleTable> {
        self.table.as_ref()
    }

    pub fn cursor(&self) -> Option<SampleCursor> {
        self.cursor
    }

    pub fn emitted(&self) -> u32 {
        self.emitted
    }

    /// Consumes `data`, whose first byte sits at absolute file offset
    /// `position`. Bytes outside the pending sample are dropped.
    pub fn write<S: FrameSink + ?Sized>(
        &mut self,
        mut position: u64,
        mut data: &[u8],
        sink: &mut S,
    ) {
        while !data.is_empty() {
            let Some(cursor) = self.cursor else {
                return;
            };
            let expected = cursor.offset + self.sample.len() as u64;
            if position < expected {
                let gap = (expected - position).min(data.len() as u64) as usize;
                data = &data[gap..];
                position += gap as u64;
                continue;
            }
            if position > expected {
                warn!(
                    sample_index = cursor.sample_index,
                    offset = cursor.offset,
                    position,
                    "sample lies behind the stream position, skipping"
                );
                self.sample.clear();
                self.cursor = self.locate_from(cursor.sample_index + 1);
                continue;
            }

            let sample_end = cursor.offset + cursor.size as u64;
            let take = ((sample_end - position) as usize).min(data.len());
            self.sample.extend_from_slice(&data[..take]);
            data = &data[take..];
            position += take as u64;

            if self.sample.len() == cursor.size as usize {
                self.emit(cursor, sink);
                self.sample.clear();
                self.cursor = self.locate_from(cursor.sample_index + 1);
            }
        }
    }

    fn emit<S: FrameSink + ?Sized>(&mut self, cursor: SampleCursor, sink: &mut S) {
        let data = match &self.adts {
            Some(config) => match AdtsHeader::new(config, self.sample.len()) {
                Ok(header) => {
                    self.frame.clear();
                    self.frame.extend_from_slice(header.as_bytes());
                    self.frame.extend_from_slice(&self.sample);
                    &self.frame
                }
                Err(error) => {
                    warn!(%error, sample_index = cursor.sample_index, "dropping sample");
                    return;
                }
            },
            None => &self.sample,
        };

        trace!(
            sample_index = cursor.sample_index,
            offset = cursor.offset,
            size = cursor.size,
            "sample"
        );
        sink.write_frame(&Frame {
            codec: self.codec.codec_type(),
            mime: self.codec.mime(),
            sample_index: cursor.sample_index,
            offset: cursor.offset,
            data,
        });
        self.emitted += 1;
    }

    /// Finds the first extractable sample at or after `sample_index`.
    fn locate_from(&self, sample_index: u32) -> Option<SampleCursor> {
        let table = self.table.as_ref()?;
        if let SampleSize::Global { sample_size, .. } = table.sample_size {
            if sample_size > self.max_sample_size {
                warn!(
                    size = sample_size,
                    limit = self.max_sample_size,
                    "every sample too large, nothing to extract"
                );
                return None;
            }
        }

        let mut skipped = 0;
        for index in sample_index..table.sample_count() {
            if skipped == MAX_SKIPPED_SAMPLES {
                warn!(sample_index = index, skipped, "too many unusable samples, giving up");
                return None;
            }
            let location = match table.locate(index) {
                Ok(location) => location,
                Err(error) => {
                    warn!(%error, "sample table exhausted early");
                    return None;
                }
            };
            if location.size == 0 {
                skipped += 1;
                continue;
            }
            if location.size > self.max_sample_size {
                warn!(
                    sample_index = index,
                    size = location.size,
                    limit = self.max_sample_size,
                    "sample too large, skipping"
                );
                skipped += 1;
                continue;
            }
            return Some(SampleCursor {
                sample_index: index,
                offset: location.offset,
                size: location.size,
            });
        }

        info!(samples = self.emitted, "all samples extracted");
        None
    }
}
