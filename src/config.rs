use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DemuxerConfig {
    /// Capacity of the scratch buffer for non-container box payloads. Bytes
    /// past it are dropped.
    pub max_box_size: usize,
    /// Samples larger than this are skipped instead of buffered.
    pub max_sample_size: u32,
    /// Prefix every AAC sample with a 7-byte ADTS header.
    pub adts_framing: bool,
}

impl Default for DemuxerConfig {
    fn default() -> Self {
        Self {
            max_box_size: 1 << 20,
            max_sample_size: 1 << 20,
            adts_framing: true,
        }
    }
}
