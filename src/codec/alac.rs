use crate::r#box::{Decode, Result};

pub const ALAC_CONFIG_LEN: usize = 24;

// ALACSpecificConfig, as carried in the `alac` box of an `alac` sample entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlacSpecificConfig {
    pub frame_length: u32,
    pub compatible_version: u8,
    pub bit_depth: u8,
    pub pb: u8,
    pub mb: u8,
    pub kb: u8,
    pub num_channels: u8,
    pub max_run: u16,
    pub max_frame_bytes: u32,
    pub avg_bit_rate: u32,
    pub sample_rate: u32,
}

impl Decode for AlacSpecificConfig {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            frame_length: Decode::decode(input)?,
            compatible_version: Decode::decode(input)?,
            bit_depth: Decode::decode(input)?,
            pb: Decode::decode(input)?,
            mb: Decode::decode(input)?,
            kb: Decode::decode(input)?,
            num_channels: Decode::decode(input)?,
            max_run: Decode::decode(input)?,
            max_frame_bytes: Decode::decode(input)?,
            avg_bit_rate: Decode::decode(input)?,
            sample_rate: Decode::decode(input)?,
        })
    }
}
