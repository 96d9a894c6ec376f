use crate::r#box::{Decode, Result};

pub mod aac;
pub mod alac;

use aac::AudioSpecificConfig;
use alac::{AlacSpecificConfig, ALAC_CONFIG_LEN};

pub const MIME_AAC: &str = "audio/aac";
pub const MIME_ALAC: &str = "audio/alac";
pub const MIME_UNKNOWN: &str = "audio/unknown";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CodecType {
    #[default]
    Unknown,
    Aac,
    Alac,
}

impl CodecType {
    pub fn mime(self) -> &'static str {
        match self {
            CodecType::Unknown => MIME_UNKNOWN,
            CodecType::Aac => MIME_AAC,
            CodecType::Alac => MIME_ALAC,
        }
    }
}

/// Codec of the adopted track together with the bytes a decoder needs
/// out-of-band: the `AudioSpecificConfig` for AAC, the magic cookie for ALAC.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodecConfig {
    codec: CodecType,
    raw: Vec<u8>,
}

impl CodecConfig {
    pub fn aac(raw: Vec<u8>) -> Result<Self> {
        AudioSpecificConfig::from_bytes(&raw)?;
        Ok(Self {
            codec: CodecType::Aac,
            raw,
        })
    }

    pub fn alac(raw: Vec<u8>) -> Result<Self> {
        AlacSpecificConfig::decode(&mut raw.as_slice())?;
        Ok(Self {
            codec: CodecType::Alac,
            raw,
        })
    }

    pub fn codec_type(&self) -> CodecType {
        self.codec
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn mime(&self) -> &'static str {
        self.codec.mime()
    }

    pub fn audio_specific_config(&self) -> Option<AudioSpecificConfig> {
        match self.codec {
            CodecType::Aac => AudioSpecificConfig::from_bytes(&self.raw).ok(),
            _ => None,
        }
    }

    pub fn alac_config(&self) -> Option<AlacSpecificConfig> {
        match self.codec {
            CodecType::Alac if self.raw.len() >= ALAC_CONFIG_LEN => {
                AlacSpecificConfig::decode(&mut self.raw.as_slice()).ok()
            }
            _ => None,
        }
    }
}

/// PCM format of the adopted track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl From<&AlacSpecificConfig> for AudioInfo {
    fn from(config: &AlacSpecificConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            channels: config.num_channels as u16,
            bits_per_sample: config.bit_depth as u16,
        }
    }
}
