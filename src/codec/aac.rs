use crate::{Error, Result};

pub const ADTS_HEADER_LEN: usize = 7;

/// Largest value of the 13-bit ADTS `aac_frame_length` field.
pub const ADTS_MAX_FRAME_LEN: usize = 0x1FFF;

pub const SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// `AudioSpecificConfig` as written by encoders for plain LC streams:
/// AAC LC, 44.1 kHz, two channels.
pub const DEFAULT_AUDIO_SPECIFIC_CONFIG: [u8; 2] = [0x12, 0x10];

// ISO/IEC 14496-3 1.6.2.1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpecificConfig {
    pub object_type: u8,
    pub frequency_index: u8,
    /// Only present when `frequency_index` is the escape value 15.
    pub frequency: Option<u32>,
    pub channel_config: u8,
}

impl AudioSpecificConfig {
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut bits = BitReader::new(data);
        let mut object_type = bits.read(5)? as u8;
        if object_type == 31 {
            object_type = 32 + bits.read(6)? as u8;
        }
        let frequency_index = bits.read(4)? as u8;
        let frequency = if frequency_index == 0xF {
            Some(bits.read(24)?)
        } else {
            None
        };
        let channel_config = bits.read(4)? as u8;
        Ok(Self {
            object_type,
            frequency_index,
            frequency,
            channel_config,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.frequency.unwrap_or_else(|| {
            SAMPLE_RATES
                .get(self.frequency_index as usize)
                .copied()
                .unwrap_or(0)
        })
    }

    pub fn channels(&self) -> u16 {
        match self.channel_config {
            7 => 8,
            channels => channels as u16,
        }
    }
}

struct BitReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    fn read(&mut self, count: usize) -> Result<u32> {
        let mut value = 0u32;
        for _ in 0..count {
            let byte = self
                .data
                .get(self.position / 8)
                .ok_or_else(|| Error::Io(std::io::ErrorKind::UnexpectedEof.into()))?;
            let bit = (byte >> (7 - self.position % 8)) & 1;
            value = value << 1 | bit as u32;
            self.position += 1;
        }
        Ok(value)
    }
}

/// 7-byte ADTS header without CRC, placed in front of a raw AAC frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsHeader([u8; ADTS_HEADER_LEN]);

impl AdtsHeader {
    pub fn new(config: &AudioSpecificConfig, payload_len: usize) -> Result<Self> {
        let frame_len = payload_len + ADTS_HEADER_LEN;
        if frame_len > ADTS_MAX_FRAME_LEN {
            return Err(Error::AdtsFrameTooLarge(payload_len));
        }

        let profile = adts_profile(config.object_type);
        let frequency_index = config.frequency_index & 0xF;
        let channel_config = config.channel_config & 0x7;
        Ok(Self([
            0xFF,
            0xF1, // MPEG-4, layer 0, no CRC
            profile << 6 | frequency_index << 2 | channel_config >> 2,
            (channel_config & 0x3) << 6 | (frame_len >> 11) as u8,
            (frame_len >> 3) as u8,
            ((frame_len & 0x7) as u8) << 5 | 0x1F,
            0xFC, // buffer fullness 0x7FF, one raw data block
        ]))
    }

    pub fn frame_length(&self) -> usize {
        let [_, _, _, b3, b4, b5, _] = self.0;
        ((b3 & 0x3) as usize) << 11 | (b4 as usize) << 3 | (b5 >> 5) as usize
    }

    pub fn as_bytes(&self) -> &[u8; ADTS_HEADER_LEN] {
        &self.0
    }
}

/// ADTS can only signal the four core profiles. SBR (5) and PS (29) streams
/// carry an LC core, which decoders upgrade implicitly.
fn adts_profile(object_type: u8) -> u8 {
    match object_type {
        5 | 29 => 1,
        object_type => object_type.saturating_sub(1) & 0x3,
    }
}
