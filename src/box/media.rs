use fixed::types::U16F16;
use tracing::{debug, warn};

use crate::{
    codec::{
        aac::{AudioSpecificConfig, DEFAULT_AUDIO_SPECIFIC_CONFIG},
        alac::{AlacSpecificConfig, ALAC_CONFIG_LEN},
        AudioInfo, CodecConfig,
    },
    r#box::{skip, split_box, BoxType, Decode, Error, FourCC, FullBoxHeader, Result},
};

const SOUND_HANDLER: FourCC = FourCC(*b"soun");

// 8.4.3
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerBox {
    pub handler_type: FourCC,
    pub name: String,
}

impl HandlerBox {
    pub fn is_audio(&self) -> bool {
        self.handler_type == SOUND_HANDLER
    }
}

impl Decode for HandlerBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        FullBoxHeader::decode(input)?;
        u32::decode(input)?; // pre_defined
        let handler_type = Decode::decode(input)?;
        skip(input, 12)?; // reserved

        let data = *input;
        let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        let name = String::from_utf8_lossy(&data[..end]).into_owned();
        *input = &data[data.len()..];
        Ok(Self { handler_type, name })
    }
}

// 8.5.2.2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSampleEntry {
    pub data_reference_index: u16,
    /// QuickTime sound description version, 0 for plain ISO entries.
    pub version: u16,
    pub channelcount: u16,
    pub samplesize: u16,
    pub samplerate: U16F16,
}

impl Decode for AudioSampleEntry {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        skip(input, 6)?; // reserved
        let data_reference_index = Decode::decode(input)?;

        let version = u16::decode(input)?;
        u16::decode(input)?; // revision
        u32::decode(input)?; // vendor
        let channelcount = Decode::decode(input)?;
        let samplesize = Decode::decode(input)?;
        u16::decode(input)?; // compression_id
        u16::decode(input)?; // packet_size
        let samplerate = Decode::decode(input)?;

        match version {
            1 => skip(input, 16)?,
            2 => skip(input, 36)?,
            _ => {}
        }
        Ok(Self {
            data_reference_index,
            version,
            channelcount,
            samplesize,
            samplerate,
        })
    }
}

/// First entry of a sample description, with the decoder configuration found
/// among its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleEntry {
    pub format: BoxType,
    pub audio: Option<AudioSampleEntry>,
    /// Raw `AudioSpecificConfig` taken from `esds`.
    pub audio_specific_config: Option<Vec<u8>>,
    /// Raw `ALACSpecificConfig` taken from the inner `alac` box.
    pub magic_cookie: Option<Vec<u8>>,
}

impl SampleEntry {
    pub fn decode(format: BoxType, mut input: &[u8]) -> Result<Self> {
        let mut entry = Self {
            format,
            audio: None,
            audio_specific_config: None,
            magic_cookie: None,
        };
        if !matches!(format, BoxType::Mp4a | BoxType::Alac) {
            return Ok(entry);
        }

        entry.audio = Some(AudioSampleEntry::decode(&mut input)?);
        entry.decode_children(input);
        Ok(entry)
    }

    fn decode_children(&mut self, mut input: &[u8]) {
        while !input.is_empty() {
            let (r#type, data) = match split_box(&mut input) {
                Ok(child) => child,
                Err(error) => {
                    warn!(%error, format = ?self.format.fourcc(), "malformed sample entry child");
                    return;
                }
            };
            debug!(box_type = ?r#type.fourcc(), size = data.len(), "sample entry child");
            match r#type {
                BoxType::Esds => match decode_esds(data) {
                    Ok(config) => self.audio_specific_config = Some(config),
                    Err(error) => warn!(%error, "unusable esds"),
                },
                BoxType::Alac => match decode_alac(data) {
                    Ok(cookie) => self.magic_cookie = Some(cookie),
                    Err(error) => warn!(%error, "unusable alac cookie"),
                },
                BoxType::Wave => self.decode_children(data),
                _ => {}
            }
        }
    }

    pub fn codec_config(&self) -> Result<CodecConfig> {
        match self.format {
            BoxType::Mp4a => {
                let raw = match &self.audio_specific_config {
                    Some(raw) => raw.clone(),
                    None => {
                        warn!("mp4a without esds, assuming AAC LC 44.1 kHz stereo");
                        DEFAULT_AUDIO_SPECIFIC_CONFIG.to_vec()
                    }
                };
                CodecConfig::aac(raw)
            }
            BoxType::Alac => {
                let cookie = self
                    .magic_cookie
                    .clone()
                    .ok_or(Error::MissingDecoderConfig(self.format.fourcc()))?;
                CodecConfig::alac(cookie)
            }
            format => Err(Error::UnsupportedSampleEntry(format.fourcc())),
        }
    }

    pub fn audio_info(&self) -> AudioInfo {
        let cookie = self
            .magic_cookie
            .as_deref()
            .and_then(|mut cookie| AlacSpecificConfig::decode(&mut cookie).ok());
        if let Some(config) = cookie {
            return AudioInfo::from(&config);
        }

        let mut info = self
            .audio
            .map(|audio| AudioInfo {
                sample_rate: audio.samplerate.to_num(),
                channels: audio.channelcount,
                bits_per_sample: audio.samplesize,
            })
            .unwrap_or_default();
        let asc = self
            .audio_specific_config
            .as_deref()
            .and_then(|raw| AudioSpecificConfig::from_bytes(raw).ok());
        if let Some(asc) = asc {
            if info.sample_rate == 0 {
                info.sample_rate = asc.sample_rate();
            }
            if info.channels == 0 {
                info.channels = asc.channels();
            }
        }
        info
    }
}

// 8.5.2
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleDescription {
    pub entry_count: u32,
    pub entry: Option<SampleEntry>,
}

impl Decode for SampleDescription {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        FullBoxHeader::decode(input)?;
        let entry_count = u32::decode(input)?;
        if entry_count == 0 {
            return Ok(Self {
                entry_count,
                entry: None,
            });
        }

        let (format, data) = split_box(input)?;
        Ok(Self {
            entry_count,
            entry: Some(SampleEntry::decode(format, data)?),
        })
    }
}

const ES_DESCRIPTOR: u8 = 0x03;
const DECODER_CONFIG_DESCRIPTOR: u8 = 0x04;
const DECODER_SPECIFIC_INFO: u8 = 0x05;

/// Extracts the `AudioSpecificConfig` bytes from an `esds` payload.
///
/// The descriptor tree is walked first; encoders that write broken descriptor
/// sizes are handled by falling back to the first `05 02` tag/length pair.
pub fn decode_esds(payload: &[u8]) -> Result<Vec<u8>> {
    let mut input = payload;
    match walk_es_descriptor(&mut input) {
        Ok(Some(config)) => return Ok(config),
        Ok(None) => {}
        Err(error) => debug!(%error, "esds descriptor walk failed"),
    }

    payload
        .windows(2)
        .position(|window| window == [DECODER_SPECIFIC_INFO, 0x02])
        .and_then(|i| payload.get(i + 2..i + 4))
        .map(<[u8]>::to_vec)
        .ok_or(Error::MissingDecoderConfig(BoxType::Esds.fourcc()))
}

fn walk_es_descriptor(input: &mut &[u8]) -> Result<Option<Vec<u8>>> {
    FullBoxHeader::decode(input)?;
    let (tag, mut es) = split_descriptor(input)?;
    if tag != ES_DESCRIPTOR {
        return Ok(None);
    }

    u16::decode(&mut es)?; // ES_ID
    let flags = u8::decode(&mut es)?;
    if flags & 0x80 != 0 {
        u16::decode(&mut es)?; // dependsOn_ES_ID
    }
    if flags & 0x40 != 0 {
        let url_len = u8::decode(&mut es)?;
        skip(&mut es, url_len as usize)?;
    }
    if flags & 0x20 != 0 {
        u16::decode(&mut es)?; // OCR_ES_Id
    }

    while !es.is_empty() {
        let (tag, mut config) = split_descriptor(&mut es)?;
        if tag != DECODER_CONFIG_DESCRIPTOR {
            continue;
        }
        // objectTypeIndication, streamType, bufferSizeDB, maxBitrate, avgBitrate
        skip(&mut config, 13)?;
        while !config.is_empty() {
            let (tag, info) = split_descriptor(&mut config)?;
            if tag == DECODER_SPECIFIC_INFO {
                return Ok(Some(info.to_vec()));
            }
        }
    }
    Ok(None)
}

fn split_descriptor<'a>(input: &mut &'a [u8]) -> Result<(u8, &'a [u8])> {
    let tag = u8::decode(input)?;
    let mut size = 0usize;
    for _ in 0..4 {
        let b = u8::decode(input)?;
        size = size << 7 | (b & 0x7F) as usize;
        if b & 0x80 == 0 {
            break;
        }
    }

    let data: &'a [u8] = *input;
    let (body, remaining_data) = data.split_at(size.min(data.len()));
    *input = remaining_data;
    Ok((tag, body))
}

/// Extracts the magic cookie from the payload of the `alac` box nested in an
/// `alac` sample entry.
pub fn decode_alac(mut payload: &[u8]) -> Result<Vec<u8>> {
    FullBoxHeader::decode(&mut payload)?;
    if payload.len() < ALAC_CONFIG_LEN {
        return Err(Error::MissingDecoderConfig(BoxType::Alac.fourcc()));
    }
    Ok(payload[..ALAC_CONFIG_LEN].to_vec())
}
