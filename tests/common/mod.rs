#![allow(dead_code)]

use m4a::{CodecConfig, Frame, FrameSink, M4aDemuxer, MultiDecoder, OwnedFrame};

pub const LC_44100_STEREO: [u8; 2] = [0x12, 0x10];

pub const ALAC_COOKIE: [u8; 24] = [
    0x00, 0x00, 0x10, 0x00, 0x00, 0x10, 0x28, 0x0A, 0x0E, 0x02, 0x00, 0xFF, 0x00, 0x00, 0x20,
    0x00, 0x00, 0x07, 0xD0, 0x00, 0x00, 0x00, 0xAC, 0x44,
];

pub fn boxed(r#type: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut data = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
    data.extend_from_slice(r#type);
    data.extend_from_slice(payload);
    data
}

pub fn large_boxed(r#type: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut data = 1u32.to_be_bytes().to_vec();
    data.extend_from_slice(r#type);
    data.extend_from_slice(&((payload.len() + 16) as u64).to_be_bytes());
    data.extend_from_slice(payload);
    data
}

pub fn full_box(r#type: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut data = vec![0; 4];
    data.extend_from_slice(payload);
    boxed(r#type, &data)
}

fn u32s(values: impl IntoIterator<Item = u32>) -> Vec<u8> {
    values.into_iter().flat_map(u32::to_be_bytes).collect()
}

pub fn ftyp() -> Vec<u8> {
    boxed(b"ftyp", b"M4A \0\0\x02\0M4A isommp42")
}

pub fn free(size: usize) -> Vec<u8> {
    boxed(b"free", &vec![0; size - 8])
}

pub fn hdlr(handler_type: &[u8; 4]) -> Vec<u8> {
    let mut payload = vec![0; 4];
    payload.extend_from_slice(handler_type);
    payload.extend_from_slice(&[0; 12]);
    payload.extend_from_slice(b"Handler\0");
    full_box(b"hdlr", &payload)
}

pub fn audio_entry(format: &[u8; 4], channels: u16, rate: u16, children: &[u8]) -> Vec<u8> {
    let mut payload = vec![0; 6];
    payload.extend_from_slice(&1u16.to_be_bytes());
    payload.extend_from_slice(&[0; 8]);
    payload.extend_from_slice(&channels.to_be_bytes());
    payload.extend_from_slice(&16u16.to_be_bytes());
    payload.extend_from_slice(&[0; 4]);
    payload.extend_from_slice(&rate.to_be_bytes());
    payload.extend_from_slice(&[0; 2]);
    payload.extend_from_slice(children);
    boxed(format, &payload)
}

pub fn esds(audio_specific_config: &[u8]) -> Vec<u8> {
    let mut info = vec![0x05, audio_specific_config.len() as u8];
    info.extend_from_slice(audio_specific_config);
    let mut config = vec![0x04, (13 + info.len()) as u8, 0x40, 0x15];
    config.extend_from_slice(&[0; 11]);
    config.extend(info);
    let mut es = vec![0x03, (3 + config.len() + 3) as u8, 0x00, 0x01, 0x00];
    es.extend(config);
    es.extend_from_slice(&[0x06, 0x01, 0x02]);
    full_box(b"esds", &es)
}

pub fn mp4a(audio_specific_config: &[u8]) -> Vec<u8> {
    audio_entry(b"mp4a", 2, 44100, &esds(audio_specific_config))
}

pub fn alac(cookie: &[u8]) -> Vec<u8> {
    audio_entry(b"alac", 2, 44100, &full_box(b"alac", cookie))
}

pub fn stsd(entry: &[u8]) -> Vec<u8> {
    let mut payload = 1u32.to_be_bytes().to_vec();
    payload.extend_from_slice(entry);
    full_box(b"stsd", &payload)
}

pub fn stts(entries: &[(u32, u32)]) -> Vec<u8> {
    let mut payload = (entries.len() as u32).to_be_bytes().to_vec();
    payload.extend(u32s(entries.iter().flat_map(|&(count, delta)| [count, delta])));
    full_box(b"stts", &payload)
}

/// `(first_chunk, samples_per_chunk)` runs.
pub fn stsc(runs: &[(u32, u32)]) -> Vec<u8> {
    let mut payload = (runs.len() as u32).to_be_bytes().to_vec();
    payload.extend(u32s(runs.iter().flat_map(|&(first, per_chunk)| [first, per_chunk, 1])));
    full_box(b"stsc", &payload)
}

pub fn stsz_uniform(size: u32, count: u32) -> Vec<u8> {
    full_box(b"stsz", &u32s([size, count]))
}

pub fn stsz(sizes: &[u32]) -> Vec<u8> {
    let mut payload = u32s([0, sizes.len() as u32]);
    payload.extend(u32s(sizes.iter().copied()));
    full_box(b"stsz", &payload)
}

pub fn stco(offsets: &[u32]) -> Vec<u8> {
    let mut payload = (offsets.len() as u32).to_be_bytes().to_vec();
    payload.extend(u32s(offsets.iter().copied()));
    full_box(b"stco", &payload)
}

pub fn co64(offsets: &[u64]) -> Vec<u8> {
    let mut payload = (offsets.len() as u32).to_be_bytes().to_vec();
    payload.extend(offsets.iter().flat_map(|offset| offset.to_be_bytes()));
    full_box(b"co64", &payload)
}

/// `trak > mdia > (hdlr, minf > stbl > tables)`.
pub fn trak(handler_type: &[u8; 4], tables: &[Vec<u8>]) -> Vec<u8> {
    let stbl = boxed(b"stbl", &tables.concat());
    let minf = boxed(b"minf", &stbl);
    let mut mdia = hdlr(handler_type);
    mdia.extend(minf);
    boxed(b"trak", &boxed(b"mdia", &mdia))
}

pub fn moov(traks: &[Vec<u8>]) -> Vec<u8> {
    boxed(b"moov", &traks.concat())
}

/// Total size of `ftyp` + `moov`, which is also the offset of the `mdat`
/// header when nothing else sits in between.
pub fn head_len(moov: &[u8]) -> usize {
    ftyp().len() + moov.len()
}

pub fn file(moov: &[u8], media: &[u8]) -> Vec<u8> {
    [ftyp(), moov.to_vec(), boxed(b"mdat", media)].concat()
}

/// The single-track AAC file: two 4-byte samples in one chunk, with the chunk
/// offset pointing at the first `mdat` payload byte.
pub fn aac_file(media: &[u8]) -> (Vec<u8>, u64) {
    let build = |chunk_offset: u32| {
        moov(&[trak(
            b"soun",
            &[
                stsd(&mp4a(&LC_44100_STEREO)),
                stts(&[(2, 1024)]),
                stsc(&[(1, 2)]),
                stsz_uniform(4, 2),
                stco(&[chunk_offset]),
            ],
        )])
    };
    let offset = head_len(&build(0)) + 8;
    (file(&build(offset as u32), media), offset as u64)
}

#[derive(Debug, Default)]
pub struct Frames {
    pub frames: Vec<OwnedFrame>,
    pub configs: Vec<CodecConfig>,
}

impl FrameSink for Frames {
    fn write_frame(&mut self, frame: &Frame<'_>) {
        self.frames.push(frame.to_owned_frame());
    }

    fn on_codec_config(&mut self, config: &CodecConfig) {
        self.configs.push(config.clone());
    }
}

pub fn demux(data: &[u8], chunk_size: usize) -> M4aDemuxer<Frames> {
    let mut demuxer = M4aDemuxer::new(Frames::default());
    demuxer.begin();
    for chunk in data.chunks(chunk_size) {
        assert_eq!(demuxer.write(chunk), chunk.len());
    }
    demuxer
}

/// Decoder that records what it is fed per selected mime type.
#[derive(Debug, Default)]
pub struct RecordingDecoder {
    pub selected: Option<&'static str>,
    pub written: Vec<(&'static str, Vec<u8>)>,
    pub configs: Vec<(&'static str, Vec<u8>)>,
}

impl MultiDecoder for RecordingDecoder {
    fn selected(&self) -> Option<&'static str> {
        self.selected
    }

    fn select(&mut self, mime: &'static str) -> bool {
        self.selected = Some(mime);
        true
    }

    fn write(&mut self, data: &[u8]) -> usize {
        let mime = self.selected.unwrap_or("none");
        self.written.push((mime, data.to_vec()));
        data.len()
    }

    fn set_codec_config(&mut self, mime: &'static str, config: &[u8]) -> bool {
        self.configs.push((mime, config.to_vec()));
        true
    }
}
