//! Streaming demultiplexer for MPEG-4 audio (`.m4a`) files.
//!
//! Bytes are pushed into an [`M4aDemuxer`] in chunks of any size. The box
//! tree is parsed as it arrives, the sample table of the audio track is
//! rebuilt from `stsc`/`stsz`/`stco`, and every AAC or ALAC sample found in
//! `mdat` is handed to a [`FrameSink`]. Nothing is ever read twice and no
//! seeking is needed, so the file must be laid out with `moov` before `mdat`.

use thiserror::Error;

pub mod r#box;
pub mod codec;
pub mod config;
pub mod demuxer;
pub mod extractor;
pub mod sink;

pub use crate::{
    codec::{AudioInfo, CodecConfig, CodecType},
    config::DemuxerConfig,
    demuxer::M4aDemuxer,
    extractor::SampleCursor,
    r#box::FourCC,
    sink::{DecoderSink, Frame, FrameSink, MultiDecoder, OwnedFrame},
};

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error")]
    Io(#[from] std::io::Error),

    #[error("Invalid {r#type:?} box size: {size}")]
    InvalidBoxSize { r#type: FourCC, size: u64 },

    #[error("Unsupported sample entry: {0:?}")]
    UnsupportedSampleEntry(FourCC),

    #[error("Missing decoder configuration in {0:?}")]
    MissingDecoderConfig(FourCC),

    #[error("Sample of {0} bytes does not fit into an ADTS frame")]
    AdtsFrameTooLarge(usize),

    #[error("Sample {index} is not covered by the sample table")]
    SampleOutOfRange { index: u32 },

    #[error("Child box overruns {r#type:?} by {excess} bytes")]
    ChildOverrun { r#type: FourCC, excess: u64 },
}

pub type Result<T> = std::result::Result<T, Error>;
