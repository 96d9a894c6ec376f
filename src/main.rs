use std::{
    fs::{self, File},
    io::{self, BufWriter},
    path::PathBuf,
};

use clap::Parser;
use m4a::{CodecConfig, DemuxerConfig, Frame, FrameSink, M4aDemuxer};
use memmap2::Mmap;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Extracts the audio frames of an .m4a file.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// File to demux
    input: PathBuf,

    /// Bytes handed to the demuxer per write
    #[arg(short, long, default_value_t = 1024)]
    chunk_size: usize,

    /// TOML file with demuxer settings
    #[arg(short = 'C', long)]
    config: Option<PathBuf>,

    /// Write the extracted frames (ADTS for AAC) to this file
    #[arg(short, long)]
    output: Option<PathBuf>,
}

struct Dump<W> {
    output: Option<W>,
    frames: u64,
    bytes: u64,
}

impl<W: io::Write> FrameSink for Dump<W> {
    fn write_frame(&mut self, frame: &Frame<'_>) {
        self.frames += 1;
        self.bytes += frame.data.len() as u64;
        debug!(
            sample_index = frame.sample_index,
            offset = frame.offset,
            size = frame.data.len(),
            mime = frame.mime,
            "frame"
        );

        if let Some(output) = &mut self.output {
            if let Err(error) = output.write_all(frame.data) {
                warn!(%error, "cannot write output, continuing without it");
                self.output = None;
            }
        }
    }

    fn on_codec_config(&mut self, config: &CodecConfig) {
        info!(mime = config.mime(), config = ?config.raw(), "codec config");
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => toml::from_str::<DemuxerConfig>(&fs::read_to_string(path)?)?,
        None => DemuxerConfig::default(),
    };
    debug!(?config, "config");

    let file = File::open(&args.input)?;
    let data = unsafe { Mmap::map(&file)? };
    let output = args
        .output
        .as_ref()
        .map(File::create)
        .transpose()?
        .map(BufWriter::new);

    let mut demuxer = M4aDemuxer::with_config(
        config,
        Dump {
            output,
            frames: 0,
            bytes: 0,
        },
    );
    demuxer.begin();
    for chunk in data.chunks(args.chunk_size.max(1)) {
        demuxer.write(chunk);
    }

    let dump = demuxer.sink();
    info!(
        path = %args.input.display(),
        codec = ?demuxer.codec_type(),
        mime = demuxer.mime(),
        audio = ?demuxer.audio_info(),
        brand = ?demuxer.file_type().map(|file_type| file_type.major_brand),
        frames = dump.frames,
        bytes = dump.bytes,
        "done"
    );
    demuxer.end();

    if let Some(mut output) = demuxer.into_sink().output {
        io::Write::flush(&mut output)?;
    }
    Ok(())
}
