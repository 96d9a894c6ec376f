use tracing::{trace, warn};

use crate::codec::{CodecConfig, CodecType};

/// One extracted sample, ADTS-framed for AAC unless framing is disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub codec: CodecType,
    pub mime: &'static str,
    pub sample_index: u32,
    /// Absolute file offset of the first sample byte.
    pub offset: u64,
    pub data: &'a [u8],
}

impl Frame<'_> {
    pub fn to_owned_frame(&self) -> OwnedFrame {
        OwnedFrame {
            codec: self.codec,
            mime: self.mime,
            sample_index: self.sample_index,
            offset: self.offset,
            data: self.data.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedFrame {
    pub codec: CodecType,
    pub mime: &'static str,
    pub sample_index: u32,
    pub offset: u64,
    pub data: Vec<u8>,
}

/// Receives every frame in ascending sample order.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &Frame<'_>);

    /// Called once, when the audio track is adopted and before its first frame.
    fn on_codec_config(&mut self, _config: &CodecConfig) {}
}

impl<F> FrameSink for F
where
    F: FnMut(&Frame<'_>),
{
    fn write_frame(&mut self, frame: &Frame<'_>) {
        self(frame)
    }
}

/// Decoder front end able to switch between codecs by mime type.
pub trait MultiDecoder {
    fn selected(&self) -> Option<&'static str>;

    /// Returns false if no decoder is registered for `mime`.
    fn select(&mut self, mime: &'static str) -> bool;

    /// Returns how many bytes were accepted.
    fn write(&mut self, data: &[u8]) -> usize;

    fn set_codec_config(&mut self, _mime: &'static str, _config: &[u8]) -> bool {
        true
    }
}

/// Feeds frames to a [`MultiDecoder`], selecting the frame's codec for the
/// duration of the write and putting back whatever was selected before.
///
/// The select, write, restore sequence is not reentrant: the decoder must not
/// push bytes back into the demuxer that owns this sink.
#[derive(Debug, Default)]
pub struct DecoderSink<D> {
    decoder: D,
}

impl<D: MultiDecoder> DecoderSink<D> {
    pub fn new(decoder: D) -> Self {
        Self { decoder }
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    pub fn decoder_mut(&mut self) -> &mut D {
        &mut self.decoder
    }

    pub fn into_inner(self) -> D {
        self.decoder
    }
}

impl<D: MultiDecoder> FrameSink for DecoderSink<D> {
    fn write_frame(&mut self, frame: &Frame<'_>) {
        let previous = self.decoder.selected();
        let switch = previous != Some(frame.mime);
        if switch && !self.decoder.select(frame.mime) {
            warn!(mime = frame.mime, "no decoder for frame");
            return;
        }

        let mut data = frame.data;
        while !data.is_empty() {
            let written = self.decoder.write(data);
            if written == 0 {
                warn!(
                    sample_index = frame.sample_index,
                    remaining = data.len(),
                    "decoder stopped accepting data"
                );
                break;
            }
            data = &data[written.min(data.len())..];
        }

        if let (true, Some(previous)) = (switch, previous) {
            trace!(mime = previous, "restoring decoder");
            self.decoder.select(previous);
        }
    }

    fn on_codec_config(&mut self, config: &CodecConfig) {
        if !self.decoder.set_codec_config(config.mime(), config.raw()) {
            warn!(mime = config.mime(), "decoder rejected codec config");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{MIME_AAC, MIME_ALAC};

    #[derive(Default)]
    struct Recorder {
        selected: Option<&'static str>,
        known: Vec<&'static str>,
        chunk: usize,
        written: Vec<(&'static str, Vec<u8>)>,
        configs: Vec<(&'static str, Vec<u8>)>,
    }

    impl MultiDecoder for Recorder {
        fn selected(&self) -> Option<&'static str> {
            self.selected
        }

        fn select(&mut self, mime: &'static str) -> bool {
            if !self.known.contains(&mime) {
                return false;
            }
            self.selected = Some(mime);
            true
        }

        fn write(&mut self, data: &[u8]) -> usize {
            let len = data.len().min(self.chunk);
            let mime = self.selected.unwrap_or("none");
            self.written.push((mime, data[..len].to_vec()));
            len
        }

        fn set_codec_config(&mut self, mime: &'static str, config: &[u8]) -> bool {
            self.configs.push((mime, config.to_vec()));
            true
        }
    }

    fn frame<'a>(mime: &'static str, data: &'a [u8]) -> Frame<'a> {
        Frame {
            codec: CodecType::Aac,
            mime,
            sample_index: 0,
            offset: 0,
            data,
        }
    }

    #[test]
    fn restores_previous_selection() {
        let mut sink = DecoderSink::new(Recorder {
            selected: Some("audio/mpeg"),
            known: vec!["audio/mpeg", MIME_AAC],
            chunk: usize::MAX,
            ..Default::default()
        });
        sink.write_frame(&frame(MIME_AAC, &[1, 2, 3]));

        let decoder = sink.into_inner();
        assert_eq!(decoder.written, vec![(MIME_AAC, vec![1, 2, 3])]);
        assert_eq!(decoder.selected, Some("audio/mpeg"));
    }

    #[test]
    fn keeps_selection_when_nothing_was_selected() {
        let mut sink = DecoderSink::new(Recorder {
            known: vec![MIME_ALAC],
            chunk: usize::MAX,
            ..Default::default()
        });
        sink.write_frame(&frame(MIME_ALAC, &[9]));
        assert_eq!(sink.decoder().selected, Some(MIME_ALAC));
    }

    #[test]
    fn short_writes_are_retried() {
        let mut sink = DecoderSink::new(Recorder {
            known: vec![MIME_AAC],
            chunk: 2,
            ..Default::default()
        });
        sink.write_frame(&frame(MIME_AAC, &[1, 2, 3, 4, 5]));
        let chunks: Vec<_> = sink.decoder().written.iter().map(|(_, d)| d.clone()).collect();
        assert_eq!(chunks, vec![vec![1, 2], vec![3, 4], vec![5]]);
    }

    #[test]
    fn stalled_decoder_does_not_hang() {
        let mut sink = DecoderSink::new(Recorder {
            known: vec![MIME_AAC],
            chunk: 0,
            ..Default::default()
        });
        sink.write_frame(&frame(MIME_AAC, &[1, 2]));
        assert_eq!(sink.decoder().written.len(), 1);
    }

    #[test]
    fn unknown_mime_is_dropped() {
        let mut sink = DecoderSink::new(Recorder {
            selected: Some(MIME_AAC),
            known: vec![MIME_AAC],
            chunk: usize::MAX,
            ..Default::default()
        });
        sink.write_frame(&frame("audio/unknown", &[1]));
        assert!(sink.decoder().written.is_empty());
        assert_eq!(sink.decoder().selected, Some(MIME_AAC));
    }

    #[test]
    fn codec_config_is_forwarded_by_mime() {
        let mut sink = DecoderSink::new(Recorder::default());
        let config = CodecConfig::aac(vec![0x12, 0x10]).unwrap();
        sink.on_codec_config(&config);
        assert_eq!(
            sink.decoder().configs,
            vec![(MIME_AAC, vec![0x12, 0x10])]
        );
    }

    #[test]
    fn closures_are_sinks() {
        let mut sizes = Vec::new();
        let mut sink = |frame: &Frame<'_>| sizes.push(frame.data.len());
        sink.write_frame(&frame(MIME_AAC, &[1, 2]));
        sink.write_frame(&frame(MIME_AAC, &[3]));
        assert_eq!(sizes, vec![2, 1]);
    }
}
