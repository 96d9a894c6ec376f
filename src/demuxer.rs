use std::{io, mem};

use derivative::Derivative;
use tracing::{debug, info, warn};

use crate::{
    codec::{AudioInfo, CodecConfig, CodecType},
    config::DemuxerConfig,
    extractor::{MediaExtractor, SampleCursor},
    r#box::{
        file::FileTypeBox,
        media::{HandlerBox, SampleDescription, SampleEntry},
        sample_table::SampleTable,
        stack::BoxStack,
        BoxHeader, BoxType, Decode, Error, FourCC, Result,
    },
    sink::{DecoderSink, FrameSink, MultiDecoder},
};

const SIGNATURE: [u8; 4] = *b"ftyp";
const HEADER_LEN: usize = 8;
const LARGE_HEADER_LEN: usize = 16;
const KNOWN_BRANDS: [[u8; 4]; 5] = [*b"M4A ", *b"M4B ", *b"mp42", *b"mp41", *b"isom"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    WaitingForSignature,
    ReadingBoxHeader,
    ReadingBoxPayload,
    ReadingMediaData,
    /// Unparseable remainder of the stream.
    Skipping,
}

/// Metadata of the `trak` currently being parsed.
#[derive(Debug, Default)]
struct TrackState {
    is_audio: Option<bool>,
    entry: Option<SampleEntry>,
    table: SampleTable,
}

/// Push-based demultiplexer for `.m4a` streams.
///
/// ```no_run
/// use m4a::{Frame, M4aDemuxer};
///
/// let mut frames = 0;
/// let mut demuxer = M4aDemuxer::new(|_: &Frame<'_>| frames += 1);
/// demuxer.begin();
/// demuxer.write(&std::fs::read("song.m4a").unwrap());
/// demuxer.end();
/// ```
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct M4aDemuxer<S> {
    config: DemuxerConfig,
    #[derivative(Debug = "ignore")]
    sink: S,
    active: bool,
    state: State,
    /// Absolute offset of the next input byte.
    position: u64,
    #[derivative(Debug = "ignore")]
    header: [u8; LARGE_HEADER_LEN],
    header_len: usize,
    current: Option<BoxHeader>,
    collect: bool,
    truncated: bool,
    #[derivative(Debug = "ignore")]
    payload: Vec<u8>,
    stack: BoxStack,
    file_type: Option<FileTypeBox>,
    track: TrackState,
    codec: Option<CodecConfig>,
    audio_info: Option<AudioInfo>,
    extractor: MediaExtractor,
}

impl<S: FrameSink> M4aDemuxer<S> {
    pub fn new(sink: S) -> Self {
        Self::with_config(DemuxerConfig::default(), sink)
    }

    pub fn with_config(config: DemuxerConfig, sink: S) -> Self {
        let extractor = MediaExtractor::new(&config);
        Self {
            config,
            sink,
            active: false,
            state: State::WaitingForSignature,
            position: 0,
            header: [0; LARGE_HEADER_LEN],
            header_len: 0,
            current: None,
            collect: false,
            truncated: false,
            payload: Vec::new(),
            stack: BoxStack::default(),
            file_type: None,
            track: TrackState::default(),
            codec: None,
            audio_info: None,
            extractor,
        }
    }

    /// Starts a new stream, discarding everything learned from the last one.
    pub fn begin(&mut self) {
        self.release();
        self.file_type = None;
        self.codec = None;
        self.audio_info = None;
        self.active = true;
        debug!("begin");
    }

    /// Ends the stream and frees its tables. Codec information stays
    /// available until the next [`M4aDemuxer::begin`].
    pub fn end(&mut self) {
        match self.state {
            State::ReadingMediaData => {
                info!(position = self.position, "mdat end");
            }
            State::ReadingBoxPayload => {
                warn!(
                    box_type = ?self.current.map(|header| header.r#type.fourcc()),
                    "stream ended inside a box"
                );
            }
            State::ReadingBoxHeader if self.header_len > 0 => {
                warn!(bytes = self.header_len, "stream ended inside a box header");
            }
            _ => {}
        }
        debug!(
            samples = self.extractor.emitted(),
            position = self.position,
            "end"
        );
        self.release();
        self.active = false;
    }

    fn release(&mut self) {
        self.state = State::WaitingForSignature;
        self.position = 0;
        self.header_len = 0;
        self.current = None;
        self.collect = false;
        self.truncated = false;
        self.payload = Vec::new();
        self.stack.clear();
        self.track = TrackState::default();
        self.extractor.reset();
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Parses `data` and returns its length; partial boxes are buffered
    /// internally.
    pub fn write(&mut self, data: &[u8]) -> usize {
        self.ingest(data)
    }

    fn ingest(&mut self, data: &[u8]) -> usize {
        if !self.active {
            warn!(len = data.len(), "demuxer not active, dropping input");
            return data.len();
        }

        let mut input = data;
        while !input.is_empty() {
            let used = match self.state {
                State::WaitingForSignature => self.scan_signature(input),
                State::ReadingBoxHeader => self.read_header(input),
                State::ReadingBoxPayload => self.read_payload(input),
                State::ReadingMediaData => self.read_media_data(input),
                State::Skipping => {
                    self.position += input.len() as u64;
                    input.len()
                }
            };
            input = &input[used..];
        }
        data.len()
    }

    fn scan_signature(&mut self, input: &[u8]) -> usize {
        for (i, &b) in input.iter().enumerate() {
            self.position += 1;
            if self.header_len == HEADER_LEN {
                self.header.copy_within(1..HEADER_LEN, 0);
                self.header_len -= 1;
            }
            self.header[self.header_len] = b;
            self.header_len += 1;

            if self.header_len == HEADER_LEN && self.header[4..HEADER_LEN] == SIGNATURE {
                let skipped = self.position - HEADER_LEN as u64;
                if skipped > 0 {
                    warn!(skipped, "ignored bytes before ftyp");
                }
                self.state = State::ReadingBoxHeader;
                if self.header_need() == HEADER_LEN {
                    self.finish_header();
                }
                return i + 1;
            }
        }
        input.len()
    }

    fn header_need(&self) -> usize {
        let [s0, s1, s2, s3, ..] = self.header;
        match (self.header_len >= HEADER_LEN, u32::from_be_bytes([s0, s1, s2, s3])) {
            (true, 1) => LARGE_HEADER_LEN,
            _ => HEADER_LEN,
        }
    }

    fn read_header(&mut self, input: &[u8]) -> usize {
        let mut used = 0;
        loop {
            let need = self.header_need();
            let take = (need - self.header_len).min(input.len() - used);
            self.header[self.header_len..self.header_len + take]
                .copy_from_slice(&input[used..used + take]);
            self.header_len += take;
            self.position += take as u64;
            used += take;

            if self.header_len < need {
                return used;
            }
            if self.header_need() > need {
                continue;
            }
            self.finish_header();
            return used;
        }
    }

    fn finish_header(&mut self) {
        let [s0, s1, s2, s3, t0, t1, t2, t3, ..] = self.header;
        let fourcc = FourCC([t0, t1, t2, t3]);
        let header_len = mem::take(&mut self.header_len);
        let offset = self.position - header_len as u64;
        let size = match u32::from_be_bytes([s0, s1, s2, s3]) {
            0 => BoxHeader::UNBOUNDED,
            1 => {
                let mut large = [0; 8];
                large.copy_from_slice(&self.header[HEADER_LEN..LARGE_HEADER_LEN]);
                u64::from_be_bytes(large)
            }
            size => size as u64,
        };
        debug!(box_type = ?fourcc, offset, size, depth = self.stack.depth(), "box header");

        if size < header_len as u64 {
            let error = Error::InvalidBoxSize {
                r#type: fourcc,
                size,
            };
            warn!(%error, offset, "skipping rest of stream");
            self.state = State::Skipping;
            return;
        }
        self.dispatch_header(BoxHeader::new(fourcc.into(), size, header_len as u8, offset));
    }

    fn dispatch_header(&mut self, header: BoxHeader) {
        match header.r#type {
            BoxType::Mdat => self.begin_media_data(header),
            r#type if header.is_unbounded() => {
                warn!(box_type = ?r#type.fourcc(), "box extends to end of stream, skipping rest of stream");
                self.state = State::Skipping;
            }
            r#type if r#type.is_container() => {
                if r#type == BoxType::Trak {
                    self.track = TrackState::default();
                }
                debug!(box_type = ?r#type.fourcc(), size = header.size, "enter container");
                self.stack.push(header);
                self.state = State::ReadingBoxHeader;
                self.unwind();
            }
            r#type => {
                self.collect = self.wants_payload(r#type);
                self.truncated = false;
                self.payload.clear();
                self.current = Some(header);
                self.state = State::ReadingBoxPayload;
                if header.is_complete() {
                    self.finish_payload();
                }
            }
        }
    }

    fn wants_payload(&self, r#type: BoxType) -> bool {
        let open_track = self.codec.is_none() && self.track.is_audio != Some(false);
        match r#type {
            BoxType::Ftyp => self.stack.is_empty(),
            // the media handler; `minf` may carry a data handler of its own
            BoxType::Hdlr => {
                open_track
                    && self.stack.innermost().map(|header| header.r#type) == Some(BoxType::Mdia)
            }
            BoxType::Stsd
            | BoxType::Stts
            | BoxType::Stsc
            | BoxType::Stsz
            | BoxType::Stco
            | BoxType::Co64 => open_track && self.stack.contains(BoxType::Stbl),
            _ => false,
        }
    }

    fn read_payload(&mut self, input: &[u8]) -> usize {
        let Some(mut header) = self.current else {
            self.state = State::ReadingBoxHeader;
            return 0;
        };
        let take = header.remaining().min(input.len() as u64) as usize;
        if self.collect {
            let room = self.config.max_box_size.saturating_sub(self.payload.len());
            let keep = take.min(room);
            self.payload.extend_from_slice(&input[..keep]);
            if keep < take && !self.truncated {
                warn!(
                    box_type = ?header.r#type.fourcc(),
                    size = header.size,
                    limit = self.config.max_box_size,
                    "box larger than scratch buffer, truncating"
                );
                self.truncated = true;
            }
        }

        header.consumed += take as u64;
        self.position += take as u64;
        self.current = Some(header);
        if header.is_complete() {
            self.finish_payload();
        }
        take
    }

    fn finish_payload(&mut self) {
        let Some(header) = self.current.take() else {
            return;
        };
        self.state = State::ReadingBoxHeader;

        if mem::take(&mut self.collect) {
            let payload = mem::take(&mut self.payload);
            if let Err(error) = self.interpret(header.r#type, &payload) {
                warn!(%error, box_type = ?header.r#type.fourcc(), "malformed box");
            }
            self.payload = payload;
            self.payload.clear();
        }
        self.complete_child(header.size);
    }

    fn interpret(&mut self, r#type: BoxType, mut input: &[u8]) -> Result<()> {
        let table = &mut self.track.table;
        match r#type {
            BoxType::Ftyp => {
                let file_type = FileTypeBox::decode(&mut input)?;
                info!(
                    major_brand = ?file_type.major_brand,
                    minor_version = file_type.minor_version,
                    compatible_brands = ?file_type.compatible_brands,
                    "file type"
                );
                if !KNOWN_BRANDS
                    .iter()
                    .any(|brand| file_type.is_compatible_with(FourCC(*brand)))
                {
                    warn!("no known mp4 brand, parsing anyway");
                }
                self.file_type = Some(file_type);
            }
            BoxType::Hdlr => {
                let handler = HandlerBox::decode(&mut input)?;
                debug!(handler_type = ?handler.handler_type, name = %handler.name, "handler");
                let is_audio = self.track.is_audio == Some(true) || handler.is_audio();
                self.track.is_audio = Some(is_audio);
            }
            BoxType::Stsd => {
                let description = SampleDescription::decode(&mut input)?;
                debug!(entries = description.entry_count, "sample description");
                if let Some(entry) = description.entry {
                    info!(format = ?entry.format.fourcc(), "codec detected");
                    self.track.entry = Some(entry);
                }
            }
            BoxType::Stts => {
                let result = table.decode_time_to_sample(&mut input);
                debug!(entries = table.time_to_sample.len(), "stts");
                result?;
            }
            BoxType::Stsc => {
                let result = table.decode_sample_to_chunk(&mut input);
                debug!(entries = table.sample_to_chunk.len(), "stsc");
                result?;
            }
            BoxType::Stsz => {
                let result = table.decode_sample_size(&mut input);
                debug!(samples = table.sample_count(), "stsz");
                result?;
            }
            BoxType::Stco => {
                let result = table.decode_chunk_offset(&mut input);
                debug!(chunks = table.chunk_count(), "stco");
                result?;
            }
            BoxType::Co64 => {
                let result = table.decode_chunk_large_offset(&mut input);
                debug!(chunks = table.chunk_count(), "co64");
                result?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Credits a finished child to its container and closes every container
    /// that became complete.
    fn complete_child(&mut self, size: u64) {
        if let Err(error) = self.stack.credit(size) {
            warn!(%error, "malformed box nesting");
        }
        self.unwind();
    }

    fn unwind(&mut self) {
        while let Some(done) = self.stack.pop_complete() {
            debug!(box_type = ?done.r#type.fourcc(), "leave container");
            if done.r#type == BoxType::Stbl {
                self.finalize_track();
            }
        }
    }

    fn finalize_track(&mut self) {
        if self.codec.is_some() {
            debug!("audio track already adopted, ignoring track");
            return;
        }
        let entry = self.track.entry.take();
        let recognised = entry
            .as_ref()
            .is_some_and(|entry| matches!(entry.format, BoxType::Mp4a | BoxType::Alac));
        if !self.track.is_audio.unwrap_or(recognised) {
            debug!("ignoring non-audio track");
            return;
        }

        let codec = match entry.as_ref().map(SampleEntry::codec_config) {
            Some(Ok(codec)) => codec,
            Some(Err(error)) => {
                warn!(%error, "no usable codec, passing samples through");
                CodecConfig::default()
            }
            None => {
                warn!("audio track without sample description");
                CodecConfig::default()
            }
        };
        let table = mem::take(&mut self.track.table);
        info!(
            codec = ?codec.codec_type(),
            samples = table.sample_count(),
            chunks = table.chunk_count(),
            "audio track adopted"
        );

        self.audio_info = entry.as_ref().map(SampleEntry::audio_info);
        if codec.codec_type() != CodecType::Unknown {
            self.sink.on_codec_config(&codec);
        }
        self.extractor.load(table, codec.clone());
        self.codec = Some(codec);
    }

    fn begin_media_data(&mut self, header: BoxHeader) {
        info!(
            offset = header.offset,
            size = ?(!header.is_unbounded()).then_some(header.size),
            "mdat start"
        );
        if !self.extractor.is_loaded() {
            warn!("mdat before sample table, discarding its payload");
        }
        self.current = Some(header);
        self.state = State::ReadingMediaData;
        if header.is_complete() {
            self.finish_media_data();
        }
    }

    fn read_media_data(&mut self, input: &[u8]) -> usize {
        let Some(mut header) = self.current else {
            self.state = State::ReadingBoxHeader;
            return 0;
        };
        let take = header.remaining().min(input.len() as u64) as usize;
        self.extractor
            .write(self.position, &input[..take], &mut self.sink);

        header.consumed += take as u64;
        self.position += take as u64;
        self.current = Some(header);
        if header.is_complete() {
            self.finish_media_data();
        }
        take
    }

    fn finish_media_data(&mut self) {
        let Some(header) = self.current.take() else {
            return;
        };
        info!(position = self.position, samples = self.extractor.emitted(), "mdat end");
        self.state = State::ReadingBoxHeader;
        self.complete_child(header.size);
    }

    pub fn config(&self) -> &DemuxerConfig {
        &self.config
    }

    pub fn codec_type(&self) -> CodecType {
        self.codec
            .as_ref()
            .map(CodecConfig::codec_type)
            .unwrap_or_default()
    }

    pub fn codec_config(&self) -> Option<&CodecConfig> {
        self.codec.as_ref()
    }

    pub fn mime(&self) -> &'static str {
        self.codec_type().mime()
    }

    pub fn audio_info(&self) -> Option<AudioInfo> {
        self.audio_info
    }

    pub fn file_type(&self) -> Option<&FileTypeBox> {
        self.file_type.as_ref()
    }

    pub fn sample_table(&self) -> Option<&SampleTable> {
        self.extractor.table()
    }

    pub fn sample_cursor(&self) -> Option<SampleCursor> {
        self.extractor.cursor()
    }

    pub fn samples_emitted(&self) -> u32 {
        self.extractor.emitted()
    }

    /// Number of bytes consumed since [`M4aDemuxer::begin`].
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

impl<D: MultiDecoder> M4aDemuxer<DecoderSink<D>> {
    /// Demuxer that decodes directly into `decoder`.
    pub fn with_decoder(decoder: D) -> Self {
        Self::new(DecoderSink::new(decoder))
    }

    pub fn decoder(&self) -> &D {
        self.sink.decoder()
    }

    pub fn decoder_mut(&mut self) -> &mut D {
        self.sink.decoder_mut()
    }
}

impl<S: FrameSink> io::Write for M4aDemuxer<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.ingest(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
