//! Fragmented MP4 segmentation
//!
//! The transcoder writes a fragmented MP4 stream (`-movflags
//! +frag_keyframe+empty_moov+default_base_moof`). At the top level that
//! stream is a flat sequence of boxes:
//!
//! ```text
//! +------+------+------+------+------+------+-----
//! | ftyp | moov | moof | mdat | moof | mdat | ...
//! +------+------+------+------+------+------+-----
//!  \___________/ \___________/ \___________/
//!  initialization   fragment      fragment
//! ```
//!
//! Box header:
//! ```text
//! +----------+----------+-------------------------+
//! | size (4) | type (4) | largesize (8, if size=1)|
//! +----------+----------+-------------------------+
//! ```
//!
//! [`Mp4Segmenter`] accepts arbitrary reads (no alignment to box boundaries)
//! and yields complete initialization segments and fragments.

use bytes::{Buf, Bytes, BytesMut};

use super::codec::{AudioConfig, AvcConfig};
use crate::error::MediaError;

/// Four character box type
pub type BoxType = [u8; 4];

const HEADER_LEN: usize = 8;
const LARGE_HEADER_LEN: usize = 16;

/// Output of the segmenter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mp4Segment {
    /// `ftyp` + `moov`, with the MIME descriptor derived from `moov`
    Initialization { data: Bytes, mime: String },
    /// `moof` + `mdat`
    Fragment(Bytes),
}

/// Result of one [`Mp4Segmenter::push`]
///
/// Segments completed before a corrupt header are kept alongside the error.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Pushed {
    pub segments: Vec<Mp4Segment>,
    pub error: Option<MediaError>,
}

/// Incremental splitter for a fragmented MP4 byte stream
#[derive(Debug)]
pub struct Mp4Segmenter {
    /// Bytes received but not yet consumed as a complete box
    buffer: BytesMut,
    /// `ftyp` waiting for its `moov`
    pending_ftyp: Option<Bytes>,
    /// `moof` waiting for its `mdat`
    pending_moof: Option<Bytes>,
    /// Largest box accepted before the stream is considered corrupt
    max_box_size: usize,
}

impl Mp4Segmenter {
    /// Create a segmenter with the given maximum box size
    pub fn new(max_box_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            pending_ftyp: None,
            pending_moof: None,
            max_box_size,
        }
    }

    /// Number of buffered bytes not yet part of a complete box
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop all partial state
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.pending_ftyp = None;
        self.pending_moof = None;
    }

    /// Feed bytes and collect every segment they complete
    ///
    /// On a corrupt header the segmenter resets itself after the segments
    /// already completed; the caller may keep pushing and parsing resumes
    /// at the next read.
    pub fn push(&mut self, data: &[u8]) -> Pushed {
        self.buffer.extend_from_slice(data);

        let mut pushed = Pushed::default();
        loop {
            let (box_type, size) = match self.peek_header() {
                Ok(Some(header)) => header,
                Ok(None) => break,
                Err(e) => {
                    self.reset();
                    pushed.error = Some(e);
                    break;
                }
            };

            if self.buffer.len() < size {
                break;
            }

            let data = self.buffer.split_to(size).freeze();
            if let Some(segment) = self.on_box(box_type, data) {
                pushed.segments.push(segment);
            }
        }

        pushed
    }

    /// Read the next box header without consuming it
    fn peek_header(&self) -> Result<Option<(BoxType, usize)>, MediaError> {
        if self.buffer.len() < HEADER_LEN {
            return Ok(None);
        }

        let mut header = &self.buffer[..];
        let size32 = header.get_u32();
        let mut box_type = [0u8; 4];
        header.copy_to_slice(&mut box_type);

        let (size, header_len) = if size32 == 1 {
            if self.buffer.len() < LARGE_HEADER_LEN {
                return Ok(None);
            }
            (header.get_u64(), LARGE_HEADER_LEN)
        } else {
            (size32 as u64, HEADER_LEN)
        };

        // size 0 means "to end of file", which a live stream never has
        if size < header_len as u64 {
            return Err(MediaError::InvalidBox { box_type, size });
        }
        if size > self.max_box_size as u64 {
            return Err(MediaError::BoxTooLarge { box_type, size });
        }

        Ok(Some((box_type, size as usize)))
    }

    fn on_box(&mut self, box_type: BoxType, data: Bytes) -> Option<Mp4Segment> {
        match &box_type {
            b"ftyp" => {
                self.pending_ftyp = Some(data);
                self.pending_moof = None;
                None
            }
            b"moov" => {
                let mime = mime_from_moov(&data);
                let data = match self.pending_ftyp.take() {
                    Some(ftyp) => concat(&ftyp, &data),
                    None => data,
                };
                self.pending_moof = None;
                Some(Mp4Segment::Initialization { data, mime })
            }
            b"moof" => {
                self.pending_moof = Some(data);
                None
            }
            b"mdat" => match self.pending_moof.take() {
                Some(moof) => Some(Mp4Segment::Fragment(concat(&moof, &data))),
                None => {
                    tracing::trace!(size = data.len(), "Dropping mdat without moof");
                    None
                }
            },
            // styp, sidx, free, mfra, ...
            _ => None,
        }
    }
}

fn concat(a: &[u8], b: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(a.len() + b.len());
    out.extend_from_slice(a);
    out.extend_from_slice(b);
    out.freeze()
}

/// Iterator over the boxes packed in a byte slice, yielding `(type, payload)`
///
/// Stops at the first malformed or truncated header.
pub struct BoxIter<'a> {
    data: &'a [u8],
}

impl<'a> BoxIter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl<'a> Iterator for BoxIter<'a> {
    type Item = (BoxType, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.len() < HEADER_LEN {
            return None;
        }

        let mut header = self.data;
        let size32 = header.get_u32();
        let mut box_type = [0u8; 4];
        header.copy_to_slice(&mut box_type);

        let (size, header_len) = if size32 == 1 {
            if header.len() < 8 {
                return None;
            }
            (header.get_u64() as usize, LARGE_HEADER_LEN)
        } else {
            (size32 as usize, HEADER_LEN)
        };

        if size < header_len || size > self.data.len() {
            self.data = &[];
            return None;
        }

        let payload = &self.data[header_len..size];
        self.data = &self.data[size..];
        Some((box_type, payload))
    }
}

fn child<'a>(data: &'a [u8], box_type: &BoxType) -> Option<&'a [u8]> {
    BoxIter::new(data)
        .find(|(t, _)| t == box_type)
        .map(|(_, payload)| payload)
}

/// Size of the fixed fields of a VisualSampleEntry before its child boxes
const VISUAL_SAMPLE_ENTRY_LEN: usize = 78;
/// Size of the fixed fields of an AudioSampleEntry before its child boxes
const AUDIO_SAMPLE_ENTRY_LEN: usize = 28;

/// Collect RFC 6381 codec strings for every track in a `moov` box
pub fn codecs_from_moov(moov: &[u8]) -> Vec<String> {
    let payload = match BoxIter::new(moov).next() {
        Some((t, payload)) if &t == b"moov" => payload,
        _ => return Vec::new(),
    };

    let mut codecs = Vec::new();
    for (_, trak) in BoxIter::new(payload).filter(|(t, _)| t == b"trak") {
        let stsd = child(trak, b"mdia")
            .and_then(|mdia| child(mdia, b"minf"))
            .and_then(|minf| child(minf, b"stbl"))
            .and_then(|stbl| child(stbl, b"stsd"));

        // full box header (4) + entry count (4)
        let entries = match stsd {
            Some(stsd) if stsd.len() >= 8 => &stsd[8..],
            _ => continue,
        };

        for (entry_type, entry) in BoxIter::new(entries) {
            if let Some(codec) = sample_entry_codec(&entry_type, entry) {
                codecs.push(codec);
            }
        }
    }

    codecs
}

fn sample_entry_codec(entry_type: &BoxType, entry: &[u8]) -> Option<String> {
    match entry_type {
        b"avc1" | b"avc3" => {
            let children = entry.get(VISUAL_SAMPLE_ENTRY_LEN..)?;
            let avcc = child(children, b"avcC")?;
            match AvcConfig::parse(Bytes::copy_from_slice(avcc)) {
                Ok(config) => Some(config.codec_string()),
                Err(e) => {
                    tracing::warn!(error = %e, "Unreadable avcC box");
                    None
                }
            }
        }
        b"mp4a" => {
            let children = entry.get(AUDIO_SAMPLE_ENTRY_LEN..)?;
            let esds = child(children, b"esds")?;
            match AudioConfig::parse_esds(Bytes::copy_from_slice(esds)) {
                Ok(config) => Some(config.codec_string()),
                Err(e) => {
                    tracing::warn!(error = %e, "Unreadable esds box");
                    None
                }
            }
        }
        // Unknown sample entries are reported by their four character code
        other => std::str::from_utf8(other).ok().map(str::to_string),
    }
}

/// MIME descriptor for a `moov` box, e.g. `video/mp4; codecs="avc1.42E01E, mp4a.40.2"`
pub fn mime_from_moov(moov: &[u8]) -> String {
    let codecs = codecs_from_moov(moov);
    if codecs.is_empty() {
        "video/mp4".to_string()
    } else {
        format!("video/mp4; codecs=\"{}\"", codecs.join(", "))
    }
}
