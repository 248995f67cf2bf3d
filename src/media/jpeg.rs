//! JPEG frame splitting
//!
//! The transcoder's image pipe (`-f image2pipe -c:v mjpeg`) is a plain
//! concatenation of JPEG files with no length prefix. Pipe reads do not line
//! up with image boundaries, so frames are recovered from the markers:
//!
//! ```text
//! FF D8 ........................ FF D9 FF D8 ............ FF D9
//! SOI          image 1           EOI  SOI     image 2     EOI
//! ```
//!
//! Entropy-coded data stuffs every `FF` with `00`, so `FF D9` only appears as
//! the end marker of a baseline frame.

use bytes::{Bytes, BytesMut};

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Incremental JPEG splitter
#[derive(Debug)]
pub struct JpegSplitter {
    buffer: BytesMut,
    /// Whether `buffer` starts with an SOI marker
    in_frame: bool,
    /// Offset where the next EOI search starts
    scan_from: usize,
    /// Largest frame accepted before the partial frame is discarded
    max_frame_size: usize,
}

impl JpegSplitter {
    /// Create a splitter with the given maximum frame size
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(128 * 1024),
            in_frame: false,
            scan_from: 0,
            max_frame_size,
        }
    }

    /// Drop any partial frame
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.in_frame = false;
        self.scan_from = 0;
    }

    /// Feed bytes and collect every complete frame they finish
    pub fn push(&mut self, data: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        loop {
            if !self.in_frame {
                match find(&self.buffer, &SOI) {
                    Some(start) => {
                        let _ = self.buffer.split_to(start);
                        self.in_frame = true;
                        self.scan_from = SOI.len();
                    }
                    None => {
                        // keep a trailing FF, it may be the first half of SOI
                        let keep = usize::from(self.buffer.last() == Some(&0xFF));
                        let drop = self.buffer.len() - keep;
                        let _ = self.buffer.split_to(drop);
                        break;
                    }
                }
            }

            match find(&self.buffer[self.scan_from..], &EOI) {
                Some(offset) => {
                    let end = self.scan_from + offset + EOI.len();
                    frames.push(self.buffer.split_to(end).freeze());
                    self.in_frame = false;
                    self.scan_from = 0;
                }
                None => {
                    if self.buffer.len() > self.max_frame_size {
                        tracing::warn!(
                            buffered = self.buffer.len(),
                            max = self.max_frame_size,
                            "JPEG frame exceeds maximum size, discarding"
                        );
                        self.reset();
                    } else {
                        // re-check the last byte in case EOI straddles two reads
                        self.scan_from = self.buffer.len().saturating_sub(1).max(SOI.len());
                    }
                    break;
                }
            }
        }

        frames
    }
}

fn find(haystack: &[u8], needle: &[u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg(tag: u8, len: usize) -> Vec<u8> {
        let mut out = vec![0xFF, 0xD8, 0xFF, 0xE0];
        out.extend(std::iter::repeat(tag).take(len));
        out.extend_from_slice(&[0xFF, 0x00, tag]); // stuffed FF in scan data
        out.extend_from_slice(&EOI);
        out
    }

    #[test]
    fn test_split_concatenated_frames() {
        let mut stream = jpeg(1, 10);
        stream.extend(jpeg(2, 20));

        let mut splitter = JpegSplitter::new(1024);
        let frames = splitter.push(&stream);

        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0][..], &jpeg(1, 10)[..]);
        assert_eq!(&frames[1][..], &jpeg(2, 20)[..]);
    }

    #[test]
    fn test_split_across_reads() {
        let stream = jpeg(3, 50);
        let mut splitter = JpegSplitter::new(1024);

        let mut frames = Vec::new();
        for chunk in stream.chunks(3) {
            frames.extend(splitter.push(chunk));
        }

        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &stream[..]);
    }

    #[test]
    fn test_eoi_split_between_reads() {
        let stream = jpeg(4, 8);
        let split = stream.len() - 1;

        let mut splitter = JpegSplitter::new(1024);
        assert!(splitter.push(&stream[..split]).is_empty());
        let frames = splitter.push(&stream[split..]);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_garbage_before_soi_discarded() {
        let mut stream = vec![0x00, 0x12, 0xFF];
        stream.extend(jpeg(5, 4));

        let mut splitter = JpegSplitter::new(1024);
        let frames = splitter.push(&stream);

        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &jpeg(5, 4)[..]);
    }

    #[test]
    fn test_soi_split_between_reads() {
        let stream = jpeg(6, 4);
        let mut splitter = JpegSplitter::new(1024);

        assert!(splitter.push(&[0x00, 0xFF]).is_empty());
        let frames = splitter.push(&stream[1..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &stream[..]);
    }

    #[test]
    fn test_oversized_frame_discarded() {
        let mut splitter = JpegSplitter::new(16);

        assert!(splitter.push(&jpeg(7, 64)[..40]).is_empty());
        // the tail of the oversized frame is junk, the next frame is intact
        let frames = splitter.push(&jpeg(8, 4));
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &jpeg(8, 4)[..]);
    }
}
