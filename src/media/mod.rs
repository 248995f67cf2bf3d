//! Media handling for the transcoder outputs
//!
//! This module provides:
//! - Fragmented MP4 segmentation (initialization segment + `moof`/`mdat` fragments)
//! - Codec string extraction from AVC and AAC configuration records
//! - JPEG frame splitting for the motion-JPEG pipe

pub mod codec;
pub mod jpeg;
pub mod mp4;

pub use codec::{AudioConfig, AvcConfig};
pub use jpeg::JpegSplitter;
pub use mp4::{mime_from_moov, Mp4Segment, Mp4Segmenter, Pushed};
