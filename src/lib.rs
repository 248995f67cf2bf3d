//! Live IP camera fan-out
//!
//! An external transcoder pulls an RTSP camera and writes two streams:
//! fragmented MP4 and a sequence of JPEG stills. This crate supervises that
//! process and fans both streams out to any number of viewers.
//!
//! ```text
//!                    ┌──────────────┐ stdout  ┌───────────────┐──► MseViewer
//!   RTSP camera ───► │  transcoder  │───────► │ FragmentCache │──► HlsEndpoint
//!                    │  (ffmpeg)    │ fd 4    ├───────────────┤
//!                    └──────▲───────┘───────► │  FrameRelay   │──► JpegViewer
//!                           │                 └───────────────┘
//!                      Supervisor (respawn, stall kill, reset)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use ipcam_live::{
//!     FfmpegTranscoder, FragmentCache, FrameRelay, HlsEndpoint, RestartPolicy, Supervisor,
//!     TranscodeParams,
//! };
//!
//! # async fn run() -> ipcam_live::Result<()> {
//! let cache = Arc::new(FragmentCache::new());
//! let relay = Arc::new(FrameRelay::new());
//! let supervisor = Supervisor::new(FfmpegTranscoder::new(), Arc::clone(&cache), relay);
//!
//! let params = TranscodeParams::new("rtsp://camera/stream").rtsp_transport("tcp");
//! supervisor.start_params(&params, RestartPolicy::default()).await?;
//!
//! let hls = HlsEndpoint::new(cache, supervisor.watch());
//! let playlist = hls.get("test.m3u8").await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod error;
pub mod hls;
pub mod media;
pub mod relay;
pub mod supervisor;
pub mod viewer;

pub use cache::{CacheConfig, CacheEvent, FragmentCache, InitSegment, MediaFragment};
pub use error::{Error, Result};
pub use hls::{HlsEndpoint, HlsError, HlsResponse};
pub use relay::{FrameRelay, RelayConfig};
pub use supervisor::{
    FfmpegTranscoder, RestartPolicy, SessionInfo, SessionWatch, Supervisor, TranscodeParams,
    Transcoder,
};
pub use viewer::{JpegViewer, MseCommand, MseViewer, ViewerConfig, ViewerMessage};
