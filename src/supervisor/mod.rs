//! Transcoder process supervision
//!
//! A [`Supervisor`] owns at most one transcode session. It launches the
//! external process through a [`Transcoder`], pumps the two outputs into the
//! [`FragmentCache`](crate::cache::FragmentCache) and the
//! [`FrameRelay`](crate::relay::FrameRelay), and keeps the session alive:
//!
//! ```text
//!   start(args) ──► reset cache+relay ──► spawn ──► running
//!                          ▲                          │
//!                          │        exit / stall kill │
//!                          └── sleep(spawn_after_exit)┘
//!                                (until respawn_limit)
//! ```
//!
//! `stop()` kills the process, stops ingestion and resets both stores.

pub mod config;
mod control;
pub mod params;
pub mod process;
mod pump;
pub mod session;

pub use config::RestartPolicy;
pub use control::Supervisor;
pub use params::{ProfilePreset, TranscodeParams};
pub use process::{
    tracing_log_sink, FfmpegTranscoder, LogSink, OutputStream, ProcessHandle, TranscodeOutputs,
    Transcoder,
};
pub use session::{SessionInfo, SessionWatch};
