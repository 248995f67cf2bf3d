//! Viewer session multiplexing
//!
//! Each connected viewer gets a worker task, its own cache or relay
//! subscription and a bounded outbox. The transport layer (websocket,
//! socket.io, HTTP multipart...) drains the outbox and forwards commands;
//! it is not part of this crate.
//!
//! A viewer that stops reading only fills its own outbox and, past that,
//! its own subscription slot, where the oldest events are dropped. The
//! ingestion path never waits on a viewer.

pub mod config;
pub mod jpeg;
pub mod message;
pub mod mse;

pub use config::ViewerConfig;
pub use jpeg::JpegViewer;
pub use message::{JoinError, MseCommand, UnknownCommand, ViewerMessage};
pub use mse::{MseViewer, ViewerOutbox};
