//! Motion-JPEG frame relay
//!
//! Holds the most recent still image from the transcoder's image pipe and
//! pushes every new one to live subscribers. There is no history: a viewer
//! that joins gets the current frame and everything after it.

pub mod config;
pub mod store;

pub use config::RelayConfig;
pub use store::{FrameRelay, RelayState};
