//! Fragment cache for MSE and HLS delivery
//!
//! The cache turns the transcoder's fragmented MP4 output into an
//! initialization segment plus a rolling window of fragments, and fans every
//! new segment out to live subscribers via `tokio::sync::broadcast`.
//!
//! # Architecture
//!
//! ```text
//!                          Arc<FragmentCache>
//!                     ┌─────────────────────────┐
//!   transcoder ──────►│ segmenter (ftyp/moov,   │
//!   stdout bytes      │            moof/mdat)   │
//!   (epoch-tagged)    │ init: Option<Init>      │
//!                     │ window: [3][4][5][6]    │
//!                     │ playlist: String        │
//!                     │ tx: broadcast::Tx       │
//!                     └───────────┬─────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         ▼                       ▼                       ▼
//!   [catch_up()]            [Subscription]          [fragment_by_id()]
//!   init + latest           sub.recv()              HLS request
//! ```
//!
//! # Sessions
//!
//! Every transcoder run is a new epoch. [`FragmentCache::reset`] clears all
//! state, restarts sequence numbering at 1 and tells subscribers; bytes from
//! an older epoch that arrive late are dropped on ingest.

pub mod config;
pub mod fragment;
pub mod playlist;
pub mod store;
pub mod subscription;
pub mod window;

pub use config::CacheConfig;
pub use fragment::{CacheEvent, InitSegment, MediaFragment};
pub use store::{CacheState, CacheStats, CatchUp, FragmentCache};
pub use subscription::{FragmentSubscription, Subscription};
pub use window::FragmentWindow;
