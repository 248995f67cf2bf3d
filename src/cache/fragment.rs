//! Cached segment types
//!
//! Payloads are `Bytes`, so handing the same fragment to every viewer only
//! bumps a reference count.

use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

/// Initialization segment (`ftyp` + `moov`) of one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitSegment {
    /// Raw segment bytes
    pub data: Bytes,
    /// MIME descriptor, e.g. `video/mp4; codecs="avc1.42E01E"`
    pub mime: String,
    /// Session epoch this segment belongs to
    pub epoch: u64,
}

/// One media fragment (`moof` + `mdat`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFragment {
    /// Sequence id, starting at 1 for every session
    pub sequence: u64,
    /// Raw fragment bytes
    pub data: Bytes,
    /// When the fragment was completed
    pub timestamp: Instant,
    /// Time since the previous fragment (or the initialization segment)
    pub duration: Duration,
    /// Session epoch this fragment belongs to
    pub epoch: u64,
}

impl MediaFragment {
    /// Size of the fragment in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Event delivered to live subscribers of a [`FragmentCache`](super::FragmentCache)
#[derive(Debug, Clone)]
pub enum CacheEvent {
    /// A new initialization segment is available (session start or codec change)
    Initialized(InitSegment),
    /// A new fragment was appended to the window
    Fragment(MediaFragment),
    /// The session was replaced; everything cached so far is gone
    Reset {
        /// Epoch of the new session
        epoch: u64,
    },
}

impl CacheEvent {
    /// Epoch the event belongs to
    pub fn epoch(&self) -> u64 {
        match self {
            CacheEvent::Initialized(init) => init.epoch,
            CacheEvent::Fragment(fragment) => fragment.epoch,
            CacheEvent::Reset { epoch } => *epoch,
        }
    }
}
