//! Fragment cache implementation
//!
//! Owns the parse state, the initialization segment and the fragment window
//! for the current session, and republishes every new segment to live
//! subscribers.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{broadcast, watch, RwLock};
use tokio::time::Instant;

use super::config::CacheConfig;
use super::fragment::{CacheEvent, InitSegment, MediaFragment};
use super::playlist;
use super::subscription::FragmentSubscription;
use super::window::FragmentWindow;
use crate::media::{Mp4Segment, Mp4Segmenter};

/// Per-session state of the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Waiting for the initialization segment of the current session
    AwaitingInit,
    /// Initialization segment received, fragments are being cached
    Ready,
}

/// Readiness published through the watch channel
#[derive(Debug, Clone)]
struct Readiness {
    epoch: u64,
    init: Option<InitSegment>,
    fragments: u64,
}

/// Everything a late joiner needs, taken under one lock
#[derive(Debug, Clone)]
pub struct CatchUp {
    /// Epoch of the snapshot
    pub epoch: u64,
    /// Initialization segment, if the session is ready
    pub init: Option<InitSegment>,
    /// Current playlist text, if any fragment is retained
    pub playlist: Option<String>,
    /// Most recently published fragment
    pub latest: Option<MediaFragment>,
}

/// Statistics for the cache
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Current session epoch
    pub epoch: u64,
    /// Current state
    pub state: CacheState,
    /// Number of retained fragments
    pub fragment_count: usize,
    /// Size of retained fragments in bytes
    pub window_size_bytes: usize,
    /// Fragments produced in this session
    pub fragments_total: u64,
    /// Number of live subscribers
    pub subscriber_count: usize,
}

struct CacheInner {
    epoch: u64,
    state: CacheState,
    segmenter: Mp4Segmenter,
    init: Option<InitSegment>,
    window: FragmentWindow,
    playlist: Option<String>,
    next_sequence: u64,
    /// Completion time of the previous segment, for fragment durations
    last_segment_at: Option<Instant>,
}

/// Live-window cache for the fragmented MP4 output
///
/// All mutations take the write lock and publish while holding it, so a
/// subscriber registered under the read lock sees every event either in its
/// snapshot or on its channel, never both and never neither.
pub struct FragmentCache {
    inner: RwLock<CacheInner>,
    tx: broadcast::Sender<CacheEvent>,
    ready: watch::Sender<Readiness>,
    config: CacheConfig,
}

impl FragmentCache {
    /// Create a new cache with default configuration
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    /// Create a new cache with custom configuration
    pub fn with_config(config: CacheConfig) -> Self {
        let (tx, _) = broadcast::channel(config.broadcast_capacity);
        let (ready, _) = watch::channel(Readiness {
            epoch: 0,
            init: None,
            fragments: 0,
        });

        Self {
            inner: RwLock::new(CacheInner {
                epoch: 0,
                state: CacheState::AwaitingInit,
                segmenter: Mp4Segmenter::new(config.max_box_size),
                init: None,
                window: FragmentWindow::new(config.window_size),
                playlist: None,
                next_sequence: 1,
                last_segment_at: None,
            }),
            tx,
            ready,
            config,
        }
    }

    /// Get the cache configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Discard all state and start a new session
    ///
    /// Returns the new session epoch; data tagged with any other epoch is
    /// ignored by [`ingest`](Self::ingest) from now on.
    pub async fn reset(&self) -> u64 {
        let mut inner = self.inner.write().await;

        inner.epoch += 1;
        inner.state = CacheState::AwaitingInit;
        inner.segmenter.reset();
        inner.init = None;
        inner.window.clear();
        inner.playlist = None;
        inner.next_sequence = 1;
        inner.last_segment_at = None;

        let epoch = inner.epoch;
        self.ready.send_replace(Readiness {
            epoch,
            init: None,
            fragments: 0,
        });
        let _ = self.tx.send(CacheEvent::Reset { epoch });

        tracing::info!(epoch = epoch, "Fragment cache reset");
        epoch
    }

    /// Feed raw transcoder output for session `epoch`
    ///
    /// Reads need not align with box boundaries. Data from a superseded
    /// session is dropped.
    pub async fn ingest(&self, epoch: u64, data: &[u8]) {
        let mut inner = self.inner.write().await;

        if inner.epoch != epoch {
            tracing::debug!(
                epoch = epoch,
                current = inner.epoch,
                bytes = data.len(),
                "Dropping data from superseded session"
            );
            return;
        }

        let pushed = inner.segmenter.push(data);

        let now = Instant::now();
        for segment in pushed.segments {
            match segment {
                Mp4Segment::Initialization { data, mime } => {
                    self.on_initialization(&mut inner, data, mime, now)
                }
                Mp4Segment::Fragment(data) => self.on_fragment(&mut inner, data, now),
            }
        }

        if let Some(e) = pushed.error {
            tracing::warn!(epoch = epoch, error = %e, "Fragmented MP4 parse error, resyncing");
        }
    }

    fn on_initialization(&self, inner: &mut CacheInner, data: Bytes, mime: String, now: Instant) {
        let init = InitSegment {
            data,
            mime,
            epoch: inner.epoch,
        };

        if inner.state == CacheState::Ready {
            // Codec parameters changed mid-session: old fragments cannot be
            // decoded with the new header.
            tracing::info!(
                epoch = inner.epoch,
                mime = %init.mime,
                "Initialization segment replaced"
            );
            inner.window.clear();
            inner.playlist = None;
        } else {
            tracing::info!(epoch = inner.epoch, mime = %init.mime, "Fragment cache ready");
        }

        inner.init = Some(init.clone());
        inner.state = CacheState::Ready;
        inner.last_segment_at = Some(now);

        self.ready.send_modify(|r| {
            r.init = Some(init.clone());
            r.fragments = 0;
        });
        let _ = self.tx.send(CacheEvent::Initialized(init));
    }

    fn on_fragment(&self, inner: &mut CacheInner, data: Bytes, now: Instant) {
        if inner.state != CacheState::Ready {
            tracing::debug!(
                epoch = inner.epoch,
                bytes = data.len(),
                "Dropping fragment before initialization"
            );
            return;
        }

        let duration = inner
            .last_segment_at
            .map(|prev| now.saturating_duration_since(prev))
            .unwrap_or(Duration::ZERO);

        let fragment = MediaFragment {
            sequence: inner.next_sequence,
            data,
            timestamp: now,
            duration,
            epoch: inner.epoch,
        };
        inner.next_sequence += 1;
        inner.last_segment_at = Some(now);

        // Append before anything is evicted; eviction only removes history.
        if let Some(evicted) = inner.window.push(fragment.clone()) {
            tracing::trace!(sequence = evicted.sequence, "Fragment evicted");
        }
        inner.playlist = playlist::render(&self.config.hls_base, &inner.window);

        self.ready.send_modify(|r| r.fragments += 1);
        let receivers = self.tx.send(CacheEvent::Fragment(fragment.clone())).unwrap_or(0);

        tracing::trace!(
            epoch = inner.epoch,
            sequence = fragment.sequence,
            bytes = fragment.size(),
            receivers = receivers,
            "Fragment published"
        );
    }

    /// Current session epoch
    pub async fn epoch(&self) -> u64 {
        self.inner.read().await.epoch
    }

    /// Current state
    pub async fn state(&self) -> CacheState {
        self.inner.read().await.state
    }

    /// Current playlist text, or `None` if no fragment is retained
    pub async fn current_playlist(&self) -> Option<String> {
        self.inner.read().await.playlist.clone()
    }

    /// Current initialization segment, or `None` while awaiting it
    pub async fn current_initialization(&self) -> Option<InitSegment> {
        self.inner.read().await.init.clone()
    }

    /// MIME descriptor of the current initialization segment
    pub async fn mime(&self) -> Option<String> {
        self.inner.read().await.init.as_ref().map(|i| i.mime.clone())
    }

    /// Most recently published fragment
    pub async fn latest_fragment(&self) -> Option<MediaFragment> {
        self.inner.read().await.window.latest().cloned()
    }

    /// Look up a retained fragment by sequence id
    ///
    /// `None` means the fragment was evicted or never existed.
    pub async fn fragment_by_id(&self, sequence: u64) -> Option<MediaFragment> {
        self.inner.read().await.window.get(sequence).cloned()
    }

    /// Sequence ids currently retained, oldest first
    pub async fn retained_sequences(&self) -> Vec<u64> {
        self.inner.read().await.window.sequences()
    }

    /// Subscribe to events published from now on
    ///
    /// No history is replayed; use [`catch_up`](Self::catch_up) for that.
    pub async fn subscribe(&self) -> FragmentSubscription {
        let _inner = self.inner.read().await;
        FragmentSubscription::new(self.tx.subscribe())
    }

    /// Snapshot the current state and subscribe in one step
    pub async fn catch_up(&self) -> (CatchUp, FragmentSubscription) {
        let inner = self.inner.read().await;

        let snapshot = CatchUp {
            epoch: inner.epoch,
            init: inner.init.clone(),
            playlist: inner.playlist.clone(),
            latest: inner.window.latest().cloned(),
        };
        let subscription = FragmentSubscription::new(self.tx.subscribe());

        tracing::debug!(
            epoch = snapshot.epoch,
            ready = snapshot.init.is_some(),
            latest = ?snapshot.latest.as_ref().map(|f| f.sequence),
            subscribers = self.tx.receiver_count(),
            "Subscriber added"
        );

        (snapshot, subscription)
    }

    /// Wait until the initialization segment of the current session exists
    ///
    /// Resolves immediately if it already does. Resolves to `None` if the
    /// session is reset (or stopped) first.
    pub async fn wait_initialized(&self) -> Option<InitSegment> {
        let mut rx = self.ready.subscribe();
        let epoch = rx.borrow().epoch;

        let ready = rx
            .wait_for(|r| r.epoch != epoch || r.init.is_some())
            .await
            .ok()?;
        if ready.epoch == epoch {
            ready.init.clone()
        } else {
            None
        }
    }

    /// Wait until the current session has produced at least one fragment and
    /// return the playlist
    ///
    /// Resolves to `None` if the session is reset (or stopped) first.
    pub async fn wait_playlist(&self) -> Option<String> {
        let mut rx = self.ready.subscribe();
        let epoch = rx.borrow().epoch;

        let same_epoch = rx
            .wait_for(|r| r.epoch != epoch || r.fragments > 0)
            .await
            .map(|r| r.epoch == epoch)
            .ok()?;
        if !same_epoch {
            return None;
        }

        let inner = self.inner.read().await;
        if inner.epoch == epoch {
            inner.playlist.clone()
        } else {
            None
        }
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStats {
        let inner = self.inner.read().await;
        CacheStats {
            epoch: inner.epoch,
            state: inner.state,
            fragment_count: inner.window.len(),
            window_size_bytes: inner.window.size(),
            fragments_total: inner.next_sequence - 1,
            subscriber_count: self.tx.receiver_count(),
        }
    }
}

impl Default for FragmentCache {
    fn default() -> Self {
        Self::new()
    }
}
