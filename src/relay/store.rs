//! Latest-frame relay implementation

use bytes::Bytes;
use tokio::sync::{broadcast, RwLock};

use super::config::RelayConfig;
use crate::cache::Subscription;
use crate::media::JpegSplitter;

/// Relay state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// No frame in the current session yet
    Empty,
    /// At least one frame received
    HasFrame,
}

struct RelayInner {
    epoch: u64,
    latest: Option<Bytes>,
    splitter: JpegSplitter,
    frames_total: u64,
}

/// Motion-JPEG relay: keeps only the latest frame and republishes each new one
pub struct FrameRelay {
    inner: RwLock<RelayInner>,
    tx: broadcast::Sender<Bytes>,
    config: RelayConfig,
}

impl FrameRelay {
    /// Create a new relay with default configuration
    pub fn new() -> Self {
        Self::with_config(RelayConfig::default())
    }

    /// Create a new relay with custom configuration
    pub fn with_config(config: RelayConfig) -> Self {
        let (tx, _) = broadcast::channel(config.broadcast_capacity);
        Self {
            inner: RwLock::new(RelayInner {
                epoch: 0,
                latest: None,
                splitter: JpegSplitter::new(config.max_frame_size),
                frames_total: 0,
            }),
            tx,
            config,
        }
    }

    /// Get the relay configuration
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Forget the current frame and start a new session
    ///
    /// Subscribers stay attached and simply see nothing until the new
    /// session produces a frame.
    pub async fn reset(&self) -> u64 {
        let mut inner = self.inner.write().await;
        inner.epoch += 1;
        inner.latest = None;
        inner.splitter.reset();
        inner.frames_total = 0;

        tracing::debug!(epoch = inner.epoch, "Frame relay reset");
        inner.epoch
    }

    /// Feed raw image-pipe output for session `epoch`
    ///
    /// The stream is split on JPEG markers, so reads need not align with
    /// frame boundaries.
    pub async fn ingest(&self, epoch: u64, data: &[u8]) {
        let mut inner = self.inner.write().await;
        if inner.epoch != epoch {
            return;
        }

        for frame in inner.splitter.push(data) {
            Self::publish(&mut inner, &self.tx, frame);
        }
    }

    /// Publish one complete frame for session `epoch`
    pub async fn push_frame(&self, epoch: u64, frame: Bytes) {
        let mut inner = self.inner.write().await;
        if inner.epoch != epoch {
            return;
        }
        Self::publish(&mut inner, &self.tx, frame);
    }

    fn publish(inner: &mut RelayInner, tx: &broadcast::Sender<Bytes>, frame: Bytes) {
        inner.latest = Some(frame.clone());
        inner.frames_total += 1;
        // Err only means nobody is listening
        let _ = tx.send(frame);
    }

    /// Current session epoch
    pub async fn epoch(&self) -> u64 {
        self.inner.read().await.epoch
    }

    /// Current state
    pub async fn state(&self) -> RelayState {
        if self.inner.read().await.latest.is_some() {
            RelayState::HasFrame
        } else {
            RelayState::Empty
        }
    }

    /// Latest frame, if any
    pub async fn current_frame(&self) -> Option<Bytes> {
        self.inner.read().await.latest.clone()
    }

    /// Frames published in this session
    pub async fn frames_total(&self) -> u64 {
        self.inner.read().await.frames_total
    }

    /// Subscribe to frames published from now on
    ///
    /// Also returns the current frame (if any) so the caller can show it
    /// straight away; it is not queued on the subscription.
    pub async fn subscribe(&self) -> (Option<Bytes>, Subscription<Bytes>) {
        let inner = self.inner.read().await;
        let current = inner.latest.clone();
        let subscription = Subscription::new(self.tx.subscribe());

        tracing::debug!(
            epoch = inner.epoch,
            subscribers = self.tx.receiver_count(),
            "Frame subscriber added"
        );

        (current, subscription)
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for FrameRelay {
    fn default() -> Self {
        Self::new()
    }
}
