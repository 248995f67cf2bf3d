//! Live subscription handle
//!
//! Each subscriber owns a `broadcast::Receiver`, i.e. its own bounded slot in
//! the ring. A subscriber that falls behind loses its oldest events and is
//! told how many; the producer never waits for it.

use tokio::sync::broadcast;

use super::fragment::CacheEvent;

/// Receiving side of a live subscription
///
/// Dropping the handle unsubscribes.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: broadcast::Receiver<T>,
    /// Events lost because this subscriber lagged
    dropped: u64,
}

/// Live subscription to a [`FragmentCache`](super::FragmentCache)
pub type FragmentSubscription = Subscription<CacheEvent>;

impl<T: Clone> Subscription<T> {
    pub(crate) fn new(rx: broadcast::Receiver<T>) -> Self {
        Self { rx, dropped: 0 }
    }

    /// Wait for the next event
    ///
    /// Returns `None` once the publishing side is gone.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.dropped += n;
                    tracing::warn!(skipped = n, "Subscriber lagging, dropped oldest events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next event if one is queued, without waiting
    pub fn try_recv(&mut self) -> Option<T> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    self.dropped += n;
                    tracing::warn!(skipped = n, "Subscriber lagging, dropped oldest events");
                }
                Err(_) => return None,
            }
        }
    }

    /// Number of events this subscriber has lost to lag
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
