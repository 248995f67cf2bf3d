//! Per-session bookkeeping

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Snapshot of the active (or last) transcode session
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Cache epoch of the current run
    pub epoch: u64,
    /// Argument list the process is launched with
    pub args: Vec<String>,
    /// Respawns so far
    pub restarts: u32,
    /// OS process id of the current run
    pub pid: Option<u32>,
    /// When the session was started
    pub started_at: Instant,
    /// Last time the process produced output
    pub last_activity: Instant,
    /// Whether the session is still being supervised
    pub running: bool,
}

/// Lock-free "last output" timestamp, touched by the reader tasks
#[derive(Debug)]
pub(crate) struct Activity {
    base: Instant,
    /// Milliseconds since `base`
    last_ms: AtomicU64,
}

impl Activity {
    pub(crate) fn new() -> Self {
        Self {
            base: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    pub(crate) fn touch(&self) {
        let ms = Instant::now().saturating_duration_since(self.base).as_millis() as u64;
        self.last_ms.fetch_max(ms, Ordering::Relaxed);
    }

    pub(crate) fn last(&self) -> Instant {
        self.base + Duration::from_millis(self.last_ms.load(Ordering::Relaxed))
    }

    pub(crate) fn base(&self) -> Instant {
        self.base
    }
}

/// State shared between the supervisor and its monitor task
#[derive(Debug)]
pub(crate) struct SessionShared {
    pub(crate) args: Vec<String>,
    pub(crate) activity: Activity,
    pub(crate) epoch: AtomicU64,
    pub(crate) restarts: AtomicU32,
    /// 0 = no process
    pub(crate) pid: AtomicU32,
    pub(crate) running: AtomicBool,
}

impl SessionShared {
    pub(crate) fn new(args: Vec<String>) -> Self {
        Self {
            args,
            activity: Activity::new(),
            epoch: AtomicU64::new(0),
            restarts: AtomicU32::new(0),
            pid: AtomicU32::new(0),
            running: AtomicBool::new(true),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn info(&self) -> SessionInfo {
        let pid = self.pid.load(Ordering::Relaxed);
        SessionInfo {
            epoch: self.epoch.load(Ordering::Relaxed),
            args: self.args.clone(),
            restarts: self.restarts.load(Ordering::Relaxed),
            pid: (pid != 0).then_some(pid),
            started_at: self.activity.base(),
            last_activity: self.activity.last(),
            running: self.is_running(),
        }
    }
}

/// Cheap, cloneable view of whether a session is being supervised
///
/// Handed to the HLS endpoint and viewer factories so they can refuse
/// requests while nothing is running without depending on the supervisor
/// type.
#[derive(Debug, Clone)]
pub struct SessionWatch {
    rx: watch::Receiver<bool>,
}

impl SessionWatch {
    pub(crate) fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// A watch that is permanently "running"; useful when the caches are
    /// fed by something other than a supervisor
    pub fn always_running() -> Self {
        let (tx, rx) = watch::channel(true);
        // keep the last value readable after the sender is gone
        drop(tx);
        Self { rx }
    }

    /// Whether a session is currently running
    pub fn is_running(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once no session is running
    pub async fn stopped(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|running| !*running).await.is_err() {
            // sender gone while running: it never stops
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_activity_touch() {
        let activity = Activity::new();
        let start = activity.last();

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(activity.last(), start);

        activity.touch();
        assert_eq!(activity.last(), start + Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_session_watch() {
        let (tx, rx) = watch::channel(true);
        let watch = SessionWatch::new(rx);
        assert!(watch.is_running());

        let stopped = {
            let watch = watch.clone();
            tokio::spawn(async move { watch.stopped().await })
        };
        tx.send_replace(false);
        stopped.await.unwrap();
        assert!(!watch.is_running());

        assert!(SessionWatch::always_running().is_running());
    }
}
