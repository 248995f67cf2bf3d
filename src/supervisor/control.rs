//! Session control and the restart loop

use std::io;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;

use super::config::RestartPolicy;
use super::params::TranscodeParams;
use super::process::{tracing_log_sink, LogSink, ProcessHandle, Transcoder};
use super::pump::{pump, pump_log};
use super::session::{Activity, SessionInfo, SessionShared, SessionWatch};
use crate::cache::FragmentCache;
use crate::error::SupervisorError;
use crate::relay::FrameRelay;

struct ActiveSession {
    shared: Arc<SessionShared>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

/// Runs one transcode session at a time and keeps it alive
///
/// Every spawn (the first one and each respawn) resets the fragment cache
/// and the frame relay before any output of the new process is read, so
/// viewers never see two sessions interleaved.
pub struct Supervisor<T: Transcoder> {
    transcoder: Arc<T>,
    cache: Arc<FragmentCache>,
    relay: Arc<FrameRelay>,
    log_sink: LogSink,
    active: Mutex<Option<ActiveSession>>,
    running: Arc<watch::Sender<bool>>,
}

impl<T: Transcoder> Supervisor<T> {
    /// Create a supervisor feeding the given cache and relay
    pub fn new(transcoder: T, cache: Arc<FragmentCache>, relay: Arc<FrameRelay>) -> Self {
        let (running, _) = watch::channel(false);
        Self {
            transcoder: Arc::new(transcoder),
            cache,
            relay,
            log_sink: tracing_log_sink(),
            active: Mutex::new(None),
            running: Arc::new(running),
        }
    }

    /// Send transcoder log lines to `sink` instead of `tracing`
    pub fn with_log_sink(mut self, sink: LogSink) -> Self {
        self.log_sink = sink;
        self
    }

    /// Fragment cache fed by this supervisor
    pub fn cache(&self) -> &Arc<FragmentCache> {
        &self.cache
    }

    /// Frame relay fed by this supervisor
    pub fn relay(&self) -> &Arc<FrameRelay> {
        &self.relay
    }

    /// Watch handle for "is a session running"
    pub fn watch(&self) -> SessionWatch {
        SessionWatch::new(self.running.subscribe())
    }

    /// Whether a session is being supervised
    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    /// Start a session with a prepared argument list
    ///
    /// Fails if a session is already running (stop it first) or if the
    /// first spawn fails.
    pub async fn start(&self, args: Vec<String>, policy: RestartPolicy) -> Result<(), SupervisorError> {
        let mut active = self.active.lock().await;

        if let Some(current) = active.as_ref() {
            if current.shared.is_running() {
                return Err(SupervisorError::AlreadyRunning);
            }
        }
        // previous session gave up on its own; let its task finish
        if let Some(previous) = active.take() {
            let _ = previous.task.await;
        }

        let shared = Arc::new(SessionShared::new(args));
        let runner = Runner {
            transcoder: Arc::clone(&self.transcoder),
            cache: Arc::clone(&self.cache),
            relay: Arc::clone(&self.relay),
            log_sink: Arc::clone(&self.log_sink),
            shared: Arc::clone(&shared),
            policy,
            running: Arc::clone(&self.running),
        };

        let run = runner.launch().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to start transcoder");
            SupervisorError::Spawn(e)
        })?;

        self.running.send_replace(true);
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(runner.monitor(run, stop_rx));

        tracing::info!(
            epoch = shared.epoch.load(Ordering::Relaxed),
            pid = ?run_pid(&shared),
            "Transcode session started"
        );

        *active = Some(ActiveSession {
            shared,
            stop_tx: Some(stop_tx),
            task,
        });
        Ok(())
    }

    /// Build the argument list from `params` and start a session
    pub async fn start_params(&self, params: &TranscodeParams, policy: RestartPolicy) -> crate::error::Result<()> {
        let args = params.build()?;
        self.start(args, policy).await?;
        Ok(())
    }

    /// Stop the session, if any
    ///
    /// Kills the process, stops ingestion and resets the cache and relay.
    /// Does nothing when no session exists.
    pub async fn stop(&self) {
        let mut active = self.active.lock().await;
        let Some(mut session) = active.take() else {
            return;
        };

        if let Some(stop_tx) = session.stop_tx.take() {
            // Err: the monitor already finished on its own
            let _ = stop_tx.send(());
        }
        if let Err(e) = session.task.await {
            tracing::warn!(error = %e, "Session monitor task failed");
        }
    }

    /// Snapshot of the current (or last self-terminated) session
    pub async fn info(&self) -> Option<SessionInfo> {
        self.active.lock().await.as_ref().map(|s| s.shared.info())
    }
}

fn run_pid(shared: &SessionShared) -> Option<u32> {
    match shared.pid.load(Ordering::Relaxed) {
        0 => None,
        pid => Some(pid),
    }
}

/// One process run and its reader tasks
struct Run<P> {
    process: P,
    readers: Vec<JoinHandle<()>>,
}

impl<P> Run<P> {
    fn abort_readers(&mut self) {
        for reader in self.readers.drain(..) {
            reader.abort();
        }
    }

    /// Let the readers consume what the process wrote before it ended
    async fn drain(&mut self, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        for reader in self.readers.drain(..) {
            let abort = reader.abort_handle();
            if tokio::time::timeout_at(deadline, reader).await.is_err() {
                abort.abort();
            }
        }
    }
}

enum Outcome {
    Exited(io::Result<Option<i32>>),
    Stalled,
    Stopped,
}

/// Everything the monitor task needs, owned
struct Runner<T: Transcoder> {
    transcoder: Arc<T>,
    cache: Arc<FragmentCache>,
    relay: Arc<FrameRelay>,
    log_sink: LogSink,
    shared: Arc<SessionShared>,
    policy: RestartPolicy,
    running: Arc<watch::Sender<bool>>,
}

impl<T: Transcoder> Runner<T> {
    /// Reset downstream state, spawn the process and start its readers
    async fn launch(&self) -> io::Result<Run<T::Process>> {
        let epoch = self.cache.reset().await;
        let frames_epoch = self.relay.reset().await;
        self.shared.epoch.store(epoch, Ordering::Relaxed);

        let (process, outputs) = self.transcoder.spawn(&self.shared.args)?;
        self.shared.pid.store(process.id().unwrap_or(0), Ordering::Relaxed);
        self.shared.activity.touch();

        let mut readers = Vec::with_capacity(3);
        readers.push(tokio::spawn(pump(
            outputs.media,
            Arc::clone(&self.cache),
            epoch,
            Arc::clone(&self.shared),
            "media",
        )));
        readers.push(tokio::spawn(pump(
            outputs.frames,
            Arc::clone(&self.relay),
            frames_epoch,
            Arc::clone(&self.shared),
            "frames",
        )));
        if let Some(log) = outputs.log {
            readers.push(tokio::spawn(pump_log(log, Arc::clone(&self.log_sink))));
        }

        Ok(Run { process, readers })
    }

    async fn monitor(self, mut run: Run<T::Process>, mut stop_rx: oneshot::Receiver<()>) {
        loop {
            let outcome = tokio::select! {
                status = run.process.wait() => Outcome::Exited(status),
                _ = stalled(&self.shared.activity, self.policy.kill_after_stall) => Outcome::Stalled,
                // Err: the supervisor was dropped
                _ = &mut stop_rx => Outcome::Stopped,
            };

            match outcome {
                Outcome::Exited(Ok(code)) => {
                    tracing::info!(code = ?code, "Transcoder exited");
                }
                Outcome::Exited(Err(e)) => {
                    tracing::warn!(error = %e, "Failed to wait for transcoder");
                    self.terminate(&mut run).await;
                }
                Outcome::Stalled => {
                    tracing::warn!(
                        timeout = ?self.policy.kill_after_stall,
                        "Transcoder stalled, killing"
                    );
                    self.terminate(&mut run).await;
                }
                Outcome::Stopped => {
                    self.terminate(&mut run).await;
                    run.abort_readers();
                    self.finish().await;
                    return;
                }
            }
            run.drain(self.policy.drain_after_exit).await;
            self.shared.pid.store(0, Ordering::Relaxed);

            loop {
                if self.shared.restarts.load(Ordering::Relaxed) >= self.policy.respawn_limit {
                    tracing::error!(
                        limit = self.policy.respawn_limit,
                        "Transcoder respawn limit reached, giving up"
                    );
                    self.finish().await;
                    return;
                }

                tokio::select! {
                    _ = tokio::time::sleep(self.policy.spawn_after_exit) => {}
                    _ = &mut stop_rx => {
                        self.finish().await;
                        return;
                    }
                }

                let restarts = self.shared.restarts.fetch_add(1, Ordering::Relaxed) + 1;
                match self.launch().await {
                    Ok(next) => {
                        tracing::info!(
                            restarts = restarts,
                            epoch = self.shared.epoch.load(Ordering::Relaxed),
                            pid = ?run_pid(&self.shared),
                            "Transcoder respawned"
                        );
                        run = next;
                        break;
                    }
                    Err(e) => {
                        tracing::error!(restarts = restarts, error = %e, "Failed to respawn transcoder");
                    }
                }
            }
        }
    }

    async fn terminate(&self, run: &mut Run<T::Process>) {
        if let Err(e) = run.process.kill().await {
            tracing::warn!(error = %e, "Failed to kill transcoder");
        }
    }

    /// Leave the session stopped: clear downstream state and report it
    async fn finish(&self) {
        self.shared.pid.store(0, Ordering::Relaxed);
        self.cache.reset().await;
        self.relay.reset().await;

        self.shared.running.store(false, Ordering::Release);
        self.running.send_replace(false);

        tracing::info!(
            restarts = self.shared.restarts.load(Ordering::Relaxed),
            "Transcode session stopped"
        );
    }
}

/// Resolve once nothing has been produced for `timeout`
///
/// A zero timeout disables stall detection.
async fn stalled(activity: &Activity, timeout: Duration) {
    if timeout.is_zero() {
        std::future::pending::<()>().await;
    }
    loop {
        let deadline = activity.last() + timeout;
        if tokio::time::Instant::now() >= deadline {
            return;
        }
        tokio::time::sleep_until(deadline).await;
    }
}
