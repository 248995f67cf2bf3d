//! Media Source Extensions viewer
//!
//! One worker task per viewer owns a cache subscription taken at join time
//! and serves the viewer's commands in order. Anything requested before it
//! exists is remembered and sent when the matching cache event arrives.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::config::ViewerConfig;
use super::message::{JoinError, MseCommand, UnknownCommand, ViewerMessage};
use crate::cache::{CacheEvent, FragmentCache, FragmentSubscription, InitSegment, MediaFragment};
use crate::supervisor::SessionWatch;

static NEXT_VIEWER_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_viewer_id() -> u64 {
    NEXT_VIEWER_ID.fetch_add(1, Ordering::Relaxed)
}

/// Receiving side of a viewer's push channel
pub type ViewerOutbox = mpsc::Receiver<ViewerMessage>;

/// Handle to one connected MSE viewer
///
/// Dropping the handle disconnects the viewer.
pub struct MseViewer {
    id: u64,
    commands: mpsc::Sender<MseCommand>,
    task: Option<JoinHandle<()>>,
}

impl MseViewer {
    /// Connect a viewer to `cache`
    ///
    /// Refused when no session is running.
    pub async fn join(
        cache: Arc<FragmentCache>,
        session: &SessionWatch,
        config: &ViewerConfig,
    ) -> Result<(Self, ViewerOutbox), JoinError> {
        if !session.is_running() {
            return Err(JoinError::NoActiveSession);
        }

        let id = next_viewer_id();
        let (outbox_tx, outbox_rx) = mpsc::channel(config.outbox_capacity);
        let (commands, commands_rx) = mpsc::channel(config.command_capacity);

        let (snapshot, subscription) = cache.catch_up().await;
        let worker = Worker {
            id,
            cache,
            outbox: outbox_tx,
            epoch: snapshot.epoch,
            last_sequence: 0,
            media_epoch: None,
            sent_init: None,
            want_mime: false,
            want_init: false,
            streaming: false,
        };
        let task = tokio::spawn(worker.run(commands_rx, subscription, session.clone()));

        tracing::debug!(viewer = id, epoch = snapshot.epoch, "MSE viewer joined");
        Ok((
            Self {
                id,
                commands,
                task: Some(task),
            },
            outbox_rx,
        ))
    }

    /// Viewer id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Queue a command; returns `false` if the viewer is gone
    pub async fn command(&self, command: MseCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    /// Parse and queue a text command
    pub async fn handle_text(&self, text: &str) -> Result<bool, UnknownCommand> {
        let command = text.parse()?;
        Ok(self.command(command).await)
    }

    /// Whether the worker is still serving this viewer
    pub fn is_connected(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Disconnect the viewer; safe to call more than once
    pub fn disconnect(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!(viewer = self.id, "MSE viewer disconnected");
        }
    }
}

impl Drop for MseViewer {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Outbox receiver dropped
struct Gone;

struct Worker {
    id: u64,
    cache: Arc<FragmentCache>,
    outbox: mpsc::Sender<ViewerMessage>,
    /// Epoch of the last event or fragment seen
    epoch: u64,
    /// Last fragment sent in `epoch`
    last_sequence: u64,
    /// Epoch of the last initialization or segment delivered
    media_epoch: Option<u64>,
    /// Epoch and bytes of the last initialization delivered
    sent_init: Option<(u64, Bytes)>,
    want_mime: bool,
    want_init: bool,
    streaming: bool,
}

impl Worker {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<MseCommand>,
        mut subscription: FragmentSubscription,
        session: SessionWatch,
    ) {
        loop {
            let result = tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command).await,
                    None => break,
                },
                event = subscription.recv() => match event {
                    Some(event) => self.on_event(event).await,
                    None => break,
                },
                _ = session.stopped() => break,
            };
            if result.is_err() {
                break;
            }
        }

        tracing::debug!(
            viewer = self.id,
            dropped = subscription.dropped(),
            "MSE viewer worker finished"
        );
    }

    async fn send(&self, message: ViewerMessage) -> Result<(), Gone> {
        self.outbox.send(message).await.map_err(|_| Gone)
    }

    fn is_newer(&self, fragment: &MediaFragment) -> bool {
        fragment.epoch > self.epoch
            || (fragment.epoch == self.epoch && fragment.sequence > self.last_sequence)
    }

    /// Whether the viewer's source buffer was built from `init`
    fn holds(&self, init: &InitSegment) -> bool {
        self.sent_init
            .as_ref()
            .is_some_and(|(epoch, data)| *epoch == init.epoch && *data == init.data)
    }

    async fn send_fragment(&mut self, fragment: MediaFragment) -> Result<(), Gone> {
        if self.media_epoch.is_some() {
            // media from another session or codec set needs a new mime and
            // initialization first
            let init = match self.cache.current_initialization().await {
                Some(init) if init.epoch == fragment.epoch => init,
                _ => {
                    tracing::trace!(
                        viewer = self.id,
                        epoch = fragment.epoch,
                        "Skipping fragment of superseded session"
                    );
                    return Ok(());
                }
            };
            let crossed = self.media_epoch != Some(init.epoch);
            if crossed || (self.sent_init.is_some() && !self.holds(&init)) {
                self.rebuild(init).await?;
            }
        }

        if fragment.epoch != self.epoch {
            self.enter_epoch(fragment.epoch);
        }
        self.last_sequence = fragment.sequence;
        self.media_epoch = Some(fragment.epoch);
        self.send(ViewerMessage::Segment {
            sequence: fragment.sequence,
            data: fragment.data,
        })
        .await
    }

    async fn send_init(&mut self, init: InitSegment) -> Result<(), Gone> {
        if self.holds(&init) {
            return Ok(());
        }
        self.media_epoch = Some(init.epoch);
        self.sent_init = Some((init.epoch, init.data.clone()));
        self.send(ViewerMessage::Initialization(init.data)).await
    }

    /// Send `mime` then `initialization`, answering pending requests for both
    async fn rebuild(&mut self, init: InitSegment) -> Result<(), Gone> {
        self.want_mime = false;
        self.want_init = false;
        self.send(ViewerMessage::Mime(init.mime.clone())).await?;
        self.send_init(init).await
    }

    fn enter_epoch(&mut self, epoch: u64) {
        self.epoch = epoch;
        self.last_sequence = 0;
    }

    async fn on_command(&mut self, command: MseCommand) -> Result<(), Gone> {
        tracing::trace!(viewer = self.id, command = ?command, "Viewer command");

        match command {
            MseCommand::Mime => match self.cache.mime().await {
                Some(mime) => self.send(ViewerMessage::Mime(mime)).await?,
                None => self.want_mime = true,
            },
            MseCommand::Initialization => match self.cache.current_initialization().await {
                Some(init) => self.send_init(init).await?,
                None => self.want_init = true,
            },
            MseCommand::Segment => {
                if let Some(fragment) = self.cache.latest_fragment().await {
                    if self.is_newer(&fragment) {
                        self.send_fragment(fragment).await?;
                    }
                }
            }
            MseCommand::Segments => {
                self.streaming = true;
                if let Some(fragment) = self.cache.latest_fragment().await {
                    if self.is_newer(&fragment) {
                        self.send_fragment(fragment).await?;
                    }
                }
            }
            MseCommand::Stop => {
                self.streaming = false;
            }
        }
        Ok(())
    }

    async fn on_event(&mut self, event: CacheEvent) -> Result<(), Gone> {
        match event {
            CacheEvent::Reset { epoch } => {
                // a fragment of this epoch may already have been sent
                if epoch > self.epoch {
                    self.enter_epoch(epoch);
                }
            }
            CacheEvent::Initialized(init) => {
                if init.epoch > self.epoch {
                    self.enter_epoch(init.epoch);
                }
                if self.streaming && !self.holds(&init) {
                    // live stream restarted or codecs changed
                    self.rebuild(init).await?;
                } else {
                    if self.want_mime {
                        self.want_mime = false;
                        self.send(ViewerMessage::Mime(init.mime.clone())).await?;
                    }
                    if self.want_init {
                        self.want_init = false;
                        self.send_init(init).await?;
                    }
                }
            }
            CacheEvent::Fragment(fragment) => {
                if self.streaming && self.is_newer(&fragment) {
                    self.send_fragment(fragment).await?;
                }
            }
        }
        Ok(())
    }
}
