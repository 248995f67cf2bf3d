//! Motion-JPEG viewer

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::config::ViewerConfig;
use super::message::{JoinError, ViewerMessage};
use super::mse::{next_viewer_id, ViewerOutbox};
use crate::relay::FrameRelay;
use crate::supervisor::SessionWatch;

/// Handle to one connected JPEG viewer
///
/// The viewer gets the current frame (if any) on join and every frame
/// after that. Dropping the handle disconnects it.
pub struct JpegViewer {
    id: u64,
    task: Option<JoinHandle<()>>,
}

impl JpegViewer {
    /// Connect a viewer to `relay`
    pub async fn join(
        relay: Arc<FrameRelay>,
        session: &SessionWatch,
        config: &ViewerConfig,
    ) -> Result<(Self, ViewerOutbox), JoinError> {
        if !session.is_running() {
            return Err(JoinError::NoActiveSession);
        }

        let id = next_viewer_id();
        let (outbox, outbox_rx) = mpsc::channel(config.outbox_capacity);
        let (current, mut subscription) = relay.subscribe().await;
        let session = session.clone();

        let task = tokio::spawn(async move {
            if let Some(frame) = current {
                if outbox.send(ViewerMessage::Jpeg(frame)).await.is_err() {
                    return;
                }
            }

            loop {
                tokio::select! {
                    frame = subscription.recv() => {
                        let Some(frame) = frame else { break };
                        if outbox.send(ViewerMessage::Jpeg(frame)).await.is_err() {
                            break;
                        }
                    }
                    _ = session.stopped() => break,
                }
            }

            tracing::debug!(
                viewer = id,
                dropped = subscription.dropped(),
                "JPEG viewer worker finished"
            );
        });

        tracing::debug!(viewer = id, "JPEG viewer joined");
        Ok((
            Self {
                id,
                task: Some(task),
            },
            outbox_rx,
        ))
    }

    /// Viewer id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether frames are still being forwarded
    pub fn is_connected(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Disconnect the viewer; safe to call more than once
    pub fn disconnect(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!(viewer = self.id, "JPEG viewer disconnected");
        }
    }
}

impl Drop for JpegViewer {
    fn drop(&mut self) {
        self.disconnect();
    }
}
