//! Output readers
//!
//! One task per transcoder output: read whatever is available, note the
//! activity for stall detection and hand the bytes to the cache or relay
//! tagged with the session epoch.

use std::future::Future;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

use super::process::LogSink;
use super::session::SessionShared;
use crate::cache::FragmentCache;
use crate::relay::FrameRelay;

/// Read buffer per output stream
pub(crate) const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Destination for one raw output stream
pub(crate) trait IngestSink: Send + Sync + 'static {
    /// Feed bytes produced by session `epoch`
    fn ingest_bytes(&self, epoch: u64, data: &[u8]) -> impl Future<Output = ()> + Send;
}

impl IngestSink for FragmentCache {
    async fn ingest_bytes(&self, epoch: u64, data: &[u8]) {
        self.ingest(epoch, data).await
    }
}

impl IngestSink for FrameRelay {
    async fn ingest_bytes(&self, epoch: u64, data: &[u8]) {
        self.ingest(epoch, data).await
    }
}

/// Copy `reader` into `sink` until EOF
pub(crate) async fn pump<R, S>(
    mut reader: R,
    sink: Arc<S>,
    epoch: u64,
    shared: Arc<SessionShared>,
    stream: &'static str,
) where
    R: AsyncRead + Unpin,
    S: IngestSink,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                total += n as u64;
                shared.activity.touch();
                sink.ingest_bytes(epoch, &buf[..n]).await;
            }
            Err(e) => {
                tracing::warn!(epoch = epoch, stream = stream, error = %e, "Transcoder output read failed");
                break;
            }
        }
    }

    tracing::debug!(epoch = epoch, stream = stream, bytes = total, "Transcoder output closed");
}

/// Forward log lines to `sink` until EOF
pub(crate) async fn pump_log<R>(reader: R, sink: LogSink)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).split(b'\n');
    loop {
        match lines.next_segment().await {
            Ok(Some(line)) => {
                let line = String::from_utf8_lossy(&line);
                let line = line.trim_end_matches('\r');
                if !line.is_empty() {
                    sink(line);
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "Transcoder log read failed");
                break;
            }
        }
    }
}
