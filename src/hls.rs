//! Request-style HLS access
//!
//! Maps the pull requests of an HLS player onto the fragment cache:
//!
//! | request                | answer                                        |
//! |------------------------|-----------------------------------------------|
//! | `<base>.m3u8`          | playlist, waits for the first fragment        |
//! | `<base>.m3u8.txt`      | playlist as text/plain, 503 if not ready yet  |
//! | `init-<base>.mp4`      | initialization segment, waits until ready     |
//! | `<base><id>.m4s`       | fragment, 404 when outside the window         |
//!
//! Everything answers 503 while no session runs. The HTTP server itself is
//! left to the caller.

use std::sync::Arc;

use bytes::Bytes;

use crate::cache::{playlist, FragmentCache};
use crate::supervisor::SessionWatch;

/// Content type of the playlist
pub const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
/// Content type of the playlist text view
pub const TEXT_CONTENT_TYPE: &str = "text/plain";
/// Content type of initialization and media segments
pub const MP4_CONTENT_TYPE: &str = "video/mp4";

/// Successful response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HlsResponse {
    /// Value for the `Content-Type` header
    pub content_type: &'static str,
    /// Response body
    pub body: Bytes,
}

impl HlsResponse {
    fn new(content_type: &'static str, body: impl Into<Bytes>) -> Self {
        Self {
            content_type,
            body: body.into(),
        }
    }
}

/// Failed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HlsError {
    /// Unknown name, or a fragment no longer (or never) in the window
    NotFound,
    /// No session running, or it was reset while the request waited
    Unavailable,
}

impl HlsError {
    /// Matching HTTP status code
    pub fn status(&self) -> u16 {
        match self {
            HlsError::NotFound => 404,
            HlsError::Unavailable => 503,
        }
    }
}

impl std::fmt::Display for HlsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HlsError::NotFound => write!(f, "Not found"),
            HlsError::Unavailable => write!(f, "Service unavailable"),
        }
    }
}

impl std::error::Error for HlsError {}

/// HLS request handler over a fragment cache
#[derive(Clone)]
pub struct HlsEndpoint {
    cache: Arc<FragmentCache>,
    session: SessionWatch,
}

impl HlsEndpoint {
    /// Serve `cache` while `session` is running
    pub fn new(cache: Arc<FragmentCache>, session: SessionWatch) -> Self {
        Self { cache, session }
    }

    /// Name prefix of playlist and segments
    pub fn base(&self) -> &str {
        &self.cache.config().hls_base
    }

    fn ensure_running(&self) -> Result<(), HlsError> {
        if self.session.is_running() {
            Ok(())
        } else {
            Err(HlsError::Unavailable)
        }
    }

    /// Route a request by file name
    pub async fn get(&self, name: &str) -> Result<HlsResponse, HlsError> {
        let name = name.trim_start_matches('/');
        let base = self.base();

        if name == format!("{}.m3u8", base) {
            self.playlist().await
        } else if name == format!("{}.m3u8.txt", base) {
            self.playlist_text().await
        } else if name == playlist::init_name(base) {
            self.initialization().await
        } else if name.ends_with(".m4s") && name.starts_with(base) {
            self.segment(name).await
        } else {
            Err(HlsError::NotFound)
        }
    }

    /// Playlist; waits until the session has produced a fragment
    pub async fn playlist(&self) -> Result<HlsResponse, HlsError> {
        self.ensure_running()?;

        let text = tokio::select! {
            text = self.cache.wait_playlist() => text,
            _ = self.session.stopped() => None,
        };
        text.map(|t| HlsResponse::new(PLAYLIST_CONTENT_TYPE, t))
            .ok_or(HlsError::Unavailable)
    }

    /// Playlist as plain text, without waiting
    pub async fn playlist_text(&self) -> Result<HlsResponse, HlsError> {
        self.ensure_running()?;

        self.cache
            .current_playlist()
            .await
            .map(|t| HlsResponse::new(TEXT_CONTENT_TYPE, t))
            .ok_or(HlsError::Unavailable)
    }

    /// Initialization segment; waits until the session is ready
    pub async fn initialization(&self) -> Result<HlsResponse, HlsError> {
        self.ensure_running()?;

        let init = tokio::select! {
            init = self.cache.wait_initialized() => init,
            _ = self.session.stopped() => None,
        };
        init.map(|i| HlsResponse::new(MP4_CONTENT_TYPE, i.data))
            .ok_or(HlsError::Unavailable)
    }

    /// One fragment by name (`<base><id>.m4s`) or bare id
    pub async fn segment(&self, name: &str) -> Result<HlsResponse, HlsError> {
        self.ensure_running()?;

        let sequence = playlist::parse_fragment_name(self.base(), name).ok_or(HlsError::NotFound)?;
        match self.cache.fragment_by_id(sequence).await {
            Some(fragment) => Ok(HlsResponse::new(MP4_CONTENT_TYPE, fragment.data)),
            None => {
                tracing::debug!(sequence = sequence, "Requested fragment not in window");
                Err(HlsError::NotFound)
            }
        }
    }
}
