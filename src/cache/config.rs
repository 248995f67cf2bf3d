//! Fragment cache configuration

/// Fragment cache configuration options
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Base name for playlist entries (`<base><sequence>.m4s`, `init-<base>.mp4`)
    pub hls_base: String,

    /// Number of fragments retained for late joiners and the playlist
    pub window_size: usize,

    /// Per-subscriber queue length before the oldest events are dropped
    pub broadcast_capacity: usize,

    /// Largest MP4 box accepted before the stream is treated as corrupt
    pub max_box_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            hls_base: "test".to_string(),
            window_size: 4,
            broadcast_capacity: 64,
            max_box_size: 64 * 1024 * 1024, // 64MB
        }
    }
}

impl CacheConfig {
    /// Set the playlist base name
    pub fn hls_base(mut self, base: impl Into<String>) -> Self {
        self.hls_base = base.into();
        self
    }

    /// Set the number of retained fragments (at least 1)
    pub fn window_size(mut self, size: usize) -> Self {
        self.window_size = size.max(1);
        self
    }

    /// Set the per-subscriber queue length (at least 1)
    pub fn broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity.max(1);
        self
    }

    /// Set the maximum accepted box size
    pub fn max_box_size(mut self, size: usize) -> Self {
        self.max_box_size = size;
        self
    }
}
