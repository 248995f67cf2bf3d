//! Frame relay configuration

/// Frame relay configuration options
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Per-subscriber queue length before the oldest frames are dropped
    pub broadcast_capacity: usize,

    /// Largest JPEG accepted before a partial frame is discarded
    pub max_frame_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 16,
            max_frame_size: 8 * 1024 * 1024, // 8MB
        }
    }
}

impl RelayConfig {
    /// Set the per-subscriber queue length (at least 1)
    pub fn broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity.max(1);
        self
    }

    /// Set the maximum frame size
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }
}
