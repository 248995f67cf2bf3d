//! Viewer configuration

/// Viewer configuration options
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    /// Messages queued per viewer before its worker waits
    pub outbox_capacity: usize,

    /// Commands queued per viewer
    pub command_capacity: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            outbox_capacity: 32,
            command_capacity: 16,
        }
    }
}

impl ViewerConfig {
    /// Set the outbox length (at least 1)
    pub fn outbox_capacity(mut self, capacity: usize) -> Self {
        self.outbox_capacity = capacity.max(1);
        self
    }

    /// Set the command queue length (at least 1)
    pub fn command_capacity(mut self, capacity: usize) -> Self {
        self.command_capacity = capacity.max(1);
        self
    }
}
