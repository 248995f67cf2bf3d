//! Supervisor configuration

use std::time::Duration;

/// Liveness policy for a transcode session
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    /// Kill the process if it produces no output for this long (zero disables)
    pub kill_after_stall: Duration,

    /// Delay between an exit and the next spawn
    pub spawn_after_exit: Duration,

    /// Maximum number of respawns before the session is given up
    pub respawn_limit: u32,

    /// How long readers may keep draining output after the process ends
    pub drain_after_exit: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            kill_after_stall: Duration::from_secs(60),
            spawn_after_exit: Duration::from_secs(1),
            respawn_limit: 10_000,
            drain_after_exit: Duration::from_secs(2),
        }
    }
}

impl RestartPolicy {
    /// Set the stall timeout
    pub fn kill_after_stall(mut self, timeout: Duration) -> Self {
        self.kill_after_stall = timeout;
        self
    }

    /// Set the delay between exit and respawn
    pub fn spawn_after_exit(mut self, delay: Duration) -> Self {
        self.spawn_after_exit = delay;
        self
    }

    /// Set the maximum number of respawns (0 = never respawn)
    pub fn respawn_limit(mut self, limit: u32) -> Self {
        self.respawn_limit = limit;
        self
    }

    /// Set how long output is drained after an exit
    pub fn drain_after_exit(mut self, timeout: Duration) -> Self {
        self.drain_after_exit = timeout;
        self
    }
}
