//! # Crash-loop backoff for respawning workers.
//!
//! [`RespawnBackoff`] decides how long to wait before replacing a worker that
//! exited on its own. The rule is age-based rather than attempt-based: a worker
//! that lived at least `restart_delay` is replaced immediately, a younger one is
//! replaced once `restart_delay` has passed since it was spawned.
//!
//! A pool whose workers crash on startup therefore spawns at most one worker
//! per `restart_delay` per slot, and never gives up.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use poolvisor::RespawnBackoff;
//!
//! let backoff = RespawnBackoff::new(Duration::from_secs(5));
//!
//! // Died after 2s: wait the remaining 3s.
//! assert_eq!(backoff.delay_for(Duration::from_secs(2)), Some(Duration::from_secs(3)));
//!
//! // Lived long enough: respawn now.
//! assert_eq!(backoff.delay_for(Duration::from_secs(60)), None);
//! ```

use std::time::Duration;

/// Floor for retrying a failed launch.
const SPAWN_RETRY_FLOOR: Duration = Duration::from_secs(1);

/// Age-based respawn delay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RespawnBackoff {
    /// Minimum worker age below which a respawn is delayed.
    pub restart_delay: Duration,
}

impl RespawnBackoff {
    /// Creates a policy with the given restart delay.
    pub fn new(restart_delay: Duration) -> Self {
        Self { restart_delay }
    }

    /// Delay before replacing a worker that exited at `age`.
    ///
    /// Returns `None` when the replacement should be spawned immediately.
    pub fn delay_for(&self, age: Duration) -> Option<Duration> {
        self.restart_delay
            .checked_sub(age)
            .filter(|d| !d.is_zero())
    }

    /// Delay before retrying after the launcher itself failed.
    pub fn spawn_retry(&self) -> Duration {
        self.restart_delay.max(SPAWN_RETRY_FLOOR)
    }
}

impl Default for RespawnBackoff {
    /// One second, the pool default.
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}
