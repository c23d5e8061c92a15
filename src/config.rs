//! # Supervisor and pool configuration.
//!
//! Provides [`SupervisorConfig`] (process-wide settings of the coordinator) and
//! [`PoolOptions`] (per-pool sizing and lifecycle tuning).
//!
//! ## Sentinel values
//! - `heartbeat_timeout = 0s` → no heartbeat monitor
//! - `ttl = 0s` → no TTL rotation
//! - `restart_delay = 0s` → respawn crashed workers immediately
//!
//! Prefer the helper accessors ([`PoolOptions::heartbeat`], [`PoolOptions::ttl`])
//! over sprinkling sentinel checks across the codebase.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::protocol::PoolArgs;

/// Environment/argument key carrying the pool name into every worker.
pub const POOL_ENV_KEY: &str = "POOLVISOR_POOL";

/// Environment key carrying the worker id into every worker.
pub const WORKER_ENV_KEY: &str = "POOLVISOR_WORKER_ID";

/// Global configuration for the coordinator.
///
/// ## Field semantics
/// - `exec`: worker executable (`None` = re-run the current executable)
/// - `args`: extra command-line arguments for every worker
/// - `silent`: discard worker stderr instead of inheriting it
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
/// - `disconnect_timeout`: how long a worker may linger after its channel closed
/// - `grace`: how long a terminate-style shutdown waits for workers to exit
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// Worker executable path.
    pub exec: Option<PathBuf>,
    /// Extra arguments passed to every worker process.
    pub args: Vec<String>,
    /// Whether worker stderr is discarded.
    pub silent: bool,
    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,
    /// Force-kill delay armed when a worker's channel disconnects.
    pub disconnect_timeout: Duration,
    /// Maximum wait for disposed workers to exit on shutdown.
    pub grace: Duration,
}

impl SupervisorConfig {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for SupervisorConfig {
    /// Default configuration:
    ///
    /// - `exec = None` (current executable)
    /// - `args = []`, `silent = false`
    /// - `bus_capacity = 1024`
    /// - `disconnect_timeout = 10s`
    /// - `grace = 5s`
    fn default() -> Self {
        Self {
            exec: None,
            args: Vec::new(),
            silent: false,
            bus_capacity: 1024,
            disconnect_timeout: Duration::from_secs(10),
            grace: Duration::from_secs(5),
        }
    }
}

/// Sizing and lifecycle options of one pool.
#[derive(Clone, Debug)]
pub struct PoolOptions {
    /// Desired steady-state worker count.
    pub size: usize,
    /// Arguments delivered to each worker over IPC once it announces itself.
    pub args: PoolArgs,
    /// Extra environment variables set on each worker process.
    pub env: HashMap<String, String>,
    /// Tear down before spawning a replacement during rotation.
    ///
    /// `false` rotates make-before-break: the replacement must be online before
    /// the old worker is disconnected.
    pub strict: bool,
    /// Maximum silence tolerated from a worker before it is killed.
    ///
    /// The coordinator sends a `ping` every quarter of this period and only an
    /// inbound message resets the clock: a worker whose agent does not answer
    /// pings is killed even if the process is otherwise healthy.
    pub heartbeat_timeout: Duration,
    /// Base lifetime of a worker before it is rotated.
    pub ttl: Duration,
    /// Extra randomized lifetime, as a fraction of `ttl`.
    pub ttl_variance: f64,
    /// How long a disconnected worker may drain before it is killed.
    pub kill_delay: Duration,
    /// Minimum worker age below which a respawn is delayed.
    pub restart_delay: Duration,
}

impl PoolOptions {
    /// Options for a pool of `size` workers with default tuning.
    pub fn with_size(size: usize) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    /// Heartbeat timeout as an `Option` (`None` = monitor disabled).
    #[inline]
    pub fn heartbeat(&self) -> Option<Duration> {
        (!self.heartbeat_timeout.is_zero()).then_some(self.heartbeat_timeout)
    }

    /// Interval between heartbeat probes (a quarter of the timeout, at least 1ms).
    #[inline]
    pub fn heartbeat_period(&self) -> Option<Duration> {
        self.heartbeat()
            .map(|t| (t / 4).max(Duration::from_millis(1)))
    }

    /// Base TTL as an `Option` (`None` = no rotation).
    #[inline]
    pub fn ttl(&self) -> Option<Duration> {
        (!self.ttl.is_zero()).then_some(self.ttl)
    }
}

impl Default for PoolOptions {
    /// Default options:
    ///
    /// - `size = 0`, empty `args`/`env`, `strict = false`
    /// - `heartbeat_timeout = 10s`
    /// - `ttl = 0s` (no rotation), `ttl_variance = 0.25`
    /// - `kill_delay = 30s`
    /// - `restart_delay = 1s`
    fn default() -> Self {
        Self {
            size: 0,
            args: PoolArgs::new(),
            env: HashMap::new(),
            strict: false,
            heartbeat_timeout: Duration::from_secs(10),
            ttl: Duration::ZERO,
            ttl_variance: 0.25,
            kill_delay: Duration::from_secs(30),
            restart_delay: Duration::from_secs(1),
        }
    }
}
