//! Status snapshot returned by `Supervisor::status` and the `status` command.
//!
//! The field set is stable so external health-check pollers can rely on it.
//! Durations are milliseconds; `age` and `heartbeat` are whole seconds elapsed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::WorkerId;

/// Snapshot of the whole coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Coordinator process id.
    pub pid: u32,
    /// Live workers across all pools.
    pub workers: usize,
    /// Per-pool aggregates keyed by pool name.
    pub pools: BTreeMap<String, PoolStatus>,
}

/// Aggregates of one pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatus {
    /// Live workers.
    pub count: usize,
    /// Desired worker count.
    pub size: usize,
    /// Workers ever spawned.
    pub total: u64,
    /// Base TTL in ms (0 = off).
    pub ttl: u64,
    /// Kill delay in ms.
    pub kill_delay: u64,
    /// Restart delay in ms.
    pub restart_delay: u64,
    /// Live workers in spawn order.
    pub workers: Vec<WorkerStatus>,
}

/// State of one live worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub id: WorkerId,
    pub pid: u32,
    /// Seconds since spawn.
    pub age: u64,
    /// Seconds since the last inbound message.
    pub heartbeat: u64,
    /// The agent announced itself and was sent its args.
    #[serde(default)]
    pub ready: bool,
    pub restarting: bool,
    pub exited: bool,
}

impl StatusSnapshot {
    /// Live worker count of `pool`, or `None` for an unknown pool.
    pub fn count(&self, pool: &str) -> Option<usize> {
        self.pools.get(pool).map(|p| p.count)
    }
}
