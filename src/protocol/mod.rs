//! IPC protocol between the coordinator and its workers.
//!
//! Messages are JSON objects carrying a `command` discriminator, one per line.
//!
//! ## Contents
//! - [`MasterMessage`] coordinator → worker (`args`, `ping`, `disconnect`, `status`)
//! - [`WorkerMessage`] worker → coordinator (`online`, `ping`, `kill`, `kill_pool`,
//!   `kill_cluster`, `status`)
//! - [`KillSignal`] wire form of a kill request's signal
//! - [`StatusSnapshot`] reply payload of `status`

mod message;
mod signal;
mod status;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use message::{MasterMessage, PoolRef, WorkerMessage};
pub use signal::KillSignal;
pub use status::{PoolStatus, StatusSnapshot, WorkerStatus};

/// Arguments delivered to every worker of a pool.
pub type PoolArgs = serde_json::Map<String, serde_json::Value>;

/// Coordinator-assigned identity of one worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for WorkerId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(WorkerId)
    }
}
