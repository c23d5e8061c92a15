//! IPC message vocabulary.
//!
//! Messages are JSON-serialized and newline-delimited. Both directions are closed
//! enums: a line that does not decode is rejected with a [`serde_json::Error`] and
//! the receiver logs and drops it.

use serde::{Deserialize, Serialize};

use super::{KillSignal, PoolArgs, StatusSnapshot, WorkerId};

/// Message from the coordinator to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum MasterMessage {
    /// Pool configuration, sent in reply to the agent's `online`.
    Args {
        /// Pool arguments (always includes the pool-name binding).
        payload: PoolArgs,
    },
    /// Heartbeat probe.
    Ping,
    /// Drain notice; the channel is closed right after.
    Disconnect,
    /// Reply to a `status` request.
    Status {
        /// Snapshot of the whole coordinator.
        status: StatusSnapshot,
    },
}

/// Pool selector of a `kill_pool` request.
///
/// `true` on the wire selects the requesting worker's own pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PoolRef {
    /// The requesting worker's own pool.
    Own(bool),
    /// A pool by name.
    Named(String),
}

/// Message from a worker to the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// The agent is ready and asks for its pool arguments.
    Online,
    /// Heartbeat acknowledgement.
    Ping,
    /// Kill one worker (the sender when `id` is absent).
    Kill {
        /// Target worker.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<WorkerId>,
        /// Signal to deliver (absent = graceful restart).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signal: Option<KillSignal>,
    },
    /// Kill every worker of a pool.
    KillPool {
        /// Target pool.
        pool: PoolRef,
        /// Signal to deliver (absent = graceful restart).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signal: Option<KillSignal>,
    },
    /// Kill every worker of every pool.
    KillCluster {
        /// Signal to deliver (absent = graceful restart).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signal: Option<KillSignal>,
    },
    /// Ask for a [`StatusSnapshot`].
    Status,
}

impl WorkerMessage {
    /// Command name as it appears on the wire.
    pub fn command(&self) -> &'static str {
        match self {
            WorkerMessage::Online => "online",
            WorkerMessage::Ping => "ping",
            WorkerMessage::Kill { .. } => "kill",
            WorkerMessage::KillPool { .. } => "kill_pool",
            WorkerMessage::KillCluster { .. } => "kill_cluster",
            WorkerMessage::Status => "status",
        }
    }

    /// Serialize to one JSON line (without the trailing newline).
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from one JSON line.
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}

impl MasterMessage {
    /// Command name as it appears on the wire.
    pub fn command(&self) -> &'static str {
        match self {
            MasterMessage::Args { .. } => "args",
            MasterMessage::Ping => "ping",
            MasterMessage::Disconnect => "disconnect",
            MasterMessage::Status { .. } => "status",
        }
    }

    /// Serialize to one JSON line (without the trailing newline).
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from one JSON line.
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}
