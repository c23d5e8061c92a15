//! Error types used by the poolvisor coordinator and worker agent.
//!
//! [`RuntimeError`] covers every failure surfaced by the public API: unknown
//! pools or workers, process launch failures, closed IPC channels and a
//! coordinator that is no longer running.
//!
//! Like the event labels, [`RuntimeError::as_label`] returns a short stable
//! string suitable for logs and metrics.

use std::time::Duration;

use thiserror::Error;

use crate::protocol::WorkerId;

/// # Errors produced by the supervisor runtime and the worker agent.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// A pool with this name was never registered.
    #[error("unknown pool '{name}'")]
    UnknownPool {
        /// Requested pool name.
        name: String,
    },

    /// No live worker carries this id.
    #[error("unknown worker {id}")]
    UnknownWorker {
        /// Requested worker id.
        id: WorkerId,
    },

    /// The worker executable could not be resolved.
    #[error("cannot resolve worker executable: {source}")]
    Exec {
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The OS refused to start a worker process.
    #[error("failed to spawn worker for pool '{pool}': {source}")]
    Spawn {
        /// Pool the worker was meant for.
        pool: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The IPC channel is already closed.
    #[error("ipc channel closed")]
    ChannelClosed,

    /// Delivering a signal to a worker process failed.
    #[error("failed to signal pid {pid}: {source}")]
    Signal {
        /// Target process id.
        pid: u32,
        /// Errno reported by `kill(2)`.
        #[source]
        source: nix::errno::Errno,
    },

    /// A message could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] serde_json::Error),

    /// The coordinator loop has stopped and no longer accepts requests.
    #[error("supervisor stopped")]
    Stopped,

    /// Workers did not exit within the shutdown grace period.
    #[error("shutdown grace {grace:?} exceeded; {remaining} worker(s) still running")]
    GraceExceeded {
        /// Configured grace period.
        grace: Duration,
        /// Workers still alive when the grace period ran out.
        remaining: usize,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use poolvisor::RuntimeError;
    ///
    /// let err = RuntimeError::UnknownPool { name: "web".into() };
    /// assert_eq!(err.as_label(), "unknown_pool");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::UnknownPool { .. } => "unknown_pool",
            RuntimeError::UnknownWorker { .. } => "unknown_worker",
            RuntimeError::Exec { .. } => "exec_unresolved",
            RuntimeError::Spawn { .. } => "spawn_failed",
            RuntimeError::ChannelClosed => "channel_closed",
            RuntimeError::Signal { .. } => "signal_failed",
            RuntimeError::Protocol(_) => "protocol_error",
            RuntimeError::Stopped => "supervisor_stopped",
            RuntimeError::GraceExceeded { .. } => "grace_exceeded",
        }
    }
}
