//! # Process launch interface.
//!
//! The coordinator never touches OS processes directly. It asks a [`Launcher`]
//! for a new worker and receives a [`Spawned`] bundle:
//!
//! ```text
//! Launcher::launch(LaunchRequest) ──► Spawned { pid, link, events }
//!                                              │     │
//!                                              │     └─► ProcessEvent stream
//!                                              │         (Online, Message, Disconnect, Exit)
//!                                              └─► ProcessLink (send, disconnect, kill)
//! ```
//!
//! ## Event stream contract
//! - `Online` is emitted at most once, when the process first proves it is
//!   running the protocol (for [`CommandLauncher`](crate::process::CommandLauncher),
//!   its first inbound line). A process that never gets there never goes online.
//! - `Message` carries one raw inbound line; decoding happens in the coordinator.
//! - `Disconnect` is emitted once the channel is closed from either side.
//! - `Exit` is emitted exactly once and is the last event; the stream ends after it.

use std::collections::HashMap;
use std::sync::Arc;

use nix::sys::signal::Signal;
use tokio::sync::mpsc;

use crate::error::RuntimeError;
use crate::process::TerminationReason;
use crate::protocol::{MasterMessage, WorkerId};

/// Parameters of one worker launch.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    /// Id assigned by the coordinator.
    pub worker: WorkerId,
    /// Pool the worker belongs to.
    pub pool: Arc<str>,
    /// Complete environment overlay (pool env plus the pool and worker bindings).
    pub env: HashMap<String, String>,
}

/// Lifecycle notification from a worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// The process signalled readiness; precedes its first `Message`.
    Online,
    /// One inbound line.
    Message(String),
    /// The IPC channel closed.
    Disconnect,
    /// The process terminated.
    Exit(TerminationReason),
}

/// Coordinator-side control over one worker process.
pub trait ProcessLink: Send {
    /// Queues a message for the worker.
    fn send(&mut self, msg: &MasterMessage) -> Result<(), RuntimeError>;

    /// Closes the channel. Idempotent.
    fn disconnect(&mut self);

    /// True until the channel is closed from either side.
    fn is_connected(&self) -> bool;

    /// Delivers an OS signal to the process.
    fn kill(&mut self, signal: Signal) -> Result<(), RuntimeError>;
}

/// A freshly started worker process.
pub struct Spawned {
    /// OS process id.
    pub pid: u32,
    /// Control handle.
    pub link: Box<dyn ProcessLink>,
    /// Lifecycle events, ending with [`ProcessEvent::Exit`].
    pub events: mpsc::UnboundedReceiver<ProcessEvent>,
}

impl std::fmt::Debug for Spawned {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Spawned").field("pid", &self.pid).finish()
    }
}

/// Starts worker processes.
///
/// Called from the coordinator loop, so implementations must not block; spawn
/// background tasks for I/O instead.
pub trait Launcher: Send + Sync + 'static {
    /// Starts one worker.
    fn launch(&self, req: LaunchRequest) -> Result<Spawned, RuntimeError>;
}
