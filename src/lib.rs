//! # poolvisor
//!
//! **Poolvisor** keeps named pools of long-running worker processes healthy.
//!
//! A coordinator process spawns a fixed number of workers per pool, detects hung
//! workers through heartbeats, rotates workers after a randomized TTL, absorbs
//! crash loops with an age-based backoff and lets any worker ask for cluster-,
//! pool- or worker-wide restarts through a small line-delimited JSON protocol.
//! Inside each worker an [`Agent`] speaks that protocol.
//!
//! ## Architecture
//! ```text
//!                 ┌──────────────────────────────────────────────┐
//!  Supervisor ───►│ coordinator loop (single owner of all state) │
//!  (handle)       │   pools: "web" [w1 w2 w3]  "jobs" [w4 w5]    │
//!                 └──────┬─────────────────────────────▲─────────┘
//!                        │ Launcher::launch            │ Input queue
//!                        ▼                             │ (process events, timers,
//!                ┌───────────────┐   stdin/stdout   ┌──┴───────────┐  respawns, requests)
//!                │ worker process│◄────────────────►│ forwarder    │
//!                │   Agent       │  JSON lines      │ (per worker) │
//!                └───────────────┘                  └──────────────┘
//!
//!  coordinator loop ── publish(Event) ──► Bus ──► SubscriberSet ──► LogWriter (tracing), ...
//! ```
//!
//! ### Worker lifecycle
//! ```text
//! spawned ─► online ─► running ─► restarting ─► disconnecting ─► exited
//!              │                      │
//!              │   (non-strict) spawn successor, wait for its online
//!              │   (strict)     disconnect now, respawn after exit
//!              └─ heartbeat: ping every timeout/4, SIGKILL after timeout of silence
//! ```
//!
//! ## Features
//! | Area              | Description                                           | Key types / traits                          |
//! |-------------------|-------------------------------------------------------|---------------------------------------------|
//! | **Supervision**   | Pools, rotation, respawn with backoff, routing        | [`Supervisor`], [`PoolOptions`]             |
//! | **Worker side**   | Pool args, handler registration, requests             | [`Agent`], [`Target`]                       |
//! | **Processes**     | Pluggable process launch                              | [`Launcher`], [`CommandLauncher`]           |
//! | **Protocol**      | Closed IPC vocabulary                                 | [`MasterMessage`], [`WorkerMessage`]        |
//! | **Events**        | Structured log events and sinks                       | [`Event`], [`Subscribe`], [`LogWriter`]     |
//! | **Policies**      | Respawn backoff, TTL jitter                           | [`RespawnBackoff`], [`TtlJitter`]           |
//! | **Errors**        | Typed runtime errors                                  | [`RuntimeError`]                            |
//!
//! ## Optional features
//! - `logging` (default): [`logging::init`] installs a `tracing-subscriber` writer on stderr.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use poolvisor::{Agent, LogWriter, PoolOptions, Subscribe, Supervisor, SupervisorConfig, POOL_ENV_KEY};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), poolvisor::RuntimeError> {
//!     if std::env::var(POOL_ENV_KEY).is_ok() {
//!         // Re-executed as a worker.
//!         let agent = Agent::stdio();
//!         agent.register("web", |_args| async { /* serve */ });
//!         agent.disconnected().await;
//!         return Ok(());
//!     }
//!
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
//!     let sup = Supervisor::builder(SupervisorConfig::default())
//!         .with_subscribers(subs)
//!         .build()?;
//!
//!     sup.pool("web", PoolOptions {
//!         ttl: Duration::from_secs(3600),
//!         ..PoolOptions::with_size(4)
//!     }).await?;
//!
//!     sup.serve_signals().await
//! }
//! ```

mod agent;
mod config;
mod core;
mod error;
mod events;
mod policies;
mod process;
mod protocol;
mod subscribers;

#[cfg(feature = "logging")]
pub mod logging;

// ---- Public re-exports ----

pub use agent::{Agent, Target};
pub use config::{POOL_ENV_KEY, PoolOptions, SupervisorConfig, WORKER_ENV_KEY};
pub use self::core::{Supervisor, SupervisorBuilder};
pub use error::RuntimeError;
pub use events::{Bus, Event, EventKind, Level};
pub use policies::{RespawnBackoff, TtlJitter};
pub use process::{
    CommandLauncher, LaunchRequest, Launcher, ProcessEvent, ProcessLink, Spawned,
    TerminationReason,
};
pub use protocol::{
    KillSignal, MasterMessage, PoolArgs, PoolRef, PoolStatus, StatusSnapshot, WorkerId,
    WorkerMessage, WorkerStatus,
};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};

/// Signal type used by [`KillSignal::Os`] and [`ProcessLink::kill`].
pub use nix::sys::signal::Signal;
