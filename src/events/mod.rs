//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to publish
//! structured log events emitted by the coordinator loop, pools, worker handles
//! and subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Level`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: the coordinator loop (pool and worker lifecycle, routed
//!   commands), the signal handler, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the listener spawned by `SupervisorBuilder::build` (fans out
//!   to `SubscriberSet`) and any receiver from `Supervisor::subscribe`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind, Level};
