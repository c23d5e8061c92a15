//! Coordinator core: pools, worker handles and the loop that owns them.
//!
//! The only public API from this module is [`Supervisor`] and its
//! [`SupervisorBuilder`].
//!
//! Internal modules:
//! - [`engine`]: the coordinator loop; single owner of all pool state;
//! - [`pool`]: sizing, rotation, respawn with backoff;
//! - [`worker`]: coordinator-side handle of one worker process;
//! - [`timers`]: per-worker timer arena;
//! - [`shutdown`]: OS signal listeners;
//! - [`supervisor`]: public handle.

mod builder;
mod engine;
mod pool;
mod shutdown;
mod supervisor;
mod timers;
mod worker;

pub use builder::SupervisorBuilder;
pub use supervisor::Supervisor;
