//! Respawn and rotation timing policies.
//!
//! ## Contents
//! - [`RespawnBackoff`] how long to wait before replacing a worker that exited
//! - [`TtlJitter`] randomized worker lifetime for TTL rotation
//!
//! ## Quick wiring
//! ```text
//! PoolOptions { restart_delay, ttl, ttl_variance }
//!      └─► core::pool::Pool uses:
//!           - RespawnBackoff::delay_for(age) on every unplanned exit
//!           - RespawnBackoff::spawn_retry() when the launcher fails
//!           - TtlJitter::sample() when arming a worker's TTL timer
//! ```

mod backoff;
mod jitter;

pub use backoff::RespawnBackoff;
pub use jitter::TtlJitter;
