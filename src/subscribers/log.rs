//! # Tracing sink for supervisor events.
//!
//! [`LogWriter`] turns each [`Event`] into one `tracing` record at the event's
//! level, with the worker, pool and pid attached as structured fields:
//!
//! ```text
//! WARN poolvisor: exiting due to heartbeat timeout kind="heartbeat_timeout" pool="web" worker=3 pid=4711
//! INFO poolvisor: worker exited kind="worker_exited" pool="web" worker=3 reason="exited with code 0"
//! ```
//!
//! Install a `tracing` subscriber (for example with [`crate::logging::init`]) to
//! see the output.

use async_trait::async_trait;

use crate::events::{Event, Level};
use crate::subscribers::Subscribe;

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogWriter;

impl LogWriter {
    /// Creates a new writer.
    pub fn new() -> Self {
        Self
    }
}

macro_rules! emit {
    ($lvl:ident, $e:expr) => {
        tracing::$lvl!(
            target: "poolvisor",
            kind = $e.kind.as_label(),
            pool = $e.pool.as_deref(),
            worker = $e.worker.map(|w| w.0),
            pid = $e.pid,
            delay_ms = $e.delay_ms,
            reason = $e.reason.as_deref(),
            "{}",
            $e.message
        )
    };
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        match e.level {
            Level::Debug => emit!(debug, e),
            Level::Info => emit!(info, e),
            Level::Warn => emit!(warn, e),
            Level::Error => emit!(error, e),
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
