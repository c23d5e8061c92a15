//! # Runtime events emitted by the coordinator.
//!
//! Every log call of the supervisor is an [`Event`]: a classification
//! ([`EventKind`]), a severity ([`Level`]), a human-readable message and the
//! `worker`/`pool` fields stamped on as the event bubbles up from a worker
//! handle through its pool.
//!
//! A bare string converts into an informational [`EventKind::Log`] event, so
//! `bus.publish("pool warmed up".into())` is a valid log call.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore the exact order when events are delivered
//! out of order.
//!
//! ## Example
//! ```rust
//! use poolvisor::{Event, EventKind, Level, WorkerId};
//!
//! let ev = Event::new(EventKind::HeartbeatTimeout)
//!     .with_pool("web")
//!     .with_worker(WorkerId(3))
//!     .with_message("exiting due to heartbeat timeout");
//!
//! assert_eq!(ev.level, Level::Warn);
//! assert_eq!(ev.pool.as_deref(), Some("web"));
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::protocol::WorkerId;

/// Next `Event::seq`.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Severity of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        })
    }
}

/// What happened. Each kind documents which optional [`Event`] fields it sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Free-form log line.
    Log,

    // === Pool events ===
    /// Pool registered and initial fill started. Sets `pool`.
    PoolCreated,
    /// A respawn was delayed by crash-loop backoff. Sets `pool`, `worker` (the
    /// exited one), `delay_ms`.
    RespawnScheduled,
    /// Disposing the pool dropped respawns still waiting for their backoff.
    /// Sets `pool`.
    RespawnCancelled,
    /// Launching a worker process failed. Sets `pool`, `reason`, `delay_ms` (retry).
    SpawnFailed,

    // === Worker lifecycle ===
    /// Worker process launched. Sets `pool`, `worker`, `pid`.
    WorkerSpawned,
    /// Worker process signalled readiness (its first inbound line).
    WorkerOnline,
    /// Worker agent announced itself and received its pool arguments.
    WorkerReady,
    /// Worker channel closed.
    WorkerDisconnected,
    /// Worker process exited. Sets `reason` (termination reason).
    WorkerExited,
    /// Restart sequence started (TTL or remote request).
    WorkerRestarting,
    /// Make-before-break successor came online; the old worker drains.
    WorkerReplaced,
    /// TTL elapsed.
    TtlExpired,
    /// No inbound message within the heartbeat timeout.
    HeartbeatTimeout,
    /// A drain period ran out and the worker is killed.
    ForceShutdown,
    /// A signal was delivered to a worker. Sets `reason` (signal name).
    WorkerSignaled,

    // === Protocol / routing ===
    /// A worker command was routed. Sets `reason` (command).
    CommandReceived,
    /// A worker sent a line that is not part of the vocabulary.
    UnknownMessage,
    /// A command referenced an unregistered pool.
    UnknownPool,
    /// A command referenced a worker id that is not alive.
    UnknownWorker,
    /// Sending to a worker or signalling it failed.
    DeliveryFailed,

    // === Shutdown ===
    /// Hangup received; all pools restart gracefully.
    ReloadRequested,
    /// Terminate-style signal received; all pools are disposed.
    ShutdownRequested,
    /// Signal listeners could not be installed.
    SignalsUnavailable,
    /// All workers exited within the grace period.
    AllStoppedWithin,
    /// Grace period exceeded; some workers did not exit in time.
    GraceExceeded,

    // === Subscriber events ===
    /// Subscriber panicked during event processing. Sets `reason`.
    SubscriberPanicked,
    /// Subscriber dropped an event (queue full or worker closed). Sets `reason`.
    SubscriberOverflow,
}

impl EventKind {
    /// Severity used when none is set explicitly.
    pub fn default_level(self) -> Level {
        match self {
            EventKind::CommandReceived | EventKind::WorkerSignaled => Level::Debug,
            EventKind::HeartbeatTimeout
            | EventKind::ForceShutdown
            | EventKind::UnknownMessage
            | EventKind::UnknownWorker
            | EventKind::DeliveryFailed
            | EventKind::RespawnScheduled
            | EventKind::SignalsUnavailable
            | EventKind::SubscriberOverflow => Level::Warn,
            EventKind::SpawnFailed
            | EventKind::UnknownPool
            | EventKind::GraceExceeded
            | EventKind::SubscriberPanicked => Level::Error,
            _ => Level::Info,
        }
    }

    /// Stable snake_case label.
    pub fn as_label(self) -> &'static str {
        match self {
            EventKind::Log => "log",
            EventKind::PoolCreated => "pool_created",
            EventKind::RespawnScheduled => "respawn_scheduled",
            EventKind::RespawnCancelled => "respawn_cancelled",
            EventKind::SpawnFailed => "spawn_failed",
            EventKind::WorkerSpawned => "worker_spawned",
            EventKind::WorkerOnline => "worker_online",
            EventKind::WorkerReady => "worker_ready",
            EventKind::WorkerDisconnected => "worker_disconnected",
            EventKind::WorkerExited => "worker_exited",
            EventKind::WorkerRestarting => "worker_restarting",
            EventKind::WorkerReplaced => "worker_replaced",
            EventKind::TtlExpired => "ttl_expired",
            EventKind::HeartbeatTimeout => "heartbeat_timeout",
            EventKind::ForceShutdown => "force_shutdown",
            EventKind::WorkerSignaled => "worker_signaled",
            EventKind::CommandReceived => "command_received",
            EventKind::UnknownMessage => "unknown_message",
            EventKind::UnknownPool => "unknown_pool",
            EventKind::UnknownWorker => "unknown_worker",
            EventKind::DeliveryFailed => "delivery_failed",
            EventKind::ReloadRequested => "reload_requested",
            EventKind::ShutdownRequested => "shutdown_requested",
            EventKind::SignalsUnavailable => "signals_unavailable",
            EventKind::AllStoppedWithin => "all_stopped_within_grace",
            EventKind::GraceExceeded => "grace_exceeded",
            EventKind::SubscriberPanicked => "subscriber_panicked",
            EventKind::SubscriberOverflow => "subscriber_overflow",
        }
    }
}

/// One structured log record of the coordinator.
///
/// Sort by `seq`, not `at`: the sequence is process-wide and strictly increasing.
#[derive(Clone, Debug)]
pub struct Event {
    /// Process-wide publication order.
    pub seq: u64,
    /// Wall-clock time of creation.
    pub at: SystemTime,
    /// Severity.
    pub level: Level,
    pub kind: EventKind,
    /// Human-readable message.
    pub message: Arc<str>,
    /// Originating worker, if any.
    pub worker: Option<WorkerId>,
    /// Originating pool, if any.
    pub pool: Option<Arc<str>>,
    /// OS process id of the worker, if known.
    pub pid: Option<u32>,
    /// Scheduled delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Machine-oriented detail (exit reason, command, error label...).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp, next
    /// sequence number and the kind's default level.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            level: kind.default_level(),
            kind,
            message: Arc::from(kind.as_label()),
            worker: None,
            pool: None,
            pid: None,
            delay_ms: None,
            reason: None,
        }
    }

    /// Overrides the severity.
    #[inline]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Attaches a human-readable message.
    #[inline]
    pub fn with_message(mut self, message: impl Into<Arc<str>>) -> Self {
        self.message = message.into();
        self
    }

    /// Stamps the originating worker.
    #[inline]
    pub fn with_worker(mut self, worker: WorkerId) -> Self {
        self.worker = Some(worker);
        self
    }

    /// Stamps the originating pool.
    #[inline]
    pub fn with_pool(mut self, pool: impl Into<Arc<str>>) -> Self {
        self.pool = Some(pool.into());
        self
    }

    /// Attaches the worker's OS process id.
    #[inline]
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches a machine-oriented reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// A sink's queue rejected an event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_message(format!("subscriber '{subscriber}' dropped an event"))
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// A sink panicked while handling an event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_message(format!("subscriber '{subscriber}' panicked"))
            .with_reason(info)
    }
}

impl From<&str> for Event {
    fn from(message: &str) -> Self {
        Event::new(EventKind::Log).with_message(message)
    }
}

impl From<String> for Event {
    fn from(message: String) -> Self {
        Event::new(EventKind::Log).with_message(message)
    }
}
