//! Coordinator-side handle of one worker process.
//!
//! The handle only holds state and performs single-worker actions (send, signal,
//! disconnect). Decisions that involve other workers, such as rotation and
//! respawn, live in [`Pool`](crate::core::pool::Pool).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use nix::sys::signal::Signal;
use tokio::time::Instant;

use crate::core::engine::Ctx;
use crate::core::timers::{TimerKind, Timers};
use crate::events::{Event, EventKind};
use crate::process::ProcessLink;
use crate::protocol::{MasterMessage, WorkerId, WorkerStatus};

/// Process-wide worker id sequence.
static NEXT_WORKER: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_worker_id() -> WorkerId {
    WorkerId(NEXT_WORKER.fetch_add(1, Ordering::Relaxed))
}

pub(crate) struct Worker {
    pub(crate) id: WorkerId,
    pub(crate) pid: u32,
    pool: Arc<str>,
    created: Instant,
    heartbeat: Instant,
    /// The agent announced itself and received its args.
    pub(crate) ready: bool,
    pub(crate) restarting: bool,
    pub(crate) replaced: bool,
    pub(crate) disposed: bool,
    pub(crate) exited: bool,
    /// Replacement spawned by a pending make-before-break rotation.
    pub(crate) successor: Option<WorkerId>,
    /// Worker this one is about to replace.
    pub(crate) predecessor: Option<WorkerId>,
    link: Box<dyn ProcessLink>,
    pub(crate) timers: Timers,
}

impl Worker {
    pub(crate) fn new(
        id: WorkerId,
        pid: u32,
        pool: Arc<str>,
        link: Box<dyn ProcessLink>,
        predecessor: Option<WorkerId>,
    ) -> Self {
        let now = Instant::now();
        Self {
            id,
            pid,
            pool,
            created: now,
            heartbeat: now,
            ready: false,
            restarting: false,
            replaced: false,
            disposed: false,
            exited: false,
            successor: None,
            predecessor,
            link,
            timers: Timers::default(),
        }
    }

    /// Event stamped with this worker's identity.
    pub(crate) fn event(&self, kind: EventKind) -> Event {
        Event::new(kind)
            .with_pool(Arc::clone(&self.pool))
            .with_worker(self.id)
            .with_pid(self.pid)
    }

    pub(crate) fn age(&self) -> Duration {
        self.created.elapsed()
    }

    pub(crate) fn silence(&self) -> Duration {
        self.heartbeat.elapsed()
    }

    /// Records inbound traffic.
    pub(crate) fn touch(&mut self) {
        self.heartbeat = Instant::now();
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    /// True while this worker occupies a slot of its pool on its own.
    pub(crate) fn is_committed(&self) -> bool {
        !self.disposed && !self.replaced && !self.exited && self.successor.is_none()
    }

    pub(crate) fn send(&mut self, msg: &MasterMessage, ctx: &Ctx) {
        if let Err(e) = self.link.send(msg) {
            ctx.bus.publish(
                self.event(EventKind::DeliveryFailed)
                    .with_message(format!("failed to send '{}': {e}", msg.command()))
                    .with_reason(e.as_label()),
            );
        }
    }

    /// Delivers `sig` unless the process is already gone.
    pub(crate) fn signal(&mut self, sig: Signal, ctx: &Ctx) {
        if self.exited {
            return;
        }
        match self.link.kill(sig) {
            Ok(()) => ctx.bus.publish(
                self.event(EventKind::WorkerSignaled)
                    .with_message(format!("sent {}", sig.as_str()))
                    .with_reason(sig.as_str()),
            ),
            Err(e) => ctx.bus.publish(
                self.event(EventKind::DeliveryFailed)
                    .with_message(e.to_string())
                    .with_reason(e.as_label()),
            ),
        }
    }

    /// SIGKILL; the heartbeat and TTL timers stop first.
    pub(crate) fn force_kill(&mut self, ctx: &Ctx) {
        self.timers.cancel(TimerKind::Heartbeat);
        self.timers.cancel(TimerKind::Ttl);
        self.signal(Signal::SIGKILL, ctx);
    }

    /// Sends `disconnect`, closes the channel and arms the kill delay.
    pub(crate) fn disconnect(&mut self, kill_delay: Duration, ctx: &Ctx) {
        if self.exited {
            return;
        }
        if self.link.is_connected() {
            self.send(&MasterMessage::Disconnect, ctx);
            self.link.disconnect();
        }
        if !self.timers.is_armed(TimerKind::KillDelay) {
            self.timers
                .arm_once(TimerKind::KillDelay, self.id, kill_delay, &ctx.tx);
        }
    }

    pub(crate) fn status(&self) -> WorkerStatus {
        WorkerStatus {
            id: self.id,
            pid: self.pid,
            age: self.age().as_secs(),
            heartbeat: self.silence().as_secs(),
            ready: self.ready,
            restarting: self.restarting,
            exited: self.exited,
        }
    }
}
