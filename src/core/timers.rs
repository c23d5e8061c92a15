//! Per-worker timer arena.
//!
//! Every timer is a small tokio task that feeds [`Input::Timer`] into the
//! coordinator queue; the arena keeps its [`AbortHandle`]. Re-arming a slot
//! aborts the previous task, and dropping the arena aborts everything, so a
//! removed worker can never be woken up again. A fire that was already queued
//! before the abort is filtered out by the coordinator.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::AbortHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::core::engine::Input;
use crate::protocol::WorkerId;

/// Kind of a worker timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TimerKind {
    /// Periodic heartbeat probe.
    Heartbeat,
    /// One-shot TTL rotation.
    Ttl,
    /// One-shot SIGKILL after a graceful disconnect.
    KillDelay,
    /// One-shot SIGKILL after the channel closed.
    DisconnectGrace,
}

#[derive(Debug, Default)]
pub(crate) struct Timers {
    heartbeat: Option<AbortHandle>,
    ttl: Option<AbortHandle>,
    kill_delay: Option<AbortHandle>,
    disconnect: Option<AbortHandle>,
}

impl Timers {
    fn slot(&mut self, kind: TimerKind) -> &mut Option<AbortHandle> {
        match kind {
            TimerKind::Heartbeat => &mut self.heartbeat,
            TimerKind::Ttl => &mut self.ttl,
            TimerKind::KillDelay => &mut self.kill_delay,
            TimerKind::DisconnectGrace => &mut self.disconnect,
        }
    }

    /// True while the slot holds a timer that was not cancelled.
    pub(crate) fn is_armed(&self, kind: TimerKind) -> bool {
        match kind {
            TimerKind::Heartbeat => self.heartbeat.is_some(),
            TimerKind::Ttl => self.ttl.is_some(),
            TimerKind::KillDelay => self.kill_delay.is_some(),
            TimerKind::DisconnectGrace => self.disconnect.is_some(),
        }
    }

    /// Fires `kind` once after `after`.
    pub(crate) fn arm_once(
        &mut self,
        kind: TimerKind,
        worker: WorkerId,
        after: Duration,
        tx: &UnboundedSender<Input>,
    ) {
        let tx = tx.clone();
        let task = tokio::spawn(async move {
            time::sleep(after).await;
            let _ = tx.send(Input::Timer {
                worker,
                timer: kind,
            });
        });
        self.replace(kind, task.abort_handle());
    }

    /// Fires `kind` every `period`, first after one full period.
    pub(crate) fn arm_every(
        &mut self,
        kind: TimerKind,
        worker: WorkerId,
        period: Duration,
        tx: &UnboundedSender<Input>,
    ) {
        let tx = tx.clone();
        let task = tokio::spawn(async move {
            let mut tick = time::interval_at(Instant::now() + period, period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                let fired = Input::Timer {
                    worker,
                    timer: kind,
                };
                if tx.send(fired).is_err() {
                    break;
                }
            }
        });
        self.replace(kind, task.abort_handle());
    }

    fn replace(&mut self, kind: TimerKind, handle: AbortHandle) {
        if let Some(old) = self.slot(kind).replace(handle) {
            old.abort();
        }
    }

    pub(crate) fn cancel(&mut self, kind: TimerKind) {
        if let Some(handle) = self.slot(kind).take() {
            handle.abort();
        }
    }

    pub(crate) fn cancel_all(&mut self) {
        for kind in [
            TimerKind::Heartbeat,
            TimerKind::Ttl,
            TimerKind::KillDelay,
            TimerKind::DisconnectGrace,
        ] {
            self.cancel(kind);
        }
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
