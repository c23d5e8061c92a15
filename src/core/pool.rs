//! # Pool reconciliation.
//!
//! A [`Pool`] keeps `size` workers of one named group alive.
//!
//! ## Slot accounting
//! A worker is *committed* when it alone occupies a slot: it is not disposed, not
//! replaced and has no pending successor. A worker and its pending successor
//! share one slot (the successor is counted). Every respawn path spawns only
//! while `committed < size`, so duplicate spawns from racing exits are
//! impossible.
//!
//! ## Rotation
//! ```text
//! strict:      restart(old) ─► disconnect(old) ─► old exits ─► respawn
//! non-strict:  restart(old) ─► spawn(new, predecessor = old)
//!                               new online ─► old.replaced, disconnect(old)
//!                               old exits  ─► no respawn
//! ```
//!
//! ## Exit handling
//! ```text
//! exit(w) ─► cancel timers ─► remove ─► unlink rotation partners
//!            ├─ disposed ─► size -= 1
//!            ├─ replaced ─► nothing
//!            └─ otherwise ─► RespawnBackoff::delay_for(age)
//!                              ├─ None      ─► replenish now
//!                              └─ Some(d)   ─► Input::Respawn after d
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::AbortHandle;

use crate::config::{POOL_ENV_KEY, PoolOptions, WORKER_ENV_KEY};
use crate::core::engine::{Ctx, Input};
use crate::core::timers::TimerKind;
use crate::core::worker::{Worker, next_worker_id};
use crate::events::{Event, EventKind};
use crate::policies::{RespawnBackoff, TtlJitter};
use crate::process::{LaunchRequest, ProcessEvent, TerminationReason};
use crate::protocol::{KillSignal, MasterMessage, PoolArgs, PoolStatus, WorkerId, WorkerMessage};

pub(crate) struct Pool {
    pub(crate) name: Arc<str>,
    opts: PoolOptions,
    /// Desired worker count; only disposal lowers it.
    size: usize,
    /// Workers ever spawned.
    total: u64,
    /// Live workers in spawn order.
    workers: Vec<Worker>,
    /// Respawns waiting for their backoff to elapse.
    pending: Vec<PendingRespawn>,
    next_ticket: u64,
    backoff: RespawnBackoff,
    /// Args payload sent to every worker (includes the pool binding).
    payload: PoolArgs,
}

impl Pool {
    pub(crate) fn new(name: Arc<str>, opts: PoolOptions) -> Self {
        let mut payload = opts.args.clone();
        payload.insert(POOL_ENV_KEY.to_string(), name.as_ref().into());
        Self {
            size: opts.size,
            backoff: RespawnBackoff::new(opts.restart_delay),
            name,
            opts,
            total: 0,
            workers: Vec::new(),
            pending: Vec::new(),
            next_ticket: 0,
            payload,
        }
    }

    fn event(&self, kind: EventKind) -> Event {
        Event::new(kind).with_pool(Arc::clone(&self.name))
    }

    pub(crate) fn contains(&self, id: WorkerId) -> bool {
        self.workers.iter().any(|w| w.id == id)
    }

    pub(crate) fn worker_mut(&mut self, id: WorkerId) -> Option<&mut Worker> {
        self.workers.iter_mut().find(|w| w.id == id)
    }

    pub(crate) fn live(&self) -> usize {
        self.workers.len()
    }

    fn committed(&self) -> usize {
        self.workers.iter().filter(|w| w.is_committed()).count()
    }

    pub(crate) fn ids(&self) -> Vec<WorkerId> {
        self.workers.iter().map(|w| w.id).collect()
    }

    /// Spawns the initial `size` workers.
    pub(crate) fn fill(&mut self, ctx: &Ctx) {
        ctx.bus.publish(
            self.event(EventKind::PoolCreated)
                .with_message(format!("pool created with {} worker(s)", self.size)),
        );
        for _ in 0..self.size {
            self.spawn(None, ctx);
        }
    }

    /// Launches one worker; on failure schedules a retry and returns `None`.
    fn spawn(&mut self, predecessor: Option<WorkerId>, ctx: &Ctx) -> Option<WorkerId> {
        let id = next_worker_id();
        let mut env = self.opts.env.clone();
        env.insert(POOL_ENV_KEY.to_string(), self.name.to_string());
        env.insert(WORKER_ENV_KEY.to_string(), id.to_string());

        let spawned = match ctx.launcher.launch(LaunchRequest {
            worker: id,
            pool: Arc::clone(&self.name),
            env,
        }) {
            Ok(spawned) => spawned,
            Err(e) => {
                let retry = self.backoff.spawn_retry();
                ctx.bus.publish(
                    self.event(EventKind::SpawnFailed)
                        .with_message(e.to_string())
                        .with_reason(e.as_label())
                        .with_delay(retry),
                );
                self.schedule_respawn(retry, predecessor, &ctx.tx);
                return None;
            }
        };

        self.total += 1;
        let mut worker = Worker::new(
            id,
            spawned.pid,
            Arc::clone(&self.name),
            spawned.link,
            predecessor,
        );
        if let Some(period) = self.opts.heartbeat_period() {
            worker
                .timers
                .arm_every(TimerKind::Heartbeat, id, period, &ctx.tx);
        }
        if let Some(ttl) = self.opts.ttl() {
            let lifetime = TtlJitter::new(ttl, self.opts.ttl_variance).sample();
            worker.timers.arm_once(TimerKind::Ttl, id, lifetime, &ctx.tx);
        }

        let tx = ctx.tx.clone();
        let mut events = spawned.events;
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let last = matches!(event, ProcessEvent::Exit(_));
                if tx.send(Input::Process { worker: id, event }).is_err() || last {
                    break;
                }
            }
        });

        ctx.bus
            .publish(worker.event(EventKind::WorkerSpawned).with_message("worker spawned"));
        self.workers.push(worker);
        Some(id)
    }

    fn schedule_respawn(
        &mut self,
        delay: Duration,
        predecessor: Option<WorkerId>,
        tx: &UnboundedSender<Input>,
    ) {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let tx = tx.clone();
        let pool = Arc::clone(&self.name);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Input::Respawn { pool, ticket });
        })
        .abort_handle();
        self.pending.push(PendingRespawn {
            ticket,
            predecessor,
            handle,
        });
    }

    /// A scheduled respawn came due. Cancelled tickets are ignored.
    pub(crate) fn on_respawn(&mut self, ticket: u64, ctx: &Ctx) {
        let Some(idx) = self.pending.iter().position(|p| p.ticket == ticket) else {
            return;
        };
        let due = self.pending.swap_remove(idx);
        self.replenish(due.predecessor, ctx);
    }

    /// Aborts every waiting respawn; returns how many were refilling an empty slot.
    fn cancel_respawns(&mut self) -> usize {
        let mut vacant = 0;
        for p in self.pending.drain(..) {
            p.handle.abort();
            // A resumed rotation shares its slot with a live predecessor.
            if p.predecessor.is_none() {
                vacant += 1;
            }
        }
        vacant
    }

    /// Fills one slot: resumes an interrupted rotation or spawns while short.
    fn replenish(&mut self, predecessor: Option<WorkerId>, ctx: &Ctx) {
        if let Some(pred) = predecessor {
            let resumable = self
                .workers
                .iter()
                .any(|w| w.id == pred && w.restarting && w.is_committed());
            if resumable {
                self.spawn_successor(pred, ctx);
                return;
            }
        }
        if self.committed() < self.size {
            self.spawn(None, ctx);
        }
    }

    fn spawn_successor(&mut self, pred: WorkerId, ctx: &Ctx) {
        if let Some(new) = self.spawn(Some(pred), ctx) {
            if let Some(old) = self.worker_mut(pred) {
                old.successor = Some(new);
            }
        }
    }

    /// Graceful rotation of one worker. Idempotent.
    pub(crate) fn restart(&mut self, id: WorkerId, ctx: &Ctx) {
        let strict = self.opts.strict;
        let kill_delay = self.opts.kill_delay;
        let Some(w) = self.worker_mut(id) else {
            return;
        };
        if w.restarting || w.exited {
            return;
        }
        w.restarting = true;
        ctx.bus
            .publish(w.event(EventKind::WorkerRestarting).with_message("restarting"));

        if strict {
            w.disconnect(kill_delay, ctx);
        } else {
            self.spawn_successor(id, ctx);
        }
    }

    /// Applies a kill request to one worker.
    pub(crate) fn kill(&mut self, id: WorkerId, signal: Option<KillSignal>, ctx: &Ctx) {
        let Some(w) = self.worker_mut(id) else {
            return;
        };
        if w.exited {
            return;
        }
        match signal {
            None => self.restart(id, ctx),
            Some(KillSignal::Dispose) => {
                w.disposed = true;
                w.force_kill(ctx);
                // A pending successor would only refill the slot being removed.
                if let Some(s) = w.successor.take().and_then(|succ| self.worker_mut(succ)) {
                    s.predecessor = None;
                    s.replaced = true;
                    s.force_kill(ctx);
                }
            }
            Some(sig) if sig.is_forced() => w.force_kill(ctx),
            Some(sig) => w.signal(sig.os_signal(), ctx),
        }
    }

    /// Applies a kill request to a snapshot of all current workers.
    ///
    /// Disposing the whole pool also drops the slots still waiting for a respawn.
    pub(crate) fn kill_all(&mut self, signal: Option<KillSignal>, ctx: &Ctx) {
        if signal == Some(KillSignal::Dispose) {
            let vacant = self.cancel_respawns();
            if vacant > 0 {
                self.size = self.size.saturating_sub(vacant);
                ctx.bus.publish(
                    self.event(EventKind::RespawnCancelled)
                        .with_message(format!("{vacant} pending respawn(s) cancelled")),
                );
            }
        }
        for id in self.ids() {
            self.kill(id, signal, ctx);
        }
    }

    /// The process showed its first sign of life. Completes a pending
    /// make-before-break rotation.
    pub(crate) fn on_online(&mut self, id: WorkerId, ctx: &Ctx) {
        let kill_delay = self.opts.kill_delay;
        let Some(w) = self.worker_mut(id) else {
            return;
        };
        ctx.bus
            .publish(w.event(EventKind::WorkerOnline).with_message("worker online"));
        let Some(pred) = w.predecessor.take() else {
            return;
        };
        let Some(old) = self.worker_mut(pred) else {
            return;
        };
        if old.successor == Some(id) {
            old.successor = None;
            old.replaced = true;
            ctx.bus.publish(
                old.event(EventKind::WorkerReplaced)
                    .with_message(format!("replaced by worker {id}")),
            );
            old.disconnect(kill_delay, ctx);
        }
    }

    /// Inbound line. Returns commands that need cluster-wide routing.
    pub(crate) fn on_message(
        &mut self,
        id: WorkerId,
        line: &str,
        ctx: &Ctx,
    ) -> Option<WorkerMessage> {
        let payload = &self.payload;
        let w = self.workers.iter_mut().find(|w| w.id == id)?;
        w.touch();

        match WorkerMessage::from_line(line) {
            Ok(WorkerMessage::Online) => {
                w.ready = true;
                w.send(
                    &MasterMessage::Args {
                        payload: payload.clone(),
                    },
                    ctx,
                );
                ctx.bus
                    .publish(w.event(EventKind::WorkerReady).with_message("worker ready"));
                None
            }
            Ok(WorkerMessage::Ping) => None,
            Ok(cmd) => {
                ctx.bus.publish(
                    w.event(EventKind::CommandReceived)
                        .with_message(format!("command '{}'", cmd.command()))
                        .with_reason(cmd.command()),
                );
                Some(cmd)
            }
            Err(e) => {
                ctx.bus.publish(
                    w.event(EventKind::UnknownMessage)
                        .with_message(format!("ignoring message: {e}"))
                        .with_reason(truncate(line, 256)),
                );
                None
            }
        }
    }

    /// Channel closed: the worker gets a grace period to exit.
    pub(crate) fn on_disconnect(&mut self, id: WorkerId, ctx: &Ctx) {
        let Some(w) = self.worker_mut(id) else {
            return;
        };
        ctx.bus
            .publish(w.event(EventKind::WorkerDisconnected).with_message("worker disconnected"));
        if !w.timers.is_armed(TimerKind::DisconnectGrace) {
            w.timers.arm_once(
                TimerKind::DisconnectGrace,
                id,
                ctx.disconnect_timeout,
                &ctx.tx,
            );
        }
    }

    pub(crate) fn on_exit(&mut self, id: WorkerId, reason: TerminationReason, ctx: &Ctx) {
        let Some(idx) = self.workers.iter().position(|w| w.id == id) else {
            return;
        };
        let mut w = self.workers.remove(idx);
        w.exited = true;
        w.timers.cancel_all();
        ctx.bus.publish(
            w.event(EventKind::WorkerExited)
                .with_message(format!("worker {reason}"))
                .with_reason(reason.to_string()),
        );

        // Old worker died before its successor came online: the successor owns the slot.
        if let Some(succ) = w.successor.take() {
            if let Some(s) = self.worker_mut(succ) {
                s.predecessor = None;
            }
            w.replaced = true;
        }

        // Replacement died before coming online: the rotation is resumed later.
        let mut resume = None;
        if let Some(pred) = w.predecessor.take() {
            if let Some(p) = self.worker_mut(pred).filter(|p| p.successor == Some(id)) {
                p.successor = None;
                resume = Some(pred);
            }
        }

        if w.disposed {
            self.size = self.size.saturating_sub(1);
            // The slot is gone, so the worker it was rotating away from goes too.
            if let Some(pred) = resume {
                let kill_delay = self.opts.kill_delay;
                if let Some(p) = self.worker_mut(pred) {
                    p.replaced = true;
                    p.disconnect(kill_delay, ctx);
                }
            }
            return;
        }
        if w.replaced {
            return;
        }

        match self.backoff.delay_for(w.age()) {
            Some(delay) => {
                ctx.bus.publish(
                    w.event(EventKind::RespawnScheduled)
                        .with_message(format!("worker died too quickly, respawning in {delay:?}"))
                        .with_delay(delay),
                );
                self.schedule_respawn(delay, resume, &ctx.tx);
            }
            None => self.replenish(resume, ctx),
        }
    }

    pub(crate) fn on_timer(&mut self, id: WorkerId, timer: TimerKind, ctx: &Ctx) {
        let heartbeat_timeout = self.opts.heartbeat_timeout;
        let Some(w) = self.worker_mut(id) else {
            return;
        };
        if w.exited {
            return;
        }
        match timer {
            TimerKind::Heartbeat => {
                if !w.timers.is_armed(TimerKind::Heartbeat) {
                    return;
                }
                if !w.is_connected() {
                    w.timers.cancel(TimerKind::Heartbeat);
                } else if w.silence() > heartbeat_timeout {
                    ctx.bus.publish(
                        w.event(EventKind::HeartbeatTimeout)
                            .with_message("exiting due to heartbeat timeout")
                            .with_delay(w.silence()),
                    );
                    w.force_kill(ctx);
                } else {
                    w.send(&MasterMessage::Ping, ctx);
                }
            }
            TimerKind::Ttl => {
                if w.restarting || !w.timers.is_armed(TimerKind::Ttl) {
                    return;
                }
                ctx.bus
                    .publish(w.event(EventKind::TtlExpired).with_message("ttl expired"));
                self.restart(id, ctx);
            }
            TimerKind::KillDelay => {
                ctx.bus.publish(
                    w.event(EventKind::ForceShutdown)
                        .with_message("kill delay elapsed, forcing shutdown"),
                );
                w.force_kill(ctx);
            }
            TimerKind::DisconnectGrace => {
                ctx.bus.publish(
                    w.event(EventKind::ForceShutdown)
                        .with_message("still running after disconnect, forcing shutdown"),
                );
                w.force_kill(ctx);
            }
        }
    }

    /// Force-kills every worker without respawning; used on teardown.
    pub(crate) fn abandon(&mut self, ctx: &Ctx) {
        self.cancel_respawns();
        for w in &mut self.workers {
            w.disposed = true;
            w.force_kill(ctx);
            w.timers.cancel_all();
        }
    }

    pub(crate) fn status(&self) -> PoolStatus {
        PoolStatus {
            count: self.workers.len(),
            size: self.size,
            total: self.total,
            ttl: millis(self.opts.ttl),
            kill_delay: millis(self.opts.kill_delay),
            restart_delay: millis(self.opts.restart_delay),
            workers: self.workers.iter().map(Worker::status).collect(),
        }
    }
}

/// A respawn sleeping out its backoff.
struct PendingRespawn {
    ticket: u64,
    /// Rotation to resume, if any.
    predecessor: Option<WorkerId>,
    handle: AbortHandle,
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn truncate(line: &str, max: usize) -> String {
    match line.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &line[..idx]),
        None => line.to_string(),
    }
}
