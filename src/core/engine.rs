//! # Coordinator loop.
//!
//! The engine is the single owner of all pools and worker handles. Everything
//! that can change pool state arrives as an [`Input`] on one unbounded queue and
//! is handled to completion before the next one is read:
//!
//! ```text
//! forwarder (per worker) ── Input::Process ──┐
//! timer tasks            ── Input::Timer   ──┤
//! respawn sleepers       ── Input::Respawn ──┼──► Engine::run() ──► pools
//! Supervisor handle      ── Input::Request ──┘         │
//!                                                       └──► Bus (events)
//! ```
//!
//! Because no input is ever processed concurrently with another, the check-and-set
//! of worker flags (`restarting`, `disposed`, ...) needs no locking, and a kill
//! can never race a respawn into a duplicate worker.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::config::PoolOptions;
use crate::core::pool::Pool;
use crate::core::timers::TimerKind;
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::process::{Launcher, ProcessEvent};
use crate::protocol::{
    KillSignal, MasterMessage, PoolRef, StatusSnapshot, WorkerId, WorkerMessage,
};

/// Everything the coordinator loop reacts to.
pub(crate) enum Input {
    /// Lifecycle event of a worker process.
    Process {
        worker: WorkerId,
        event: ProcessEvent,
    },
    /// A worker timer fired.
    Timer { worker: WorkerId, timer: TimerKind },
    /// A delayed respawn came due.
    Respawn { pool: Arc<str>, ticket: u64 },
    /// Call from the public handle.
    Request(Request),
}

/// Calls from [`Supervisor`](crate::Supervisor).
pub(crate) enum Request {
    Pool {
        name: String,
        opts: PoolOptions,
        reply: oneshot::Sender<()>,
    },
    Status {
        reply: oneshot::Sender<StatusSnapshot>,
    },
    KillCluster {
        signal: Option<KillSignal>,
        reply: oneshot::Sender<()>,
    },
    KillPool {
        name: String,
        signal: Option<KillSignal>,
        reply: oneshot::Sender<Result<(), RuntimeError>>,
    },
    KillWorker {
        id: WorkerId,
        signal: Option<KillSignal>,
        reply: oneshot::Sender<Result<(), RuntimeError>>,
    },
    /// Resolves once no worker is left in any pool.
    Drained { reply: oneshot::Sender<()> },
}

/// Shared plumbing handed to pools and workers.
pub(crate) struct Ctx {
    pub(crate) tx: mpsc::UnboundedSender<Input>,
    pub(crate) bus: Bus,
    pub(crate) launcher: Arc<dyn Launcher>,
    pub(crate) disconnect_timeout: Duration,
}

pub(crate) struct Engine {
    ctx: Ctx,
    rx: mpsc::UnboundedReceiver<Input>,
    token: CancellationToken,
    pools: BTreeMap<Arc<str>, Pool>,
    drain_waiters: Vec<oneshot::Sender<()>>,
}

impl Engine {
    pub(crate) fn new(
        ctx: Ctx,
        rx: mpsc::UnboundedReceiver<Input>,
        token: CancellationToken,
    ) -> Self {
        Self {
            ctx,
            rx,
            token,
            pools: BTreeMap::new(),
            drain_waiters: Vec::new(),
        }
    }

    /// Runs until the token is cancelled, then kills whatever is left.
    pub(crate) async fn run(mut self) {
        loop {
            let input = tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                input = self.rx.recv() => input,
            };
            let Some(input) = input else {
                break;
            };
            self.handle(input);
            self.notify_drained();
        }

        for pool in self.pools.values_mut() {
            pool.abandon(&self.ctx);
        }
    }

    fn handle(&mut self, input: Input) {
        match input {
            Input::Process { worker, event } => self.on_process(worker, event),
            Input::Timer { worker, timer } => {
                let ctx = &self.ctx;
                if let Some(pool) = self.pools.values_mut().find(|p| p.contains(worker)) {
                    pool.on_timer(worker, timer, ctx);
                }
            }
            Input::Respawn { pool, ticket } => {
                if let Some(pool) = self.pools.get_mut(&pool) {
                    pool.on_respawn(ticket, &self.ctx);
                }
            }
            Input::Request(req) => self.on_request(req),
        }
    }

    fn on_process(&mut self, worker: WorkerId, event: ProcessEvent) {
        let ctx = &self.ctx;
        let Some(pool) = self.pools.values_mut().find(|p| p.contains(worker)) else {
            return;
        };
        let origin = Arc::clone(&pool.name);
        match event {
            ProcessEvent::Online => pool.on_online(worker, ctx),
            ProcessEvent::Disconnect => pool.on_disconnect(worker, ctx),
            ProcessEvent::Exit(reason) => pool.on_exit(worker, reason, ctx),
            ProcessEvent::Message(line) => {
                if let Some(cmd) = pool.on_message(worker, &line, ctx) {
                    self.route(worker, &origin, cmd);
                }
            }
        }
    }

    /// Routes a command sent by `origin`, a worker of pool `origin_pool`.
    fn route(&mut self, origin: WorkerId, origin_pool: &Arc<str>, cmd: WorkerMessage) {
        match cmd {
            WorkerMessage::Kill { id, signal } => {
                let target = id.unwrap_or(origin);
                if self.kill_worker(target, signal).is_err() {
                    self.ctx.bus.publish(
                        Event::new(EventKind::UnknownWorker)
                            .with_pool(Arc::clone(origin_pool))
                            .with_worker(origin)
                            .with_message(format!("kill: no live worker {target}")),
                    );
                }
            }
            WorkerMessage::KillPool { pool, signal } => {
                let name = match pool {
                    PoolRef::Named(name) => name,
                    PoolRef::Own(true) => origin_pool.to_string(),
                    PoolRef::Own(false) => "false".to_string(),
                };
                if let Err(e) = self.kill_pool(&name, signal) {
                    self.ctx.bus.publish(
                        Event::new(EventKind::UnknownPool)
                            .with_pool(Arc::clone(origin_pool))
                            .with_worker(origin)
                            .with_message(format!("kill_pool: {e}"))
                            .with_reason(name),
                    );
                }
            }
            WorkerMessage::KillCluster { signal } => self.kill_cluster(signal),
            WorkerMessage::Status => {
                let status = MasterMessage::Status {
                    status: self.status(),
                };
                let ctx = &self.ctx;
                if let Some(w) = self
                    .pools
                    .get_mut(origin_pool)
                    .and_then(|p| p.worker_mut(origin))
                {
                    w.send(&status, ctx);
                }
            }
            // Answered inside the pool.
            WorkerMessage::Online | WorkerMessage::Ping => {}
        }
    }

    fn on_request(&mut self, req: Request) {
        match req {
            Request::Pool { name, opts, reply } => {
                if !self.pools.contains_key(name.as_str()) {
                    let name: Arc<str> = Arc::from(name);
                    let mut pool = Pool::new(Arc::clone(&name), opts);
                    pool.fill(&self.ctx);
                    self.pools.insert(name, pool);
                }
                let _ = reply.send(());
            }
            Request::Status { reply } => {
                let _ = reply.send(self.status());
            }
            Request::KillCluster { signal, reply } => {
                self.kill_cluster(signal);
                let _ = reply.send(());
            }
            Request::KillPool {
                name,
                signal,
                reply,
            } => {
                let res = self.kill_pool(&name, signal);
                if let Err(e) = &res {
                    self.ctx.bus.publish(
                        Event::new(EventKind::UnknownPool)
                            .with_message(e.to_string())
                            .with_reason(name),
                    );
                }
                let _ = reply.send(res);
            }
            Request::KillWorker { id, signal, reply } => {
                let _ = reply.send(self.kill_worker(id, signal));
            }
            Request::Drained { reply } => self.drain_waiters.push(reply),
        }
    }

    fn kill_cluster(&mut self, signal: Option<KillSignal>) {
        for pool in self.pools.values_mut() {
            pool.kill_all(signal, &self.ctx);
        }
    }

    fn kill_pool(&mut self, name: &str, signal: Option<KillSignal>) -> Result<(), RuntimeError> {
        let pool = self
            .pools
            .get_mut(name)
            .ok_or_else(|| RuntimeError::UnknownPool {
                name: name.to_string(),
            })?;
        pool.kill_all(signal, &self.ctx);
        Ok(())
    }

    fn kill_worker(&mut self, id: WorkerId, signal: Option<KillSignal>) -> Result<(), RuntimeError> {
        let ctx = &self.ctx;
        let pool = self
            .pools
            .values_mut()
            .find(|p| p.contains(id))
            .ok_or(RuntimeError::UnknownWorker { id })?;
        pool.kill(id, signal, ctx);
        Ok(())
    }

    fn live_workers(&self) -> usize {
        self.pools.values().map(Pool::live).sum()
    }

    fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            pid: std::process::id(),
            workers: self.live_workers(),
            pools: self
                .pools
                .iter()
                .map(|(name, pool)| (name.to_string(), pool.status()))
                .collect(),
        }
    }

    fn notify_drained(&mut self) {
        if self.drain_waiters.is_empty() || self.live_workers() > 0 {
            return;
        }
        for waiter in self.drain_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }
}
