//! # Supervisor: public handle of the coordinator.
//!
//! A [`Supervisor`] is a cheap, cloneable handle. The state itself lives in the
//! coordinator loop spawned by [`SupervisorBuilder::build`]; every method sends a
//! request into its queue and awaits the reply.
//!
//! ## High-level architecture
//! ```text
//! Supervisor::pool / status / kill* ── Request ──► coordinator loop ──► pools
//!                                                        │
//!                                                        ▼
//!                                                  Bus (events) ──► listener ──► SubscriberSet
//!                                                        └────────► Supervisor::subscribe()
//!
//! Signal path (serve_signals):
//!   SIGHUP               ─► publish ReloadRequested ─► kill(None)   (graceful rotation)
//!   SIGINT/TERM/QUIT     ─► publish ShutdownRequested
//!                           └─► stop(): kill(dispose) ─► wait drained (≤ grace)
//!                                  ├─ drained  ─► AllStoppedWithin
//!                                  └─ timeout  ─► GraceExceeded
//!                               └─► cancel runtime token
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use poolvisor::{LogWriter, PoolOptions, Subscribe, Supervisor, SupervisorConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), poolvisor::RuntimeError> {
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
//!     let sup = Supervisor::builder(SupervisorConfig::default())
//!         .with_subscribers(subs)
//!         .build()?;
//!
//!     sup.pool("web", PoolOptions::with_size(4)).await?;
//!     sup.pool("jobs", PoolOptions::with_size(2)).await?;
//!
//!     sup.serve_signals().await
//! }
//! ```

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::config::{PoolOptions, SupervisorConfig};
use crate::core::builder::SupervisorBuilder;
use crate::core::engine::{Input, Request};
use crate::core::shutdown::{ControlSignal, Signals};
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::protocol::{KillSignal, StatusSnapshot, WorkerId};

/// Handle to a running coordinator.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

struct Inner {
    cfg: SupervisorConfig,
    tx: mpsc::UnboundedSender<Input>,
    bus: Bus,
    token: CancellationToken,
}

impl Supervisor {
    /// Starts building a supervisor.
    pub fn builder(cfg: SupervisorConfig) -> SupervisorBuilder {
        SupervisorBuilder::new(cfg)
    }

    pub(crate) fn new_internal(
        cfg: SupervisorConfig,
        tx: mpsc::UnboundedSender<Input>,
        bus: Bus,
        token: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                cfg,
                tx,
                bus,
                token,
            }),
        }
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Request,
    ) -> Result<T, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.inner
            .tx
            .send(Input::Request(make(reply)))
            .map_err(|_| RuntimeError::Stopped)?;
        rx.await.map_err(|_| RuntimeError::Stopped)
    }

    /// Returns the pool `name`, creating and filling it on first use.
    ///
    /// Options of an existing pool are left unchanged.
    pub async fn pool(&self, name: impl Into<String>, opts: PoolOptions) -> Result<(), RuntimeError> {
        let name = name.into();
        self.call(|reply| Request::Pool { name, opts, reply }).await
    }

    /// Snapshot of every pool and worker.
    pub async fn status(&self) -> Result<StatusSnapshot, RuntimeError> {
        self.call(|reply| Request::Status { reply }).await
    }

    /// Kills every worker of every pool (`None` = graceful rotation).
    pub async fn kill(&self, signal: Option<KillSignal>) -> Result<(), RuntimeError> {
        self.call(|reply| Request::KillCluster { signal, reply })
            .await
    }

    /// Kills every worker of one pool.
    ///
    /// Fails with [`RuntimeError::UnknownPool`] for a name never registered.
    pub async fn kill_pool(
        &self,
        name: impl Into<String>,
        signal: Option<KillSignal>,
    ) -> Result<(), RuntimeError> {
        let name = name.into();
        self.call(|reply| Request::KillPool {
            name,
            signal,
            reply,
        })
        .await?
    }

    /// Kills one worker by id.
    pub async fn kill_worker(
        &self,
        id: WorkerId,
        signal: Option<KillSignal>,
    ) -> Result<(), RuntimeError> {
        self.call(|reply| Request::KillWorker { id, signal, reply })
            .await?
    }

    /// Publishes a log event; a bare string becomes an info-level log line.
    pub fn log(&self, ev: impl Into<Event>) {
        self.inner.bus.publish(ev.into());
    }

    /// Receiver of all subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Event>> {
        self.inner.bus.subscribe()
    }

    /// Disposes every pool and waits up to `grace` for the workers to exit,
    /// then stops the coordinator.
    pub async fn stop(&self) -> Result<(), RuntimeError> {
        let grace = self.inner.cfg.grace;
        let res = match self.dispose_and_drain().await {
            Ok(()) => {
                self.log(Event::new(EventKind::AllStoppedWithin).with_message("all workers exited"));
                Ok(())
            }
            Err(RuntimeError::Stopped) => Err(RuntimeError::Stopped),
            Err(_) => {
                let remaining = self.status().await.map(|s| s.workers).unwrap_or(0);
                self.log(
                    Event::new(EventKind::GraceExceeded)
                        .with_message(format!("{remaining} worker(s) still running"))
                        .with_delay(grace),
                );
                Err(RuntimeError::GraceExceeded { grace, remaining })
            }
        };
        self.shutdown();
        res
    }

    async fn dispose_and_drain(&self) -> Result<(), RuntimeError> {
        self.kill(Some(KillSignal::Dispose)).await?;
        let drained = self.call(|reply| Request::Drained { reply });
        match tokio::time::timeout(self.inner.cfg.grace, drained).await {
            Ok(res) => res,
            Err(_) => Err(RuntimeError::GraceExceeded {
                grace: self.inner.cfg.grace,
                remaining: 0,
            }),
        }
    }

    /// Stops the coordinator loop without waiting; remaining workers are killed.
    pub fn shutdown(&self) {
        self.inner.token.cancel();
    }

    /// Completes once the coordinator has been stopped.
    pub async fn closed(&self) {
        self.inner.token.cancelled().await;
    }

    /// Reacts to OS signals until the coordinator stops.
    ///
    /// `SIGHUP` gracefully restarts every pool; `SIGINT`, `SIGTERM` and `SIGQUIT`
    /// dispose every pool and stop. Returns `Ok` after a terminate-style signal even
    /// if the grace period ran out, so the process can exit with status 0. If the
    /// listeners cannot be installed this only waits for [`closed`](Self::closed).
    pub async fn serve_signals(&self) -> Result<(), RuntimeError> {
        let mut signals = match Signals::install() {
            Ok(signals) => signals,
            Err(e) => {
                self.log(
                    Event::new(EventKind::SignalsUnavailable)
                        .with_message(format!("cannot install signal handlers: {e}")),
                );
                self.closed().await;
                return Ok(());
            }
        };

        loop {
            let sig = tokio::select! {
                _ = self.closed() => return Ok(()),
                sig = signals.recv() => sig,
            };
            match sig {
                ControlSignal::Reload => {
                    self.log(
                        Event::new(EventKind::ReloadRequested)
                            .with_message("hangup received, restarting all pools"),
                    );
                    self.kill(None).await?;
                }
                ControlSignal::Terminate => {
                    self.log(
                        Event::new(EventKind::ShutdownRequested)
                            .with_message("termination requested, disposing all pools"),
                    );
                    return match self.stop().await {
                        Ok(()) | Err(RuntimeError::GraceExceeded { .. }) => Ok(()),
                        Err(e) => Err(e),
                    };
                }
            }
        }
    }
}
