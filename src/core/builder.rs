use std::sync::Arc;

use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio_util::sync::CancellationToken;

use super::engine::{Ctx, Engine};
use super::supervisor::Supervisor;
use crate::{
    config::SupervisorConfig,
    error::RuntimeError,
    events::Bus,
    process::{CommandLauncher, Launcher},
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for constructing a [`Supervisor`].
pub struct SupervisorBuilder {
    cfg: SupervisorConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    launcher: Option<Arc<dyn Launcher>>,
}

impl SupervisorBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: SupervisorConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            launcher: None,
        }
    }

    /// Sets event subscribers.
    ///
    /// Subscribers receive runtime events (worker lifecycle, routed commands,
    /// shutdown progress) through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Replaces the process launcher.
    ///
    /// Defaults to a [`CommandLauncher`] built from the config's `exec`, `args`
    /// and `silent`.
    pub fn with_launcher(mut self, launcher: Arc<dyn Launcher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Starts the coordinator loop and the subscriber listener.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<Supervisor, RuntimeError> {
        let launcher: Arc<dyn Launcher> = match self.launcher {
            Some(launcher) => launcher,
            None => Arc::new(CommandLauncher::from_config(&self.cfg)?),
        };
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let token = CancellationToken::new();

        let subs = SubscriberSet::new(self.subscribers, bus.clone());
        subscriber_listener(&bus, subs, token.clone());

        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = Ctx {
            tx: tx.clone(),
            bus: bus.clone(),
            launcher,
            disconnect_timeout: self.cfg.disconnect_timeout,
        };
        tokio::spawn(Engine::new(ctx, rx, token.clone()).run());

        Ok(Supervisor::new_internal(self.cfg, tx, bus, token))
    }
}

/// Forwards bus events to the subscriber set until the token is cancelled,
/// then delivers what is still buffered and waits for the subscribers.
fn subscriber_listener(bus: &Bus, subs: SubscriberSet, token: CancellationToken) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                msg = rx.recv() => match msg {
                    Ok(ev) => subs.emit(ev),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        }
        // Let the coordinator loop publish its teardown events first.
        tokio::task::yield_now().await;
        while let Ok(ev) = rx.try_recv() {
            subs.emit(ev);
        }
        subs.shutdown().await;
    });
}
