//! # Worker-side agent.
//!
//! [`Agent`] runs inside every worker process and speaks the IPC protocol with
//! the coordinator over the process's stdin/stdout (or any pair of async pipes).
//!
//! ```text
//! Agent::new ──► send {"command":"online"}
//!                 │
//! coordinator ──► {"command":"args", payload}
//!                 └─► pool identity fixed, queued handlers for that pool spawned
//! coordinator ──► {"command":"ping"}        ─► reply ping
//! coordinator ──► {"command":"disconnect"}  ─► draining
//! coordinator ──► {"command":"status", ...} ─► oldest pending status() resolves
//! EOF                                       ─► draining
//! ```
//!
//! Requests to the coordinator (`kill`, `restart`, `dispose`) share one message
//! builder and address a [`Target`].
//!
//! Worker stdout carries the protocol, so a worker must log to stderr.
//!
//! ## Example
//! ```rust,no_run
//! use poolvisor::{Agent, PoolArgs};
//!
//! #[tokio::main]
//! async fn main() {
//!     let agent = Agent::stdio();
//!     agent.register("web", |args: PoolArgs| async move {
//!         eprintln!("serving with {args:?}");
//!     });
//!     agent.disconnected().await;
//! }
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use futures::{FutureExt, SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;

use crate::config::{POOL_ENV_KEY, WORKER_ENV_KEY};
use crate::error::RuntimeError;
use crate::protocol::{
    KillSignal, MasterMessage, PoolArgs, PoolRef, StatusSnapshot, WorkerId, WorkerMessage,
};

/// Addressee of a kill/restart/dispose request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Every worker of every pool.
    Cluster,
    /// Every worker of the named pool.
    Pool(String),
    /// Every worker of this worker's pool.
    OwnPool,
    /// One worker by id.
    Worker(WorkerId),
    /// This worker.
    Myself,
}

type Handler = Box<dyn FnOnce(PoolArgs) -> BoxFuture<'static, ()> + Send>;

struct Registration {
    pool: String,
    handler: Handler,
}

#[derive(Default)]
struct State {
    args: Option<PoolArgs>,
    pool: Option<String>,
    pending: Vec<Registration>,
    status_waiters: VecDeque<oneshot::Sender<StatusSnapshot>>,
    closed: bool,
}

struct Shared {
    out: mpsc::UnboundedSender<String>,
    state: Mutex<State>,
    draining: CancellationToken,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, msg: &WorkerMessage) -> Result<(), RuntimeError> {
        let line = msg.to_line()?;
        self.out.send(line).map_err(|_| RuntimeError::ChannelClosed)
    }
}

/// IPC client of one worker process. Cheap to clone.
#[derive(Clone)]
pub struct Agent {
    shared: Arc<Shared>,
}

impl Agent {
    /// Agent over the process's stdin (inbound) and stdout (outbound).
    ///
    /// Must be called from within a tokio runtime.
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }

    /// Agent over arbitrary pipes. Announces `online` immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (out, out_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            out,
            state: Mutex::new(State::default()),
            draining: CancellationToken::new(),
        });

        if let Err(e) = shared.send(&WorkerMessage::Online) {
            tracing::warn!(error = %e, "failed to announce online");
        }
        tokio::spawn(write_lines(writer, out_rx));
        tokio::spawn(read_lines(reader, Arc::clone(&shared)));

        Self { shared }
    }

    /// Runs `handler` once with the pool args if this worker belongs to `pool`.
    ///
    /// Before args arrive the registration is queued; after that it runs right
    /// away for the matching pool and never for any other.
    pub fn register<F, Fut>(&self, pool: impl Into<String>, handler: F)
    where
        F: FnOnce(PoolArgs) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let pool = pool.into();
        let mut st = self.shared.state();
        // Once args arrived the binding is final, even when no pool was resolved.
        let ready = st
            .args
            .as_ref()
            .map(|args| (st.pool.as_deref() == Some(pool.as_str())).then(|| args.clone()));
        match ready {
            Some(Some(args)) => {
                drop(st);
                tokio::spawn(handler(args));
            }
            Some(None) => {
                tracing::debug!(pool = %pool, "handler registered for another pool; ignored");
            }
            None => st.pending.push(Registration {
                pool,
                handler: Box::new(move |args| handler(args).boxed()),
            }),
        }
    }

    /// Pool args, once received.
    pub fn args(&self) -> Option<PoolArgs> {
        self.shared.state().args.clone()
    }

    /// Pool this worker belongs to: from the args, else from the environment.
    pub fn pool(&self) -> Option<String> {
        self.shared
            .state()
            .pool
            .clone()
            .or_else(|| std::env::var(POOL_ENV_KEY).ok())
    }

    /// Coordinator-assigned id, read from the environment.
    pub fn worker_id(&self) -> Option<WorkerId> {
        std::env::var(WORKER_ENV_KEY).ok()?.parse().ok()
    }

    /// True once the coordinator asked this worker to drain or the channel closed.
    pub fn is_draining(&self) -> bool {
        self.shared.draining.is_cancelled()
    }

    /// Completes when the worker should drain.
    pub async fn disconnected(&self) {
        self.shared.draining.cancelled().await;
    }

    /// Asks the coordinator to kill `target` (`None` = graceful restart).
    pub fn kill(&self, target: Target, signal: Option<KillSignal>) -> Result<(), RuntimeError> {
        let msg = match target {
            Target::Cluster => WorkerMessage::KillCluster { signal },
            Target::Pool(name) => WorkerMessage::KillPool {
                pool: PoolRef::Named(name),
                signal,
            },
            Target::OwnPool => WorkerMessage::KillPool {
                pool: self.pool().map_or(PoolRef::Own(true), PoolRef::Named),
                signal,
            },
            Target::Worker(id) => WorkerMessage::Kill {
                id: Some(id),
                signal,
            },
            Target::Myself => WorkerMessage::Kill { id: None, signal },
        };
        self.shared.send(&msg)
    }

    /// Graceful restart of `target`.
    pub fn restart(&self, target: Target) -> Result<(), RuntimeError> {
        self.kill(target, None)
    }

    /// Permanent removal of `target`; the pool shrinks.
    pub fn dispose(&self, target: Target) -> Result<(), RuntimeError> {
        self.kill(target, Some(KillSignal::Dispose))
    }

    /// Asks the coordinator for a status snapshot.
    ///
    /// Replies are matched to requests in order.
    pub async fn status(&self) -> Result<StatusSnapshot, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut st = self.shared.state();
            if st.closed {
                return Err(RuntimeError::ChannelClosed);
            }
            st.status_waiters.push_back(tx);
            if let Err(e) = self.shared.send(&WorkerMessage::Status) {
                st.status_waiters.pop_back();
                return Err(e);
            }
        }
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }
}

async fn write_lines<W>(writer: W, mut rx: mpsc::UnboundedReceiver<String>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut sink = FramedWrite::new(writer, LinesCodec::new());
    while let Some(line) = rx.recv().await {
        if let Err(e) = sink.send(line).await {
            tracing::warn!(error = %e, "ipc write failed");
            break;
        }
    }
}

async fn read_lines<R>(reader: R, shared: Arc<Shared>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = FramedRead::new(reader, LinesCodec::new());
    while let Some(item) = lines.next().await {
        let line = match item {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "ipc read failed");
                break;
            }
        };
        match MasterMessage::from_line(&line) {
            Ok(msg) => handle(&shared, msg),
            Err(e) => tracing::warn!(error = %e, line = %line, "ignoring message"),
        }
    }

    let mut st = shared.state();
    st.closed = true;
    st.status_waiters.clear();
    drop(st);
    shared.draining.cancel();
}

fn handle(shared: &Shared, msg: MasterMessage) {
    match msg {
        MasterMessage::Args { payload } => {
            let pool = payload
                .get(POOL_ENV_KEY)
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .or_else(|| std::env::var(POOL_ENV_KEY).ok());

            let mut st = shared.state();
            if st.args.is_some() {
                return;
            }
            let pending = std::mem::take(&mut st.pending);
            st.args = Some(payload.clone());
            st.pool = pool.clone();
            drop(st);

            for reg in pending {
                if pool.as_deref() == Some(reg.pool.as_str()) {
                    tokio::spawn((reg.handler)(payload.clone()));
                }
            }
        }
        MasterMessage::Ping => {
            if let Err(e) = shared.send(&WorkerMessage::Ping) {
                tracing::debug!(error = %e, "cannot answer ping");
            }
        }
        MasterMessage::Disconnect => shared.draining.cancel(),
        MasterMessage::Status { status } => {
            if let Some(waiter) = shared.state().status_waiters.pop_front() {
                let _ = waiter.send(status);
            }
        }
    }
}
