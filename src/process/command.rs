//! # Worker processes over piped stdio.
//!
//! [`CommandLauncher`] runs the worker executable with `tokio::process` and uses
//! the child's stdin/stdout as the IPC channel (newline-delimited JSON, framed
//! with `tokio_util::codec::LinesCodec`). Three background tasks serve each child:
//!
//! ```text
//! ChildLink::send ──► [mpsc] ──► writer ──► child stdin
//! child stdout ──► reader ──► ProcessEvent::Online (first line) / Message / Disconnect
//! child.wait() ──► reaper ──► ProcessEvent::Exit (always last)
//! ```
//!
//! A started process is not yet a ready worker: `Online` is reported when the
//! child writes its first line, which for an agent is its `online` announce.
//!
//! Closing the channel drops the writer's queue, which closes the child's stdin;
//! the agent inside the worker observes EOF.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

use crate::config::SupervisorConfig;
use crate::error::RuntimeError;
use crate::process::{
    LaunchRequest, Launcher, ProcessEvent, ProcessLink, Spawned, TerminationReason,
};
use crate::protocol::MasterMessage;

/// Longest accepted inbound line (status replies are small, args may not be).
const MAX_LINE_LEN: usize = 8 * 1024 * 1024;

/// How long the reaper waits for buffered output after the child exited.
const DRAIN_AFTER_EXIT: Duration = Duration::from_millis(200);

/// Launches workers as child processes of the coordinator.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    exec: PathBuf,
    args: Vec<String>,
    silent: bool,
}

impl CommandLauncher {
    /// Launcher for `exec` without extra arguments.
    pub fn new(exec: impl Into<PathBuf>) -> Self {
        Self {
            exec: exec.into(),
            args: Vec::new(),
            silent: false,
        }
    }

    /// Launcher built from the supervisor settings.
    ///
    /// Without an explicit `exec`, workers re-run the current executable.
    pub fn from_config(cfg: &SupervisorConfig) -> Result<Self, RuntimeError> {
        let exec = match &cfg.exec {
            Some(path) => path.clone(),
            None => std::env::current_exe().map_err(|source| RuntimeError::Exec { source })?,
        };
        Ok(Self {
            exec,
            args: cfg.args.clone(),
            silent: cfg.silent,
        })
    }

    /// Replaces the extra command-line arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Discards worker stderr when `silent` is true.
    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }
}

impl Launcher for CommandLauncher {
    fn launch(&self, req: LaunchRequest) -> Result<Spawned, RuntimeError> {
        let spawn_err = |source| RuntimeError::Spawn {
            pool: req.pool.to_string(),
            source,
        };

        let mut child = Command::new(&self.exec)
            .args(&self.args)
            .envs(&req.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(if self.silent {
                Stdio::null()
            } else {
                Stdio::inherit()
            })
            .spawn()
            .map_err(spawn_err)?;

        let pid = child
            .id()
            .ok_or_else(|| spawn_err(std::io::Error::other("child exited before it was tracked")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_err(std::io::Error::other("child stdin not captured")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_err(std::io::Error::other("child stdout not captured")))?;

        let (events_tx, events) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(true));
        let exited = Arc::new(AtomicBool::new(false));

        tokio::spawn(write_lines(stdin, out_rx));
        let reader = tokio::spawn(read_lines(stdout, events_tx.clone(), Arc::clone(&connected)));
        tokio::spawn(reap(
            child,
            reader,
            events_tx.clone(),
            Arc::clone(&connected),
            Arc::clone(&exited),
        ));

        Ok(Spawned {
            pid,
            link: Box::new(ChildLink {
                pid,
                out: Some(out_tx),
                events: events_tx,
                connected,
                exited,
            }),
            events,
        })
    }
}

/// Control handle of one child process.
struct ChildLink {
    pid: u32,
    out: Option<mpsc::UnboundedSender<String>>,
    events: mpsc::UnboundedSender<ProcessEvent>,
    connected: Arc<AtomicBool>,
    exited: Arc<AtomicBool>,
}

impl ProcessLink for ChildLink {
    fn send(&mut self, msg: &MasterMessage) -> Result<(), RuntimeError> {
        if !self.is_connected() {
            return Err(RuntimeError::ChannelClosed);
        }
        let line = msg.to_line()?;
        self.out
            .as_ref()
            .ok_or(RuntimeError::ChannelClosed)?
            .send(line)
            .map_err(|_| RuntimeError::ChannelClosed)
    }

    fn disconnect(&mut self) {
        self.out = None;
        if self.connected.swap(false, Ordering::AcqRel) {
            let _ = self.events.send(ProcessEvent::Disconnect);
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn kill(&mut self, sig: Signal) -> Result<(), RuntimeError> {
        // The pid may already belong to another process once reaped.
        if self.exited.load(Ordering::Acquire) {
            return Ok(());
        }
        let raw = i32::try_from(self.pid).map_err(|_| RuntimeError::Signal {
            pid: self.pid,
            source: nix::errno::Errno::ESRCH,
        })?;
        signal::kill(Pid::from_raw(raw), sig).map_err(|source| RuntimeError::Signal {
            pid: self.pid,
            source,
        })
    }
}

async fn write_lines(stdin: ChildStdin, mut rx: mpsc::UnboundedReceiver<String>) {
    let mut sink = FramedWrite::new(stdin, LinesCodec::new());
    while let Some(line) = rx.recv().await {
        if sink.send(line).await.is_err() {
            break;
        }
    }
}

async fn read_lines(
    stdout: ChildStdout,
    events: mpsc::UnboundedSender<ProcessEvent>,
    connected: Arc<AtomicBool>,
) {
    let mut lines = FramedRead::new(stdout, LinesCodec::new_with_max_length(MAX_LINE_LEN));
    let mut online = false;
    while let Some(item) = lines.next().await {
        match item {
            Ok(line) if connected.load(Ordering::Acquire) => {
                if !online {
                    online = true;
                    let _ = events.send(ProcessEvent::Online);
                }
                let _ = events.send(ProcessEvent::Message(line));
            }
            Ok(_) => {}
            // The framed stream ends after any decode error.
            Err(e) => {
                tracing::warn!(error = %e, "worker output unreadable, closing channel");
                break;
            }
        }
    }
    if connected.swap(false, Ordering::AcqRel) {
        let _ = events.send(ProcessEvent::Disconnect);
    }
}

async fn reap(
    mut child: Child,
    mut reader: JoinHandle<()>,
    events: mpsc::UnboundedSender<ProcessEvent>,
    connected: Arc<AtomicBool>,
    exited: Arc<AtomicBool>,
) {
    let reason = match child.wait().await {
        Ok(status) => TerminationReason::from_status(status),
        Err(_) => TerminationReason::Unknown,
    };
    exited.store(true, Ordering::Release);

    // A grandchild may keep stdout open; stop reading so Exit stays last.
    if tokio::time::timeout(DRAIN_AFTER_EXIT, &mut reader).await.is_err() {
        reader.abort();
    }
    if connected.swap(false, Ordering::AcqRel) {
        let _ = events.send(ProcessEvent::Disconnect);
    }
    let _ = events.send(ProcessEvent::Exit(reason));
}
