#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use poolvisor::{
    Event, EventKind, LaunchRequest, Launcher, MasterMessage, ProcessEvent, ProcessLink,
    RuntimeError, Signal, Spawned, Supervisor, SupervisorConfig, TerminationReason, WorkerId,
    WorkerMessage,
};
use tokio::sync::{broadcast, mpsc};

/// Something the coordinator did to a fake process.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Spawn { pool: String, pid: u32, worker: WorkerId },
    Send { pid: u32, msg: MasterMessage },
    Disconnect { pid: u32 },
    Kill { pid: u32, signal: Signal },
}

struct FakeProc {
    pool: String,
    env: HashMap<String, String>,
    events: mpsc::UnboundedSender<ProcessEvent>,
    connected: bool,
    exited: bool,
}

struct FakeState {
    next_pid: u32,
    auto_online: bool,
    stubborn: bool,
    fail_next: usize,
    procs: HashMap<u32, FakeProc>,
    journal: Vec<Op>,
}

/// In-memory launcher: processes are channels, SIGKILL exits immediately.
#[derive(Clone)]
pub struct FakeLauncher {
    state: Arc<Mutex<FakeState>>,
}

impl FakeLauncher {
    /// Processes report `Online` at launch, as if their first line arrived.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                next_pid: 1000,
                auto_online: true,
                stubborn: false,
                fail_next: 0,
                procs: HashMap::new(),
                journal: Vec::new(),
            })),
        }
    }

    /// Processes only report `Online` when told to via [`online`](Self::online).
    pub fn manual_online() -> Self {
        let fake = Self::new();
        fake.state.lock().unwrap().auto_online = false;
        fake
    }

    /// Processes survive SIGKILL.
    pub fn stubborn() -> Self {
        let fake = Self::new();
        fake.state.lock().unwrap().stubborn = true;
        fake
    }

    pub fn fail_next(&self, n: usize) {
        self.state.lock().unwrap().fail_next = n;
    }

    fn emit(&self, pid: u32, ev: ProcessEvent) {
        let st = self.state.lock().unwrap();
        let p = st.procs.get(&pid).expect("unknown pid");
        let _ = p.events.send(ev);
    }

    pub fn online(&self, pid: u32) {
        self.emit(pid, ProcessEvent::Online);
    }

    pub fn send_from(&self, pid: u32, msg: &WorkerMessage) {
        self.emit(pid, ProcessEvent::Message(msg.to_line().unwrap()));
    }

    pub fn send_raw(&self, pid: u32, line: &str) {
        self.emit(pid, ProcessEvent::Message(line.to_string()));
    }

    /// The worker closes its end of the channel.
    pub fn hang_up(&self, pid: u32) {
        let mut st = self.state.lock().unwrap();
        let p = st.procs.get_mut(&pid).expect("unknown pid");
        if p.connected {
            p.connected = false;
            let _ = p.events.send(ProcessEvent::Disconnect);
        }
    }

    pub fn exit(&self, pid: u32, code: i32) {
        exit_proc(&mut self.state.lock().unwrap(), pid, TerminationReason::Exited(code));
    }

    pub fn journal(&self) -> Vec<Op> {
        self.state.lock().unwrap().journal.clone()
    }

    /// Messages the coordinator sent to `pid`.
    pub fn inbox(&self, pid: u32) -> Vec<MasterMessage> {
        self.journal()
            .into_iter()
            .filter_map(|op| match op {
                Op::Send { pid: p, msg } if p == pid => Some(msg),
                _ => None,
            })
            .collect()
    }

    /// Signals delivered to `pid`.
    pub fn kills(&self, pid: u32) -> Vec<Signal> {
        self.journal()
            .into_iter()
            .filter_map(|op| match op {
                Op::Kill { pid: p, signal } if p == pid => Some(signal),
                _ => None,
            })
            .collect()
    }

    pub fn was_disconnected(&self, pid: u32) -> bool {
        self.journal().contains(&Op::Disconnect { pid })
    }

    /// Pids of running processes of `pool`, in spawn order.
    pub fn alive(&self, pool: &str) -> Vec<u32> {
        let st = self.state.lock().unwrap();
        let mut pids: Vec<u32> = st
            .procs
            .iter()
            .filter(|(_, p)| p.pool == pool && !p.exited)
            .map(|(pid, _)| *pid)
            .collect();
        pids.sort_unstable();
        pids
    }

    /// Number of processes ever launched for `pool`.
    pub fn spawned(&self, pool: &str) -> usize {
        self.journal()
            .iter()
            .filter(|op| matches!(op, Op::Spawn { pool: p, .. } if p == pool))
            .count()
    }

    pub fn env(&self, pid: u32) -> HashMap<String, String> {
        self.state.lock().unwrap().procs[&pid].env.clone()
    }

    pub fn worker_id(&self, pid: u32) -> WorkerId {
        self.journal()
            .into_iter()
            .find_map(|op| match op {
                Op::Spawn { pid: p, worker, .. } if p == pid => Some(worker),
                _ => None,
            })
            .expect("unknown pid")
    }
}

fn exit_proc(st: &mut FakeState, pid: u32, reason: TerminationReason) {
    let Some(p) = st.procs.get_mut(&pid) else {
        return;
    };
    if p.exited {
        return;
    }
    p.exited = true;
    if p.connected {
        p.connected = false;
        let _ = p.events.send(ProcessEvent::Disconnect);
    }
    let _ = p.events.send(ProcessEvent::Exit(reason));
}

impl Launcher for FakeLauncher {
    fn launch(&self, req: LaunchRequest) -> Result<Spawned, RuntimeError> {
        let mut st = self.state.lock().unwrap();
        if st.fail_next > 0 {
            st.fail_next -= 1;
            return Err(RuntimeError::Spawn {
                pool: req.pool.to_string(),
                source: std::io::Error::other("no such file"),
            });
        }

        let pid = st.next_pid;
        st.next_pid += 1;
        let (tx, rx) = mpsc::unbounded_channel();
        if st.auto_online {
            let _ = tx.send(ProcessEvent::Online);
        }
        st.procs.insert(
            pid,
            FakeProc {
                pool: req.pool.to_string(),
                env: req.env,
                events: tx,
                connected: true,
                exited: false,
            },
        );
        st.journal.push(Op::Spawn {
            pool: req.pool.to_string(),
            pid,
            worker: req.worker,
        });

        Ok(Spawned {
            pid,
            link: Box::new(FakeLink {
                pid,
                state: Arc::clone(&self.state),
            }),
            events: rx,
        })
    }
}

struct FakeLink {
    pid: u32,
    state: Arc<Mutex<FakeState>>,
}

impl ProcessLink for FakeLink {
    fn send(&mut self, msg: &MasterMessage) -> Result<(), RuntimeError> {
        let mut st = self.state.lock().unwrap();
        if !st.procs[&self.pid].connected {
            return Err(RuntimeError::ChannelClosed);
        }
        st.journal.push(Op::Send {
            pid: self.pid,
            msg: msg.clone(),
        });
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut st = self.state.lock().unwrap();
        let p = st.procs.get_mut(&self.pid).expect("unknown pid");
        if p.connected {
            p.connected = false;
            let _ = p.events.send(ProcessEvent::Disconnect);
            st.journal.push(Op::Disconnect { pid: self.pid });
        }
    }

    fn is_connected(&self) -> bool {
        self.state.lock().unwrap().procs[&self.pid].connected
    }

    fn kill(&mut self, signal: Signal) -> Result<(), RuntimeError> {
        let mut st = self.state.lock().unwrap();
        st.journal.push(Op::Kill {
            pid: self.pid,
            signal,
        });
        if signal == Signal::SIGKILL && !st.stubborn {
            exit_proc(&mut st, self.pid, TerminationReason::Signaled(Signal::SIGKILL));
        }
        Ok(())
    }
}

/// Supervisor over `launcher` with default settings.
pub fn supervisor(launcher: &FakeLauncher) -> Supervisor {
    supervisor_with(launcher, SupervisorConfig::default())
}

pub fn supervisor_with(launcher: &FakeLauncher, cfg: SupervisorConfig) -> Supervisor {
    Supervisor::builder(cfg)
        .with_launcher(Arc::new(launcher.clone()))
        .build()
        .expect("build supervisor")
}

/// Lets every ready task run (virtual time advances by 1ms at most).
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Events received so far.
pub fn drain(rx: &mut broadcast::Receiver<Arc<Event>>) -> Vec<Arc<Event>> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

pub fn kinds(events: &[Arc<Event>]) -> Vec<EventKind> {
    events.iter().map(|e| e.kind).collect()
}
