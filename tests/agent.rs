use std::collections::BTreeMap;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use poolvisor::{
    Agent, KillSignal, MasterMessage, POOL_ENV_KEY, PoolArgs, PoolRef, RuntimeError,
    StatusSnapshot, Target, WorkerId, WorkerMessage,
};
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LinesCodec};

type Master = Framed<DuplexStream, LinesCodec>;

/// Agent wired to an in-memory coordinator end; the `online` announce is consumed.
async fn connect() -> (Agent, Master) {
    let (worker_end, master_end) = tokio::io::duplex(64 * 1024);
    let (reader, writer) = tokio::io::split(worker_end);
    let agent = Agent::new(reader, writer);
    let mut master = Framed::new(master_end, LinesCodec::new());
    assert_eq!(recv(&mut master).await, WorkerMessage::Online);
    (agent, master)
}

async fn recv(master: &mut Master) -> WorkerMessage {
    let line = tokio::time::timeout(Duration::from_secs(1), master.next())
        .await
        .expect("no message from agent")
        .expect("stream ended")
        .expect("bad line");
    WorkerMessage::from_line(&line).unwrap()
}

async fn send(master: &mut Master, msg: MasterMessage) {
    master.send(msg.to_line().unwrap()).await.unwrap();
}

fn args_for(pool: &str) -> MasterMessage {
    let mut payload = PoolArgs::new();
    payload.insert(POOL_ENV_KEY.into(), pool.into());
    payload.insert("port".into(), 8080.into());
    MasterMessage::Args { payload }
}

fn snapshot(pid: u32) -> StatusSnapshot {
    StatusSnapshot {
        pid,
        workers: 0,
        pools: BTreeMap::new(),
    }
}

#[tokio::test]
async fn announces_online_on_start() {
    let (worker_end, master_end) = tokio::io::duplex(1024);
    let (reader, writer) = tokio::io::split(worker_end);
    let _agent = Agent::new(reader, writer);
    let mut master = Framed::new(master_end, LinesCodec::new());

    let line = master.next().await.unwrap().unwrap();
    assert_eq!(line, r#"{"command":"online"}"#);
}

#[tokio::test]
async fn handlers_run_only_for_the_bound_pool() {
    let (agent, mut master) = connect().await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    for pool in ["web", "jobs"] {
        let tx = tx.clone();
        agent.register(pool, move |args: PoolArgs| async move {
            let _ = tx.send((pool, args));
        });
    }
    send(&mut master, args_for("web")).await;

    let (pool, args) = rx.recv().await.unwrap();
    assert_eq!(pool, "web");
    assert_eq!(args["port"], 8080);
    assert_eq!(agent.pool().as_deref(), Some("web"));
    assert_eq!(agent.args().unwrap()["port"], 8080);

    // Late registrations run at once for the bound pool only.
    let late = tx.clone();
    agent.register("jobs", move |_| async move {
        let _ = late.send(("jobs-late", PoolArgs::new()));
    });
    agent.register("web", move |args| async move {
        let _ = tx.send(("web-late", args));
    });
    let (pool, _) = rx.recv().await.unwrap();
    assert_eq!(pool, "web-late");
    // Every sender is gone once the handlers finished or were dropped.
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn repeated_args_are_ignored() {
    let (agent, mut master) = connect().await;

    send(&mut master, args_for("web")).await;
    send(&mut master, args_for("jobs")).await;
    send(&mut master, MasterMessage::Ping).await;
    assert_eq!(recv(&mut master).await, WorkerMessage::Ping);

    assert_eq!(agent.pool().as_deref(), Some("web"));
}

#[tokio::test]
async fn answers_ping_and_skips_garbage() {
    let (_agent, mut master) = connect().await;

    master.send("definitely not json".to_string()).await.unwrap();
    send(&mut master, MasterMessage::Ping).await;

    assert_eq!(recv(&mut master).await, WorkerMessage::Ping);
}

#[tokio::test]
async fn status_replies_resolve_in_request_order() {
    let (agent, mut master) = connect().await;

    let a = agent.clone();
    let first = tokio::spawn(async move { a.status().await });
    assert_eq!(recv(&mut master).await, WorkerMessage::Status);
    let b = agent.clone();
    let second = tokio::spawn(async move { b.status().await });
    assert_eq!(recv(&mut master).await, WorkerMessage::Status);

    send(&mut master, MasterMessage::Status { status: snapshot(1) }).await;
    send(&mut master, MasterMessage::Status { status: snapshot(2) }).await;

    assert_eq!(first.await.unwrap().unwrap().pid, 1);
    assert_eq!(second.await.unwrap().unwrap().pid, 2);
}

#[tokio::test]
async fn disconnect_starts_draining() {
    let (agent, mut master) = connect().await;
    assert!(!agent.is_draining());

    send(&mut master, MasterMessage::Disconnect).await;

    tokio::time::timeout(Duration::from_secs(1), agent.disconnected())
        .await
        .expect("agent should drain");
    assert!(agent.is_draining());
}

#[tokio::test]
async fn closed_channel_drains_and_fails_pending_status() {
    let (agent, mut master) = connect().await;

    let a = agent.clone();
    let pending = tokio::spawn(async move { a.status().await });
    assert_eq!(recv(&mut master).await, WorkerMessage::Status);
    drop(master);

    let res = pending.await.unwrap();
    assert!(matches!(res, Err(RuntimeError::ChannelClosed)));
    tokio::time::timeout(Duration::from_secs(1), agent.disconnected())
        .await
        .expect("agent should drain");
    assert!(matches!(
        agent.status().await,
        Err(RuntimeError::ChannelClosed)
    ));
}

#[tokio::test]
async fn requests_address_their_targets() {
    let (agent, mut master) = connect().await;

    agent.restart(Target::Myself).unwrap();
    assert_eq!(
        recv(&mut master).await,
        WorkerMessage::Kill {
            id: None,
            signal: None
        }
    );

    agent.dispose(Target::Worker(WorkerId(7))).unwrap();
    assert_eq!(
        recv(&mut master).await,
        WorkerMessage::Kill {
            id: Some(WorkerId(7)),
            signal: Some(KillSignal::Dispose)
        }
    );

    agent
        .kill(Target::Cluster, Some(KillSignal::Force))
        .unwrap();
    assert_eq!(
        recv(&mut master).await,
        WorkerMessage::KillCluster {
            signal: Some(KillSignal::Force)
        }
    );

    agent.restart(Target::Pool("jobs".into())).unwrap();
    assert_eq!(
        recv(&mut master).await,
        WorkerMessage::KillPool {
            pool: PoolRef::Named("jobs".into()),
            signal: None
        }
    );
}

#[tokio::test]
async fn own_pool_resolves_once_bound() {
    let (agent, mut master) = connect().await;

    // Unbound (and no pool in the environment): let the coordinator resolve it.
    if std::env::var(POOL_ENV_KEY).is_err() {
        agent.restart(Target::OwnPool).unwrap();
        assert_eq!(
            recv(&mut master).await,
            WorkerMessage::KillPool {
                pool: PoolRef::Own(true),
                signal: None
            }
        );
    }

    send(&mut master, args_for("web")).await;
    send(&mut master, MasterMessage::Ping).await;
    assert_eq!(recv(&mut master).await, WorkerMessage::Ping);

    agent.restart(Target::OwnPool).unwrap();
    assert_eq!(
        recv(&mut master).await,
        WorkerMessage::KillPool {
            pool: PoolRef::Named("web".into()),
            signal: None
        }
    );
}

#[tokio::test]
async fn registrations_are_dropped_when_args_bind_no_pool() {
    if std::env::var(POOL_ENV_KEY).is_ok() {
        return;
    }
    let (agent, mut master) = connect().await;

    send(&mut master, MasterMessage::Args { payload: PoolArgs::new() }).await;
    send(&mut master, MasterMessage::Ping).await;
    assert_eq!(recv(&mut master).await, WorkerMessage::Ping);
    assert!(agent.args().is_some());
    assert_eq!(agent.pool(), None);

    let (tx, mut rx) = mpsc::unbounded_channel::<()>();
    agent.register("web", move |_| async move {
        let _ = tx.send(());
    });
    // A queued handler would keep the sender alive.
    let closed = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("registration was kept");
    assert!(closed.is_none());
}
