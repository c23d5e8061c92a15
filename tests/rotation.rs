mod common;

use std::time::Duration;

use common::{FakeLauncher, Op, drain, kinds, settle, supervisor};
use poolvisor::{EventKind, KillSignal, MasterMessage, PoolOptions, Signal, WorkerMessage};

const TTL: Duration = Duration::from_secs(10);

fn rotating(strict: bool) -> PoolOptions {
    PoolOptions {
        strict,
        ttl: TTL,
        ttl_variance: 0.0,
        heartbeat_timeout: Duration::ZERO,
        ..PoolOptions::with_size(1)
    }
}

#[tokio::test(start_paused = true)]
async fn ttl_rotation_waits_for_the_replacement() {
    let fake = FakeLauncher::manual_online();
    let sup = supervisor(&fake);
    let mut events = sup.subscribe();
    sup.pool("web", rotating(false)).await.unwrap();
    settle().await;
    let old = fake.alive("web")[0];
    fake.online(old);

    tokio::time::sleep(TTL).await;
    settle().await;

    assert!(kinds(&drain(&mut events)).contains(&EventKind::TtlExpired));
    assert_eq!(fake.spawned("web"), 2);
    let new = fake.alive("web")[1];
    assert!(!fake.was_disconnected(old));

    fake.online(new);
    settle().await;
    assert!(fake.was_disconnected(old));
    assert_eq!(fake.inbox(old).last(), Some(&MasterMessage::Disconnect));
    assert!(kinds(&drain(&mut events)).contains(&EventKind::WorkerReplaced));

    fake.exit(old, 0);
    settle().await;
    assert_eq!(fake.alive("web"), vec![new]);
    assert_eq!(fake.spawned("web"), 2);
}

#[tokio::test(start_paused = true)]
async fn strict_rotation_disconnects_before_spawning() {
    let fake = FakeLauncher::new();
    let sup = supervisor(&fake);
    sup.pool("web", rotating(true)).await.unwrap();
    settle().await;
    let old = fake.alive("web")[0];

    tokio::time::sleep(TTL).await;
    settle().await;
    assert!(fake.was_disconnected(old));
    assert_eq!(fake.spawned("web"), 1);

    fake.exit(old, 0);
    settle().await;
    assert_eq!(fake.spawned("web"), 2);

    let journal = fake.journal();
    let disconnected = journal
        .iter()
        .position(|op| *op == Op::Disconnect { pid: old })
        .unwrap();
    let respawned = journal
        .iter()
        .rposition(|op| matches!(op, Op::Spawn { .. }))
        .unwrap();
    assert!(disconnected < respawned);
}

#[tokio::test(start_paused = true)]
async fn lingering_worker_is_killed_after_disconnect() {
    let fake = FakeLauncher::new();
    let sup = supervisor(&fake);
    let mut events = sup.subscribe();
    sup.pool("web", rotating(true)).await.unwrap();
    settle().await;
    let old = fake.alive("web")[0];

    tokio::time::sleep(TTL).await;
    settle().await;
    assert!(fake.kills(old).is_empty());

    // Disconnect timeout (10s) elapses before the 30s kill delay.
    tokio::time::sleep(Duration::from_secs(10)).await;
    settle().await;
    assert_eq!(fake.kills(old), vec![Signal::SIGKILL]);
    assert!(kinds(&drain(&mut events)).contains(&EventKind::ForceShutdown));
    assert_eq!(fake.alive("web").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_replacement_resumes_rotation() {
    let fake = FakeLauncher::manual_online();
    let sup = supervisor(&fake);
    sup.pool("web", rotating(false)).await.unwrap();
    settle().await;
    let old = fake.alive("web")[0];
    fake.online(old);

    tokio::time::sleep(TTL).await;
    settle().await;
    let first = fake.alive("web")[1];

    // The replacement dies young: respawn waits for restart_delay.
    fake.exit(first, 1);
    settle().await;
    assert_eq!(fake.alive("web"), vec![old]);

    tokio::time::sleep(Duration::from_secs(1)).await;
    settle().await;
    assert_eq!(fake.spawned("web"), 3);
    let second = fake.alive("web")[1];
    assert!(!fake.was_disconnected(old));

    fake.online(second);
    settle().await;
    assert!(fake.was_disconnected(old));
}

#[tokio::test(start_paused = true)]
async fn old_worker_dying_hands_slot_to_replacement() {
    let fake = FakeLauncher::manual_online();
    let sup = supervisor(&fake);
    sup.pool("web", rotating(false)).await.unwrap();
    settle().await;
    let old = fake.alive("web")[0];
    fake.online(old);

    tokio::time::sleep(TTL).await;
    settle().await;
    let new = fake.alive("web")[1];

    fake.exit(old, 1);
    settle().await;
    fake.online(new);
    settle().await;

    assert_eq!(fake.alive("web"), vec![new]);
    assert_eq!(fake.spawned("web"), 2);
}

#[tokio::test(start_paused = true)]
async fn dispose_mid_rotation_removes_the_replacement_too() {
    let fake = FakeLauncher::manual_online();
    let sup = supervisor(&fake);
    sup.pool("web", rotating(false)).await.unwrap();
    settle().await;
    let old = fake.alive("web")[0];
    fake.online(old);

    tokio::time::sleep(TTL).await;
    settle().await;
    let new = fake.alive("web")[1];

    sup.kill_worker(fake.worker_id(old), Some(KillSignal::Dispose))
        .await
        .unwrap();
    settle().await;

    assert_eq!(fake.kills(new), vec![Signal::SIGKILL]);
    let web = sup.status().await.unwrap().pools["web"].clone();
    assert_eq!((web.count, web.size), (0, 0));

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(fake.spawned("web"), 2);
}

#[tokio::test(start_paused = true)]
async fn graceful_pool_restart_replaces_every_worker() {
    let fake = FakeLauncher::new();
    let sup = supervisor(&fake);
    sup.pool(
        "web",
        PoolOptions {
            heartbeat_timeout: Duration::ZERO,
            ..PoolOptions::with_size(2)
        },
    )
    .await
    .unwrap();
    settle().await;
    let originals = fake.alive("web");

    sup.kill_pool("web", None).await.unwrap();
    settle().await;

    assert_eq!(fake.spawned("web"), 4);
    assert!(originals.iter().all(|pid| fake.was_disconnected(*pid)));

    // A worker already rotating ignores further restart requests.
    sup.kill_worker(fake.worker_id(originals[0]), None)
        .await
        .unwrap();
    settle().await;
    assert_eq!(fake.spawned("web"), 4);

    for pid in &originals {
        fake.exit(*pid, 0);
    }
    settle().await;
    assert_eq!(fake.alive("web").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn silent_worker_is_killed_by_heartbeat() {
    let fake = FakeLauncher::new();
    let sup = supervisor(&fake);
    let mut events = sup.subscribe();
    sup.pool(
        "web",
        PoolOptions {
            heartbeat_timeout: Duration::from_secs(1),
            ..PoolOptions::with_size(1)
        },
    )
    .await
    .unwrap();
    settle().await;
    let pid = fake.alive("web")[0];

    tokio::time::sleep(Duration::from_millis(900)).await;
    assert!(fake.inbox(pid).contains(&MasterMessage::Ping));
    assert!(fake.kills(pid).is_empty());

    tokio::time::sleep(Duration::from_millis(400)).await;
    settle().await;
    assert_eq!(fake.kills(pid), vec![Signal::SIGKILL]);
    assert!(kinds(&drain(&mut events)).contains(&EventKind::HeartbeatTimeout));
    assert_eq!(fake.spawned("web"), 2);
}

#[tokio::test(start_paused = true)]
async fn heartbeat_stops_after_its_kill() {
    let fake = FakeLauncher::stubborn();
    let sup = supervisor(&fake);
    let mut events = sup.subscribe();
    sup.pool(
        "web",
        PoolOptions {
            heartbeat_timeout: Duration::from_secs(1),
            ..PoolOptions::with_size(1)
        },
    )
    .await
    .unwrap();
    settle().await;
    let pid = fake.alive("web")[0];
    let pings = |fake: &FakeLauncher| {
        fake.inbox(pid)
            .iter()
            .filter(|m| **m == MasterMessage::Ping)
            .count()
    };

    tokio::time::sleep(Duration::from_millis(1300)).await;
    settle().await;
    assert_eq!(fake.kills(pid), vec![Signal::SIGKILL]);
    let sent = pings(&fake);

    // The process ignores SIGKILL and stays connected; nothing else may fire.
    tokio::time::sleep(Duration::from_secs(5)).await;
    settle().await;
    assert_eq!(fake.kills(pid), vec![Signal::SIGKILL]);
    assert_eq!(pings(&fake), sent);
    let timeouts = kinds(&drain(&mut events))
        .into_iter()
        .filter(|k| *k == EventKind::HeartbeatTimeout)
        .count();
    assert_eq!(timeouts, 1);
    assert_eq!(fake.alive("web"), vec![pid]);
}

#[tokio::test(start_paused = true)]
async fn answered_pings_keep_worker_alive() {
    let fake = FakeLauncher::new();
    let sup = supervisor(&fake);
    sup.pool(
        "web",
        PoolOptions {
            heartbeat_timeout: Duration::from_secs(1),
            ..PoolOptions::with_size(1)
        },
    )
    .await
    .unwrap();
    settle().await;
    let pid = fake.alive("web")[0];

    for _ in 0..12 {
        tokio::time::sleep(Duration::from_millis(500)).await;
        fake.send_from(pid, &WorkerMessage::Ping);
    }
    settle().await;
    assert!(fake.kills(pid).is_empty());
    assert_eq!(fake.spawned("web"), 1);
}

#[tokio::test(start_paused = true)]
async fn heartbeat_stops_once_channel_closes() {
    let fake = FakeLauncher::new();
    let sup = supervisor(&fake);
    let mut events = sup.subscribe();
    sup.pool(
        "web",
        PoolOptions {
            heartbeat_timeout: Duration::from_secs(1),
            ..PoolOptions::with_size(1)
        },
    )
    .await
    .unwrap();
    settle().await;
    let pid = fake.alive("web")[0];

    fake.hang_up(pid);
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(fake.kills(pid).is_empty());
    let seen = kinds(&drain(&mut events));
    assert!(seen.contains(&EventKind::WorkerDisconnected));
    assert!(!seen.contains(&EventKind::HeartbeatTimeout));

    tokio::time::sleep(Duration::from_secs(8)).await;
    assert_eq!(fake.kills(pid), vec![Signal::SIGKILL]);
}
