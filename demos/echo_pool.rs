//! # Example: Echo Pool
//!
//! One binary, two roles. Started normally it is the coordinator: it runs a
//! pool of three `echo` workers and a single `flaky` worker, each re-executing
//! this same binary. Started with `POOLVISOR_POOL` set (which the coordinator
//! does for every worker) it is a worker.
//!
//! - `echo` workers rotate every ~20s (make-before-break) and print a status
//!   line every few seconds.
//! - the `flaky` worker exits after one second, so the coordinator keeps it
//!   alive with the restart-delay backoff.
//!
//! Send `SIGHUP` to restart every pool gracefully, `Ctrl+C` to stop.
//!
//! Run with: `cargo run --example echo_pool`

use std::sync::Arc;
use std::time::Duration;

use poolvisor::{
    Agent, LogWriter, POOL_ENV_KEY, PoolArgs, PoolOptions, Subscribe, Supervisor,
    SupervisorConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    poolvisor::logging::init();

    if std::env::var(POOL_ENV_KEY).is_ok() {
        return worker().await;
    }
    coordinator().await
}

async fn coordinator() -> anyhow::Result<()> {
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let sup = Supervisor::builder(SupervisorConfig::default())
        .with_subscribers(subs)
        .build()?;

    let mut echo = PoolOptions {
        ttl: Duration::from_secs(20),
        heartbeat_timeout: Duration::from_secs(4),
        kill_delay: Duration::from_secs(5),
        ..PoolOptions::with_size(3)
    };
    echo.args.insert("interval_ms".into(), 3000.into());
    sup.pool("echo", echo).await?;

    sup.pool(
        "flaky",
        PoolOptions {
            restart_delay: Duration::from_secs(5),
            ..PoolOptions::with_size(1)
        },
    )
    .await?;

    sup.log("echo demo running; SIGHUP restarts, Ctrl+C stops");
    sup.serve_signals().await?;
    Ok(())
}

async fn worker() -> anyhow::Result<()> {
    let agent = Agent::stdio();

    let echo = agent.clone();
    agent.register("echo", move |args: PoolArgs| async move {
        let interval = args
            .get("interval_ms")
            .and_then(|v| v.as_u64())
            .unwrap_or(1000);
        let mut tick = tokio::time::interval(Duration::from_millis(interval));
        loop {
            tokio::select! {
                _ = echo.disconnected() => break,
                _ = tick.tick() => {}
            }
            match echo.status().await {
                Ok(status) => tracing::info!(
                    worker = ?echo.worker_id(),
                    cluster = status.workers,
                    "echo"
                ),
                Err(e) => tracing::warn!(error = %e, "no status"),
            }
        }
    });

    agent.register("flaky", |_args: PoolArgs| async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        tracing::warn!("flaky worker giving up");
        std::process::exit(1);
    });

    agent.disconnected().await;
    tracing::info!(worker = ?agent.worker_id(), "draining");
    Ok(())
}
