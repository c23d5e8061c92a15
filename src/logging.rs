//! Logging setup for coordinator and worker binaries.
//!
//! # Environment Variables
//!
//! - `POOLVISOR_LOG` - Log filter (overrides RUST_LOG)
//! - `RUST_LOG` - Standard Rust log filter (fallback)
//!
//! Output always goes to stderr: in a worker, stdout is the IPC channel.
//!
//! # Example
//!
//! ```no_run
//! poolvisor::logging::init();
//! tracing::info!("coordinator starting");
//! ```

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "POOLVISOR_LOG";

/// Filter used when neither variable is set.
const DEFAULT_FILTER: &str = "info";

/// Builds the filter from `POOLVISOR_LOG`, then `RUST_LOG`, then `info`.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs a global fmt subscriber writing to stderr.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .try_init();
}
