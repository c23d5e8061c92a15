//! # OS signal handling for the coordinator.
//!
//! [`Signals`] listens for the signals a coordinator reacts to:
//!
//! **Unix platforms:**
//! - `SIGHUP` → [`ControlSignal::Reload`] (graceful restart of every pool)
//! - `SIGINT`, `SIGTERM`, `SIGQUIT` → [`ControlSignal::Terminate`] (dispose every pool, exit)
//!
//! **Other platforms:**
//! - `Ctrl-C` via [`tokio::signal::ctrl_c`] → [`ControlSignal::Terminate`]

/// What a received signal asks the coordinator to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ControlSignal {
    Reload,
    Terminate,
}

/// Installed signal listeners.
#[cfg(unix)]
pub(crate) struct Signals {
    hup: tokio::signal::unix::Signal,
    int: tokio::signal::unix::Signal,
    term: tokio::signal::unix::Signal,
    quit: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    /// Registers all listeners, or fails if any registration fails.
    pub(crate) fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            hup: signal(SignalKind::hangup())?,
            int: signal(SignalKind::interrupt())?,
            term: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
        })
    }

    /// Waits for the next signal.
    pub(crate) async fn recv(&mut self) -> ControlSignal {
        tokio::select! {
            _ = self.hup.recv() => ControlSignal::Reload,
            _ = self.int.recv() => ControlSignal::Terminate,
            _ = self.term.recv() => ControlSignal::Terminate,
            _ = self.quit.recv() => ControlSignal::Terminate,
        }
    }
}

/// Installed signal listeners.
#[cfg(not(unix))]
pub(crate) struct Signals;

#[cfg(not(unix))]
impl Signals {
    pub(crate) fn install() -> std::io::Result<Self> {
        Ok(Self)
    }

    pub(crate) async fn recv(&mut self) -> ControlSignal {
        let _ = tokio::signal::ctrl_c().await;
        ControlSignal::Terminate
    }
}
