//! Why a worker process terminated.

use std::fmt;
use std::process::ExitStatus;

use nix::sys::signal::Signal;

/// Termination reason of a worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Normal exit with status code.
    Exited(i32),
    /// Killed by signal.
    Signaled(Signal),
    /// Stack overflow or wild pointer (SIGSEGV / SIGBUS).
    Crashed(Signal),
    /// Waiting on the process failed; the outcome is unknown.
    Unknown,
}

impl TerminationReason {
    /// Classifies an exit status reported by the OS.
    #[cfg(unix)]
    pub fn from_status(status: ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;

        if let Some(code) = status.code() {
            return Self::Exited(code);
        }
        match status.signal().map(Signal::try_from) {
            Some(Ok(sig @ (Signal::SIGSEGV | Signal::SIGBUS))) => Self::Crashed(sig),
            Some(Ok(sig)) => Self::Signaled(sig),
            _ => Self::Unknown,
        }
    }

    /// Classifies an exit status reported by the OS.
    #[cfg(not(unix))]
    pub fn from_status(status: ExitStatus) -> Self {
        status.code().map_or(Self::Unknown, Self::Exited)
    }

    /// True for a zero exit code.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }

    /// True when the process was ended by SIGKILL.
    pub fn is_killed(&self) -> bool {
        matches!(self, Self::Signaled(Signal::SIGKILL))
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with code {code}"),
            Self::Signaled(sig) => write!(f, "killed by signal {}", sig.as_str()),
            Self::Crashed(sig) => write!(f, "crashed ({})", sig.as_str()),
            Self::Unknown => f.write_str("unknown reason"),
        }
    }
}
