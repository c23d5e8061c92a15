//! # Kill signals as carried by `kill`, `kill_pool` and `kill_cluster`.
//!
//! On the wire a signal is a string:
//! - `"dispose"` → [`KillSignal::Dispose`]: forced kill that also shrinks the pool
//! - `"force"` / `"SIGKILL"` → [`KillSignal::Force`]: unconditional kill, worker is respawned
//! - any other Unix signal name (`"SIGTERM"`, `"SIGUSR2"`, ...) → [`KillSignal::Os`]
//!
//! An absent signal means a graceful restart (drain, then replace).

use std::fmt;
use std::str::FromStr;

use nix::sys::signal::Signal;
use serde::{Deserialize, Serialize};

/// Signal attached to a kill request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum KillSignal {
    /// Permanently remove the worker: SIGKILL, no successor, pool size shrinks.
    Dispose,
    /// SIGKILL; the pool respawns the worker.
    Force,
    /// Deliver this signal as-is.
    Os(Signal),
}

impl KillSignal {
    /// OS signal actually delivered to the process.
    pub fn os_signal(&self) -> Signal {
        match self {
            KillSignal::Dispose | KillSignal::Force => Signal::SIGKILL,
            KillSignal::Os(sig) => *sig,
        }
    }

    /// True for signals that terminate the process unconditionally.
    pub fn is_forced(&self) -> bool {
        self.os_signal() == Signal::SIGKILL
    }

    /// Wire name of this signal.
    pub fn as_str(&self) -> &'static str {
        match self {
            KillSignal::Dispose => "dispose",
            KillSignal::Force => "force",
            KillSignal::Os(sig) => sig.as_str(),
        }
    }
}

/// Error returned when a string does not name a known signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSignal(pub String);

impl fmt::Display for UnknownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown signal '{}'", self.0)
    }
}

impl std::error::Error for UnknownSignal {}

impl FromStr for KillSignal {
    type Err = UnknownSignal;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dispose" => Ok(KillSignal::Dispose),
            "force" | "SIGKILL" => Ok(KillSignal::Force),
            other => Signal::from_str(other)
                .map(KillSignal::Os)
                .map_err(|_| UnknownSignal(other.to_string())),
        }
    }
}

impl TryFrom<String> for KillSignal {
    type Error = UnknownSignal;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<KillSignal> for String {
    fn from(value: KillSignal) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for KillSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases() {
        assert_eq!("force".parse::<KillSignal>().unwrap(), KillSignal::Force);
        assert_eq!("SIGKILL".parse::<KillSignal>().unwrap(), KillSignal::Force);
        assert_eq!("dispose".parse::<KillSignal>().unwrap(), KillSignal::Dispose);
        assert_eq!(
            "SIGTERM".parse::<KillSignal>().unwrap(),
            KillSignal::Os(Signal::SIGTERM)
        );
        assert!("SIGNOPE".parse::<KillSignal>().is_err());
    }

    #[test]
    fn dispose_and_force_deliver_sigkill() {
        assert!(KillSignal::Dispose.is_forced());
        assert!(KillSignal::Force.is_forced());
        assert!(!KillSignal::Os(Signal::SIGTERM).is_forced());
        assert_eq!(KillSignal::Os(Signal::SIGHUP).os_signal(), Signal::SIGHUP);
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&KillSignal::Os(Signal::SIGUSR2)).unwrap();
        assert_eq!(json, "\"SIGUSR2\"");
        let back: KillSignal = serde_json::from_str("\"dispose\"").unwrap();
        assert_eq!(back, KillSignal::Dispose);
    }
}
