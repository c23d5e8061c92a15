//! Worker process primitives.
//!
//! - [`Launcher`] / [`ProcessLink`] the seam between the coordinator and the OS
//! - [`CommandLauncher`] production launcher (`tokio::process`, piped stdio)
//! - [`TerminationReason`] classified exit status

mod command;
mod launcher;
mod reason;

pub use command::CommandLauncher;
pub use launcher::{LaunchRequest, Launcher, ProcessEvent, ProcessLink, Spawned};
pub use reason::TerminationReason;
