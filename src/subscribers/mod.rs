//! # Event subscribers.
//!
//! Sinks for the structured events published on the [`Bus`](crate::events::Bus).
//!
//! ```text
//! coordinator loop ── publish(Event) ──► Bus ──► listener ──► SubscriberSet
//!                                                                 ├──► LogWriter (tracing)
//!                                                                 └──► custom Subscribe impls
//! ```
//!
//! - [`Subscribe`] the extension trait
//! - [`SubscriberSet`] per-subscriber queues, panic isolation, overflow reports
//! - [`LogWriter`] built-in `tracing` sink

mod log;
mod subscribe;
mod subscriber_set;

pub use log::LogWriter;
pub use subscribe::Subscribe;
pub use subscriber_set::SubscriberSet;
