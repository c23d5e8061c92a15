//! # Event sinks.
//!
//! Implement [`Subscribe`] to receive worker lifecycle and routing events; the
//! [`SubscriberSet`](crate::SubscriberSet) owns the delivery tasks.
//!
//! A subscriber runs on its own task behind a bounded queue, so a slow sink
//! (file, socket, metrics push) never holds up the coordinator loop or the
//! other sinks. When the queue is full the event is dropped for that sink only
//! and a [`EventKind::SubscriberOverflow`](crate::EventKind::SubscriberOverflow)
//! event reports it.
//!
//! ## Example
//! ```rust
//! use poolvisor::{Event, EventKind, Subscribe};
//!
//! struct CrashCounter(std::sync::atomic::AtomicUsize);
//!
//! #[async_trait::async_trait]
//! impl Subscribe for CrashCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::WorkerExited {
//!             self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
//!         }
//!     }
//!     fn name(&self) -> &'static str { "crash-counter" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Receiver of coordinator events.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    async fn on_event(&self, event: &Event);

    /// Name used in overflow and panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Events buffered for this sink before new ones are dropped.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
