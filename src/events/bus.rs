//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking event publishing from the coordinator loop.
//!
//! ## Architecture
//! ```text
//! Publishers:                           Subscribers:
//!   coordinator loop ──┐
//!   signal handler   ──┼──► Bus ──► listener ──► SubscriberSet ──► LogWriter, ...
//!   SubscriberSet    ──┘     └────► Supervisor::subscribe() receivers
//! ```
//!
//! Publishing never waits: a full ring buffer overwrites its oldest entry and a
//! receiver that falls behind sees `RecvError::Lagged`. Events published while
//! nobody listens are gone.

use std::sync::Arc;

use tokio::sync::broadcast;

use super::event::Event;

/// Fan-out point for every [`Event`] the coordinator emits. Clones share one channel.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Arc<Event>>,
}

impl Bus {
    /// Bus retaining up to `capacity` undelivered events (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            tx: broadcast::Sender::new(capacity.max(1)),
        }
    }

    /// Hands `ev` to every current receiver.
    pub fn publish(&self, ev: Event) {
        // Err only means nobody is listening.
        let _ = self.tx.send(Arc::new(ev));
    }

    /// Receiver of events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Event>> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn receivers_only_see_later_events() {
        let bus = Bus::new(8);
        bus.publish(Event::new(EventKind::PoolCreated));

        let mut rx = bus.subscribe();
        bus.publish(Event::from("hello"));

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::Log);
        assert_eq!(&*ev.message, "hello");
        assert!(rx.try_recv().is_err());
    }
}
