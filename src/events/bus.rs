//! # Broadcast bus for runtime events.
//!
//! Render loops, the registry and the resync executor all publish here; the
//! supervisor's listener is the only long-lived receiver and forwards to the
//! [`SubscriberSet`](crate::SubscriberSet).
//!
//! Publishing never waits. The ring buffer is shared by all receivers, a
//! receiver that falls behind sees `RecvError::Lagged` and loses the oldest
//! events, and nothing is kept for receivers that subscribe later.

use tokio::sync::broadcast;

use super::event::Event;

/// Cloneable handle to the event channel.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    /// Sends to whoever is listening right now.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Receiver for events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
