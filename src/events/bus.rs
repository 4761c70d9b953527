//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking event publishing from many sources (registry, services,
//! connection bridges, escalation tasks).
//!
//! ## Architecture
//! ```text
//! Publishers (many):                   Receivers:
//!   Registry   ──┐
//!   Service    ──┼──► Bus ──┬──► supervisor listener ──► SubscriberSet
//!   Bridge     ──┤          └──► tests / embedders (bus.subscribe())
//!   Escalation ──┘
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks.
//! - **Bounded capacity**: one ring buffer shared by all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are lost if there are no receivers at send time.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events.
///
/// Cheap to clone (internally holds an `Arc`-backed sender).
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

    /// Publishes an event to all active receivers.
    ///
    /// If there are no receivers, the event is dropped.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that will observe subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(1024)
    }
}
