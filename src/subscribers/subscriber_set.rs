//! # Non-blocking event fan-out to multiple subscribers.
//!
//! ```text
//! emit(event)
//!     │
//!     ├──► [queue 1] ──► worker 1 ──► subscriber1.on_event()
//!     │    (bounded)         └──────► panic → SubscriberPanicked
//!     └──► [queue N] ──► worker N ──► subscriberN.on_event()
//! ```
//!
//! ## Rules
//! - **No cross-subscriber ordering**
//! - **Overflow**: event dropped for that subscriber only, `SubscriberOverflow` published
//! - **Non-blocking**: `emit()` returns immediately (uses `try_send`)
//! - **Per-subscriber FIFO**

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::events::{Bus, Event, EventKind};
use crate::subscribers::Subscribe;

/// One subscriber's queue and the task draining it.
struct Lane {
    name: &'static str,
    queue: mpsc::Sender<Arc<Event>>,
    task: JoinHandle<()>,
}

/// Fan-out of bus events to the configured subscribers.
pub struct SubscriberSet {
    lanes: Vec<Lane>,
    bus: Bus,
}

impl SubscriberSet {
    /// Spawns one draining task per subscriber. Needs a tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let lanes = subs
            .into_iter()
            .map(|sub| {
                let (queue, rx) = mpsc::channel(sub.queue_capacity().max(1));
                Lane {
                    name: sub.name(),
                    queue,
                    task: tokio::spawn(deliver(sub, rx, bus.clone())),
                }
            })
            .collect();
        Self { lanes, bus }
    }

    /// Queues `event` for every subscriber without waiting.
    ///
    /// A full or closed queue drops the event for that subscriber and
    /// publishes `SubscriberOverflow`, except for overflow events themselves.
    pub fn emit(&self, event: &Event) {
        let shared = Arc::new(event.clone());
        for lane in &self.lanes {
            let reason = match lane.queue.try_send(Arc::clone(&shared)) {
                Ok(()) => continue,
                Err(TrySendError::Full(_)) => "full",
                Err(TrySendError::Closed(_)) => "closed",
            };
            if event.kind != EventKind::SubscriberOverflow {
                self.bus.publish(Event::subscriber_overflow(lane.name, reason));
            }
        }
    }

    /// Closes every queue and waits for the subscribers to finish what was queued.
    pub async fn shutdown(self) {
        let tasks: Vec<JoinHandle<()>> = self.lanes.into_iter().map(|lane| lane.task).collect();
        for task in tasks {
            let _ = task.await;
        }
    }
}

/// Feeds queued events to `sub` one at a time; a panic is reported and the
/// next event is still delivered.
async fn deliver(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>, bus: Bus) {
    while let Some(ev) = rx.recv().await {
        if let Err(payload) = AssertUnwindSafe(sub.on_event(&ev)).catch_unwind().await {
            bus.publish(Event::subscriber_panicked(sub.name(), panic_message(&*payload)));
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
