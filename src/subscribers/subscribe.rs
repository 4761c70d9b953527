//! # Event subscriber trait.
//!
//! Provides [`Subscribe`], the extension point for plugging custom event
//! handlers into the runtime.
//!
//! Each subscriber gets:
//! - **Dedicated worker task** (runs independently)
//! - **Per-subscriber bounded queue** (capacity via [`Subscribe::queue_capacity`])
//! - **Panic isolation** (panics are caught and reported as `EventKind::SubscriberPanicked`)
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use portvisor::{Event, EventKind, Subscribe};
//!
//! struct ExitCounter;
//!
//! #[async_trait]
//! impl Subscribe for ExitCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::WorkerExited {
//!             // count it
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "exit-counter" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Contract for event subscribers.
///
/// Called from a subscriber-dedicated worker task. Implementations should avoid
/// blocking the async runtime.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handle a single event.
    async fn on_event(&self, event: &Event);

    /// Human-readable name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred capacity of this subscriber's queue.
    ///
    /// On overflow, events for this subscriber are **dropped**.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
