//! Runtime events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Supervisor`, `Registry`, `Service`, `ConnectionBridge`,
//!   escalation tasks, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the supervisor listener (fans out to `SubscriberSet`), and
//!   anything holding a receiver from [`Bus::subscribe`].

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
