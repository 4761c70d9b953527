//! # Event subscribers for the portvisor runtime.
//!
//! ```text
//! Service / Bridge ── publish(Event) ──► Bus ──► supervisor listener
//!                                                     │
//!                                               SubscriberSet::emit
//!                                           ┌─────────┼─────────┐
//!                                           ▼         ▼         ▼
//!                                       LogWriter   Metrics   Custom
//! ```
//!
//! - [`Subscribe`]: the extension trait.
//! - [`SubscriberSet`]: per-subscriber queues and workers.
//! - [`LogWriter`]: renders events through `tracing`.

mod log;
mod subscribe;
mod subscriber_set;

pub use log::LogWriter;
pub use subscribe::Subscribe;
pub use subscriber_set::SubscriberSet;
