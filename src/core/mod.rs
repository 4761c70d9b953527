//! Runtime core: configuration, orchestration and lifecycle.
//!
//! The public API from this module is [`Supervisor`] (built with
//! [`SupervisorBuilder`]), the [`Registry`] it drives, and the configuration
//! types.
//!
//! Internal modules:
//! - [`config`]: [`SupervisorConfig`], [`EscalationPolicy`], [`ReplacePolicy`];
//! - [`registry`]: name/port tables, descriptor registration and replacement;
//! - [`supervisor`]: event fan-out, registration, signal-driven shutdown;
//! - [`builder`]: assembles the supervisor;
//! - [`shutdown`]: cross-platform shutdown signal handling.

mod builder;
mod config;
mod registry;
mod shutdown;
mod supervisor;

pub use builder::SupervisorBuilder;
pub use config::{EscalationPolicy, ReplacePolicy, SupervisorConfig};
pub use registry::{LoadReport, Registration, Registry};
pub use supervisor::Supervisor;
