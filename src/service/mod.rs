//! Services: listening ports, connection bridges, workers and shutdown.
//!
//! - [`Service`]: per-port state machine and accept loop;
//! - `bridge`: relays one connection to one spawned worker;
//! - [`WorkerSet`]: live workers of a service;
//! - `escalation`: hangup → terminate → force-kill protocol behind [`Service::kill`];
//! - [`SignalSink`]: how signals reach processes ([`OsSignals`] in production).

mod bridge;
mod escalation;
#[allow(clippy::module_inception)]
mod service;
mod signal;
mod worker;

pub use escalation::{KillHandle, KillOutcome};
pub use service::{Service, ServiceState};
pub use signal::{OsSignals, Signal, SignalSink};
pub use worker::{SignalDelivery, Worker, WorkerId, WorkerSet, WorkerState};
