//! # portvisor
//!
//! **Portvisor** is a socket-activated process supervisor for Rust, in the
//! spirit of `inetd`.
//!
//! For each configured TCP port it accepts connections, spawns a fresh worker
//! process per connection and bridges the connection's bytes to the worker's
//! standard input, output and error. Services can be stopped, restarted and
//! shut down with an escalating hangup → terminate → force-kill protocol.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌───────────────────┐   ┌───────────────────┐
//!     │ ServiceDescriptor │   │ ServiceDescriptor │   (Loader: JSON files)
//!     └─────────┬─────────┘   └─────────┬─────────┘
//!               ▼                       ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor (runtime orchestrator)                                │
//! │  - Bus (broadcast events)                                         │
//! │  - SubscriberSet (fans out to user subscribers)                   │
//! │  - Registry (services by name and by port)                        │
//! └──────┬──────────────────────────────────┬─────────────────────────┘
//!        ▼                                  ▼
//!   ┌──────────────┐                  ┌──────────────┐
//!   │   Service    │   ...            │   Service    │   one per port
//!   │ (accept loop)│                  │ (accept loop)│
//!   └──────┬───────┘                  └──────────────┘
//!          │ one per accepted connection
//!          ▼
//!   ┌──────────────────┐   stdin/stdout/stderr   ┌──────────┐
//!   │ ConnectionBridge │ ◄─────────────────────► │  Worker  │ (child process)
//!   └──────────────────┘                         └──────────┘
//!
//! Every component publishes Events ──► Bus ──► SubscriberSet ──► LogWriter, ...
//! ```
//!
//! ### Service lifecycle
//! ```text
//! Inactive ──start()──► Active ──stop()──► Draining ──last worker exits──► Stopped
//!                         ▲                    │                              │
//!                         └────── start() ─────┴────────── start() ───────────┘
//!
//! kill() (any state):
//!   SIGHUP all ──500ms──► empty? done : SIGTERM all ──1000ms──► empty? done : SIGKILL all, done
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                         |
//! |-------------------|--------------------------------------------------------------|--------------------------------------------|
//! | **Supervision**   | Register descriptors, run until a signal, drain everything.  | [`Supervisor`], [`Registry`]               |
//! | **Services**      | Per-port accept loop, connection cap, escalating kill.       | [`Service`], [`KillHandle`]                |
//! | **Configuration** | Runtime settings and JSON descriptor loading.                | [`SupervisorConfig`], [`Loader`]           |
//! | **Subscriber API**| Hook into service and worker events.                         | [`Subscribe`], [`LogWriter`]               |
//! | **Errors**        | Typed errors with stable labels.                             | [`ConfigError`], [`ServiceError`], [`RuntimeError`] |
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use portvisor::{LogWriter, Subscribe, SupervisorBuilder, SupervisorConfig, load_paths};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let descriptors = load_paths(&["/etc/portvisor"])?;
//!
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter)];
//!     let sup = SupervisorBuilder::new(SupervisorConfig::default())
//!         .with_subscribers(subs)
//!         .build();
//!
//!     let report = sup.run(descriptors).await?;
//!     println!("served {} services", report.started.len());
//!     Ok(())
//! }
//! ```

mod core;
mod descriptor;
mod error;
mod events;
mod service;
mod subscribers;

// ---- Public re-exports ----

pub use self::core::{
    EscalationPolicy, LoadReport, Registration, Registry, ReplacePolicy, Supervisor,
    SupervisorBuilder, SupervisorConfig,
};
pub use descriptor::{Action, Loader, ServiceDescriptor, load_paths};
pub use error::{ConfigError, RegistryError, RuntimeError, ServiceError};
pub use events::{Bus, Event, EventKind};
pub use service::{
    KillHandle, KillOutcome, OsSignals, Service, ServiceState, Signal, SignalDelivery, SignalSink,
    Worker, WorkerId, WorkerSet, WorkerState,
};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
