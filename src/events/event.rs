//! # Runtime events emitted by the supervisor, registry, services and bridges.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Service lifecycle**: start, stop, drain, restart, kill, bind failure
//! - **Worker lifecycle**: spawn, spawn failure, signals, exit
//! - **Registry**: replacement, reserved and unknown actions
//! - **Runtime**: shutdown, subscriber health
//!
//! The [`Event`] struct carries optional metadata (service, port, pid, exit
//! status, signal, reason) set depending on the kind.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use portvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::WorkerSpawned)
//!     .with_service("echo")
//!     .with_pid(4242);
//!
//! assert_eq!(ev.kind, EventKind::WorkerSpawned);
//! assert_eq!(ev.service.as_deref(), Some("echo"));
//! assert_eq!(ev.pid, Some(4242));
//! ```

use std::net::SocketAddr;
use std::process::ExitStatus;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::service::Signal;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `service` (subscriber name), `reason`.
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `service` (subscriber name), `reason`.
    SubscriberOverflow,

    // === Runtime events ===
    /// Shutdown requested (OS signal observed).
    ///
    /// Sets: `reason` (signal name).
    ShutdownRequested,

    /// Every registered service was stopped and killed. Last event of a run.
    ShutdownComplete,

    // === Service lifecycle ===
    /// Listening socket bound; the service accepts connections.
    ///
    /// Sets: `service`, `port` (bound port).
    ServiceStarted,

    /// Listening socket could not be bound.
    ///
    /// Sets: `service`, `port`, `reason`.
    ServiceBindFailed,

    /// Listening socket closed; existing workers keep running.
    ///
    /// Sets: `service`, `port`.
    ServiceStopped,

    /// A stopped service has no live workers left.
    ///
    /// Sets: `service`.
    ServiceDrained,

    /// Service stopped and started again.
    ///
    /// Sets: `service`, `port` (new bound port).
    ServiceRestarted,

    /// Escalation finished.
    ///
    /// Sets: `service`, `reason` (stage that ended it).
    ServiceKilled,

    /// `accept()` failed; the loop continues.
    ///
    /// Sets: `service`, `reason`.
    AcceptFailed,

    // === Worker lifecycle ===
    /// Worker process spawned for an accepted connection.
    ///
    /// Sets: `service`, `pid`, `peer`.
    WorkerSpawned,

    /// Worker process could not be spawned; connection closed.
    ///
    /// Sets: `service`, `peer`, `reason`.
    WorkerSpawnFailed,

    /// Signal delivered to a worker.
    ///
    /// Sets: `service`, `pid`, `signal`.
    WorkerSignaled,

    /// Signal delivery failed (process already gone, permissions).
    ///
    /// Sets: `service`, `pid`, `signal`, `reason`.
    WorkerSignalFailed,

    /// Worker process exited (any status). Informational, never a failure.
    ///
    /// Sets: `service`, `pid`, `lifetime`, `code` and/or `exit_signal`.
    WorkerExited,

    // === Registry ===
    /// A registered service was displaced by a new descriptor.
    ///
    /// Sets: `service`, `port`, `reason` (`retired` or `overwritten`).
    ServiceReplaced,

    /// `redirect` descriptor accepted; no behavior attached yet.
    ///
    /// Sets: `service`.
    DescriptorReserved,

    /// Descriptor with an unrecognized action was skipped.
    ///
    /// Sets: `service`, `reason` (the action value).
    UnknownAction,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Service (or subscriber) name, if applicable.
    pub service: Option<Arc<str>>,
    /// Port, if applicable.
    pub port: Option<u16>,
    /// Worker process id.
    pub pid: Option<u32>,
    /// Remote address of the connection.
    pub peer: Option<SocketAddr>,
    /// Worker exit code.
    pub code: Option<i32>,
    /// Raw signal number that terminated the worker.
    pub exit_signal: Option<i32>,
    /// Time from worker spawn to exit.
    pub lifetime: Option<Duration>,
    /// Signal sent by the supervisor.
    pub signal: Option<Signal>,
    /// Human-readable reason (errors, stage names, action values).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            service: None,
            port: None,
            pid: None,
            peer: None,
            code: None,
            exit_signal: None,
            lifetime: None,
            signal: None,
            reason: None,
        }
    }

    /// Attaches a service name.
    #[inline]
    pub fn with_service(mut self, service: impl Into<Arc<str>>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Attaches a port.
    #[inline]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Attaches a worker process id.
    #[inline]
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Attaches the connection's remote address.
    #[inline]
    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    /// Attaches the signal sent by the supervisor.
    #[inline]
    pub fn with_signal(mut self, signal: Signal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches exit code and terminating signal from a process exit status.
    pub fn with_exit_status(mut self, status: &ExitStatus) -> Self {
        self.code = status.code();
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            self.exit_signal = status.signal();
        }
        self
    }

    /// Attaches how long a worker lived.
    #[inline]
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_service(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_service(subscriber)
            .with_reason(info)
    }
}
