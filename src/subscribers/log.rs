//! # Structured logging subscriber.
//!
//! [`LogWriter`] renders every runtime event as a `tracing` record with
//! `component`/`event` fields, so output format and filtering are decided by
//! whatever `tracing` subscriber the binary installs.
//!
//! ## Levels
//! - `info`: service and worker lifecycle
//! - `warn`: bind/spawn/accept failures, unknown actions, subscriber trouble
//! - `debug`: individual signal deliveries

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Subscriber that forwards events to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogWriter;

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let service = e.service.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::ServiceStarted => {
                info!(component = "service", event = "started", service, port = e.port, "started service");
            }
            EventKind::ServiceBindFailed => {
                warn!(
                    component = "service",
                    event = "bind_failed",
                    service,
                    port = e.port,
                    reason = e.reason.as_deref(),
                    "failed to bind service port"
                );
            }
            EventKind::ServiceStopped => {
                info!(component = "service", event = "stopped", service, port = e.port, "stopping service");
            }
            EventKind::ServiceDrained => {
                info!(component = "service", event = "drained", service, "service has no live workers");
            }
            EventKind::ServiceRestarted => {
                info!(component = "service", event = "restarted", service, port = e.port, "restarted service");
            }
            EventKind::ServiceKilled => {
                info!(component = "service", event = "killed", service, stage = e.reason.as_deref(), "workers shut down");
            }
            EventKind::AcceptFailed => {
                warn!(component = "service", event = "accept_failed", service, reason = e.reason.as_deref(), "accept failed");
            }
            EventKind::WorkerSpawned => {
                info!(
                    component = "worker",
                    event = "spawned",
                    service,
                    pid = e.pid,
                    peer = e.peer.map(|p| p.to_string()),
                    "started child"
                );
            }
            EventKind::WorkerSpawnFailed => {
                warn!(
                    component = "worker",
                    event = "spawn_failed",
                    service,
                    peer = e.peer.map(|p| p.to_string()),
                    reason = e.reason.as_deref(),
                    "failed exec on service"
                );
            }
            EventKind::WorkerSignaled => {
                debug!(
                    component = "worker",
                    event = "signaled",
                    service,
                    pid = e.pid,
                    signal = e.signal.map(|s| s.as_str()),
                    "signal sent"
                );
            }
            EventKind::WorkerSignalFailed => {
                debug!(
                    component = "worker",
                    event = "signal_failed",
                    service,
                    pid = e.pid,
                    signal = e.signal.map(|s| s.as_str()),
                    reason = e.reason.as_deref(),
                    "signal delivery failed"
                );
            }
            EventKind::WorkerExited => {
                info!(
                    component = "worker",
                    event = "exited",
                    service,
                    pid = e.pid,
                    code = e.code,
                    signal = e.exit_signal,
                    lifetime_ms = e.lifetime.map(|d| d.as_millis() as u64),
                    "process exited"
                );
            }
            EventKind::ServiceReplaced => {
                info!(
                    component = "registry",
                    event = "replaced",
                    service,
                    port = e.port,
                    mode = e.reason.as_deref(),
                    "service replaced"
                );
            }
            EventKind::DescriptorReserved => {
                info!(component = "registry", event = "reserved", service, "redirect action is not implemented; skipped");
            }
            EventKind::UnknownAction => {
                warn!(
                    component = "registry",
                    event = "unknown_action",
                    service,
                    action = e.reason.as_deref(),
                    "service has unknown action"
                );
            }
            EventKind::ShutdownRequested => {
                info!(component = "supervisor", event = "shutdown_requested", signal = e.reason.as_deref(), "shutting down");
            }
            EventKind::ShutdownComplete => {
                info!(component = "supervisor", event = "shutdown_complete", "all services shut down");
            }
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked => {
                warn!(component = "subscriber", event = "degraded", subscriber = service, reason = e.reason.as_deref(), "subscriber dropped events");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
