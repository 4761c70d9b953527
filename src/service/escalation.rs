//! # Escalating shutdown of a service's workers.
//!
//! ```text
//! kill() ──► spawn escalation task ──► KillHandle (one-shot)
//!
//! t=0            SIGHUP  → every live worker
//! t=hangup       live set empty? ── yes ──► complete(Hangup)
//!                 └─ no → SIGTERM → every live worker
//! t=hangup+term  live set empty? ── yes ──► complete(Terminate)
//!                 └─ no → SIGKILL → every live worker ──► complete(ForceKill)
//! ```
//!
//! ## Rules
//! - Completion fires exactly once per `kill()` call.
//! - The delays always run to their end; a live set that empties early does not
//!   shorten them.
//! - Completion after SIGKILL does not wait for the processes to be reaped.
//! - Dropping the [`KillHandle`] does not cancel the escalation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use tokio::sync::oneshot;
use tokio::time;

use crate::core::EscalationPolicy;
use crate::error::ServiceError;
use crate::events::{Bus, Event, EventKind};

use super::signal::{Signal, SignalSink};
use super::worker::WorkerSet;

/// Stage that ended an escalation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KillOutcome {
    /// Every worker was gone after the hangup grace period.
    Hangup,
    /// Every worker was gone after the terminate grace period.
    Terminate,
    /// Survivors were force-killed; their exit was not awaited.
    ForceKill {
        /// Process ids that received `SIGKILL`.
        pids: Vec<u32>,
    },
}

impl KillOutcome {
    /// Short stable label (for logs).
    pub fn as_label(&self) -> &'static str {
        match self {
            KillOutcome::Hangup => "hangup",
            KillOutcome::Terminate => "terminate",
            KillOutcome::ForceKill { .. } => "force_kill",
        }
    }
}

/// One-shot completion of a `kill()` call.
///
/// Resolves once with the [`KillOutcome`]. Resolves with
/// [`ServiceError::KillAborted`] only if the escalation task was torn down
/// (runtime shutdown) before completing.
#[must_use = "the escalation runs regardless; await the handle to observe completion"]
pub struct KillHandle {
    service: Arc<str>,
    rx: oneshot::Receiver<KillOutcome>,
}

impl Future for KillHandle {
    type Output = Result<KillOutcome, ServiceError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let res = ready!(Pin::new(&mut self.rx).poll(cx));
        Poll::Ready(res.map_err(|_| ServiceError::KillAborted {
            service: self.service.to_string(),
        }))
    }
}

/// Escalation task state for one `kill()` call.
pub(crate) struct Escalation {
    pub(crate) service: Arc<str>,
    pub(crate) workers: Arc<WorkerSet>,
    pub(crate) signals: Arc<dyn SignalSink>,
    pub(crate) policy: EscalationPolicy,
    pub(crate) bus: Bus,
}

impl Escalation {
    /// Starts the escalation in the background and returns its completion handle.
    pub(crate) fn spawn(self) -> KillHandle {
        let (tx, rx) = oneshot::channel();
        let service = Arc::clone(&self.service);

        tokio::spawn(async move {
            let outcome = self.run().await;
            self.bus.publish(
                Event::new(EventKind::ServiceKilled)
                    .with_service(Arc::clone(&self.service))
                    .with_reason(outcome.as_label()),
            );
            let _ = tx.send(outcome);
        });
        KillHandle { service, rx }
    }

    async fn run(&self) -> KillOutcome {
        self.broadcast(Signal::Hangup).await;

        time::sleep(self.policy.hangup_grace).await;
        if self.workers.is_empty().await {
            return KillOutcome::Hangup;
        }
        self.broadcast(Signal::Terminate).await;

        time::sleep(self.policy.terminate_grace).await;
        if self.workers.is_empty().await {
            return KillOutcome::Terminate;
        }
        let pids = self.broadcast(Signal::ForceKill).await;
        KillOutcome::ForceKill { pids }
    }

    /// Signals the whole live set; returns the pids that accepted the signal.
    async fn broadcast(&self, signal: Signal) -> Vec<u32> {
        let deliveries = self
            .workers
            .signal_all(self.signals.as_ref(), signal)
            .await;

        let mut delivered = Vec::with_capacity(deliveries.len());
        for d in deliveries {
            let ev = Event::new(EventKind::WorkerSignaled)
                .with_service(Arc::clone(&self.service))
                .with_pid(d.pid)
                .with_signal(d.signal);
            match d.result {
                Ok(()) => {
                    delivered.push(d.pid);
                    self.bus.publish(ev);
                }
                Err(e) => {
                    let mut ev = ev.with_reason(e.to_string());
                    ev.kind = EventKind::WorkerSignalFailed;
                    self.bus.publish(ev);
                }
            }
        }
        delivered
    }
}
