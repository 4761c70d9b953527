//! # Service: one listening port, its accept loop and its live workers.
//!
//! ## State machine
//! ```text
//!            start()                stop()                 last worker exits
//! Inactive ──────────► Active ──────────────► Draining ──────────────────────► Stopped
//!    ▲                   ▲                       │                               │
//!    │ bind failure      └─────── start() ───────┴──────────── start() ──────────┘
//!    └──────────── (state unchanged)
//! ```
//!
//! ## Accept loop
//! ```text
//! loop {
//!   ├─► acquire connection permit   (cap = descriptor limit; waits, cancellable)
//!   ├─► accept()                     (cancellable)
//!   └─► spawn ConnectionBridge(stream, permit)
//! }
//! ```
//! The permit is acquired **before** `accept()`: connections beyond the cap
//! stay queued in the OS backlog and never spawn a worker until a running
//! bridge finishes.
//!
//! ## Rules
//! - `start()` on an Active service is a no-op (no second socket, no event).
//! - `stop()` joins the accept loop before returning: the socket is closed
//!   once the state leaves Active, so `restart()` never double-binds.
//! - `stop()` never touches running bridges or workers.
//! - `kill()` is independent of `stop()` and may run in any state.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio::{select, time};
use tokio_util::sync::CancellationToken;

use crate::core::{EscalationPolicy, SupervisorConfig};
use crate::descriptor::ServiceDescriptor;
use crate::error::{ConfigError, ServiceError};
use crate::events::{Bus, Event, EventKind};

use super::bridge::ConnectionBridge;
use super::escalation::{Escalation, KillHandle};
use super::signal::{Signal, SignalSink};
use super::worker::{Worker, WorkerId, WorkerSet};

/// Pause after a failed `accept()` (e.g. descriptor exhaustion) before retrying.
const ACCEPT_ERROR_PAUSE: Duration = Duration::from_millis(100);

/// Lifecycle state of a [`Service`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Never started, or the last start failed.
    Inactive,
    /// Listening and accepting connections.
    Active,
    /// Listening socket closed; workers from earlier connections still live.
    Draining,
    /// Listening socket closed and no live workers.
    Stopped,
}

/// Accept loop owning the listening socket.
struct Listener {
    token: CancellationToken,
    join: JoinHandle<()>,
    local_addr: SocketAddr,
}

struct Lifecycle {
    state: ServiceState,
    listener: Option<Listener>,
}

/// Supervisor of one TCP port.
pub struct Service {
    name: Arc<str>,
    port: u16,
    descriptor: Arc<ServiceDescriptor>,
    bind_addr: IpAddr,
    escalation: EscalationPolicy,
    hangup_delay: Duration,
    permits: Arc<Semaphore>,
    limit: usize,
    workers: Arc<WorkerSet>,
    signals: Arc<dyn SignalSink>,
    bus: Bus,
    lifecycle: Mutex<Lifecycle>,
}

impl Service {
    /// Creates an Inactive service from an `exec` descriptor.
    ///
    /// Fails if the descriptor has no port or no command.
    pub fn new(
        descriptor: ServiceDescriptor,
        cfg: &SupervisorConfig,
        bus: Bus,
        signals: Arc<dyn SignalSink>,
    ) -> Result<Arc<Self>, ConfigError> {
        let port = descriptor.exec_port()?;
        let limit = cfg.limit_for(descriptor.limit);
        Ok(Arc::new(Self {
            name: Arc::from(descriptor.name.as_str()),
            port,
            descriptor: Arc::new(descriptor),
            bind_addr: cfg.bind_addr,
            escalation: cfg.escalation,
            hangup_delay: cfg.hangup_delay,
            permits: Arc::new(Semaphore::new(limit)),
            limit,
            workers: Arc::new(WorkerSet::new()),
            signals,
            bus,
            lifecycle: Mutex::new(Lifecycle {
                state: ServiceState::Inactive,
                listener: None,
            }),
        }))
    }

    /// Service name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Port from the descriptor (`0` means an ephemeral port is picked on bind).
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The descriptor this service was built from.
    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    /// Maximum number of concurrent connections.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ServiceState {
        self.lifecycle.lock().await.state
    }

    /// Address of the listening socket while Active.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.lifecycle
            .lock()
            .await
            .listener
            .as_ref()
            .map(|l| l.local_addr)
    }

    /// Number of live workers.
    pub async fn live_workers(&self) -> usize {
        self.workers.len().await
    }

    /// Copies of the live worker records.
    pub async fn workers(&self) -> Vec<Worker> {
        self.workers.snapshot().await
    }

    /// Binds the port and starts accepting connections.
    ///
    /// No-op if already Active.
    pub async fn start(self: &Arc<Self>) -> Result<(), ServiceError> {
        let mut lc = self.lifecycle.lock().await;
        if lc.state == ServiceState::Active {
            return Ok(());
        }

        let addr = SocketAddr::new(self.bind_addr, self.port);
        let bound = match TcpListener::bind(addr).await {
            Ok(listener) => listener.local_addr().map(|a| (listener, a)),
            Err(e) => Err(e),
        };
        let (listener, local_addr) = match bound {
            Ok(b) => b,
            Err(source) => {
                self.bus.publish(
                    Event::new(EventKind::ServiceBindFailed)
                        .with_service(Arc::clone(&self.name))
                        .with_port(self.port)
                        .with_reason(source.to_string()),
                );
                return Err(ServiceError::Bind {
                    service: self.name.to_string(),
                    port: self.port,
                    source,
                });
            }
        };

        let token = CancellationToken::new();
        let join = tokio::spawn(Arc::clone(self).accept_loop(listener, token.clone()));
        lc.listener = Some(Listener {
            token,
            join,
            local_addr,
        });
        lc.state = ServiceState::Active;
        drop(lc);

        self.bus.publish(
            Event::new(EventKind::ServiceStarted)
                .with_service(Arc::clone(&self.name))
                .with_port(local_addr.port()),
        );
        Ok(())
    }

    /// Closes the listening socket; running workers are left alone.
    ///
    /// Returns `false` (and does nothing) if the service was not Active.
    pub async fn stop(&self) -> bool {
        let mut lc = self.lifecycle.lock().await;
        if lc.state != ServiceState::Active {
            return false;
        }
        let Some(listener) = lc.listener.take() else {
            return false;
        };
        listener.token.cancel();
        let _ = listener.join.await;
        lc.state = ServiceState::Draining;

        self.bus.publish(
            Event::new(EventKind::ServiceStopped)
                .with_service(Arc::clone(&self.name))
                .with_port(listener.local_addr.port()),
        );
        if self.workers.is_empty().await {
            self.mark_drained(&mut lc);
        }
        true
    }

    /// Stops, then starts again once the listening socket is closed.
    pub async fn restart(self: &Arc<Self>) -> Result<(), ServiceError> {
        self.stop().await;
        self.start().await?;

        let port = self.local_addr().await.map_or(self.port, |a| a.port());
        self.bus.publish(
            Event::new(EventKind::ServiceRestarted)
                .with_service(Arc::clone(&self.name))
                .with_port(port),
        );
        Ok(())
    }

    /// Starts the hangup → terminate → force-kill escalation for all live workers.
    ///
    /// The returned handle resolves exactly once, when the escalation ends.
    pub fn kill(&self) -> KillHandle {
        Escalation {
            service: Arc::clone(&self.name),
            workers: Arc::clone(&self.workers),
            signals: Arc::clone(&self.signals),
            policy: self.escalation,
            bus: self.bus.clone(),
        }
        .spawn()
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener, token: CancellationToken) {
        loop {
            let permit = select! {
                biased;
                _ = token.cancelled() => break,
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_closed) => break,
                },
            };

            let accepted = select! {
                biased;
                _ = token.cancelled() => break,
                res = listener.accept() => res,
            };

            match accepted {
                Ok((stream, peer)) => {
                    let bridge = ConnectionBridge::new(Arc::clone(&self), peer);
                    tokio::spawn(bridge.run(stream, permit));
                }
                Err(e) => {
                    drop(permit);
                    self.bus.publish(
                        Event::new(EventKind::AcceptFailed)
                            .with_service(Arc::clone(&self.name))
                            .with_reason(e.to_string()),
                    );
                    select! {
                        _ = token.cancelled() => break,
                        _ = time::sleep(ACCEPT_ERROR_PAUSE) => {}
                    }
                }
            }
        }
    }

    // ---------------------------
    // Bridge callbacks
    // ---------------------------

    pub(crate) fn bus(&self) -> &Bus {
        &self.bus
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    pub(crate) fn hangup_delay(&self) -> Duration {
        self.hangup_delay
    }

    pub(crate) async fn worker_spawned(&self, pid: u32, peer: SocketAddr) -> WorkerId {
        let id = self.workers.insert(pid, Some(peer)).await;
        self.bus.publish(
            Event::new(EventKind::WorkerSpawned)
                .with_service(Arc::clone(&self.name))
                .with_pid(pid)
                .with_peer(peer),
        );

        // A bridge accepted just before stop() may register after the drain
        // check already saw an empty set.
        let mut lc = self.lifecycle.lock().await;
        if lc.state == ServiceState::Stopped {
            lc.state = ServiceState::Draining;
        }
        id
    }

    /// Removes the worker from the live set; completes a pending drain.
    pub(crate) async fn worker_exited(&self, id: WorkerId, event: Event) {
        let Some(worker) = self.workers.remove(id).await else {
            return;
        };
        self.bus.publish(event.with_lifetime(worker.spawned_at().elapsed()));

        let mut lc = self.lifecycle.lock().await;
        if lc.state == ServiceState::Draining && self.workers.is_empty().await {
            self.mark_drained(&mut lc);
        }
    }

    /// Sends one signal to one worker if it is still live.
    pub(crate) async fn signal_worker(&self, id: WorkerId, signal: Signal) {
        let Some(d) = self
            .workers
            .signal_one(id, self.signals.as_ref(), signal)
            .await
        else {
            return;
        };
        let ev = Event::new(EventKind::WorkerSignaled)
            .with_service(Arc::clone(&self.name))
            .with_pid(d.pid)
            .with_signal(d.signal);
        match d.result {
            Ok(()) => self.bus.publish(ev),
            Err(e) => {
                let mut ev = ev.with_reason(e.to_string());
                ev.kind = EventKind::WorkerSignalFailed;
                self.bus.publish(ev);
            }
        }
    }

    fn mark_drained(&self, lc: &mut Lifecycle) {
        lc.state = ServiceState::Stopped;
        self.bus.publish(
            Event::new(EventKind::ServiceDrained).with_service(Arc::clone(&self.name)),
        );
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name)
            .field("port", &self.port)
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddr};

    use super::*;
    use crate::service::OsSignals;

    #[tokio::test]
    async fn late_worker_reopens_drain() {
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let svc = Service::new(
            ServiceDescriptor::exec("late", 0, "/bin/cat"),
            &SupervisorConfig::default(),
            bus,
            Arc::new(OsSignals),
        )
        .unwrap();
        // Stopped with an empty set, as left by stop() racing a fresh accept.
        svc.lifecycle.lock().await.state = ServiceState::Stopped;

        let peer = SocketAddr::from((Ipv4Addr::LOCALHOST, 40000));
        let id = svc.worker_spawned(4242, peer).await;
        assert_eq!(svc.state().await, ServiceState::Draining);

        svc.worker_exited(id, Event::new(EventKind::WorkerExited).with_pid(4242))
            .await;
        assert_eq!(svc.state().await, ServiceState::Stopped);

        let kinds: Vec<EventKind> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|ev| ev.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![EventKind::WorkerSpawned, EventKind::WorkerExited, EventKind::ServiceDrained]
        );
    }
}
