//! # Supervisor: owns the bus, the subscribers and the registry; drives shutdown.
//!
//! The [`Supervisor`] is the top of the runtime. It fans events out to the
//! configured subscribers, registers the descriptor list through the
//! [`Registry`], waits for a termination signal and drains every service.
//!
//! ## High-level architecture
//! ```text
//! Inputs to run():
//!   Vec<ServiceDescriptor>  ──►  Supervisor::run(descriptors)
//!
//! Preparation:
//!   - ShutdownSignals::install()        (failure aborts before anything binds)
//!   - subscriber_listener(): Bus.subscribe() ─► SubscriberSet::emit(&Event)
//!
//! Registration:
//!   Registry::load(descriptors)
//!       ├─ validation error → RuntimeError::Config (nothing started)
//!       └─ per descriptor: Service::new → start → tables
//!
//! Event flow:
//!   Service / Bridge / Escalation ── publish(Event) ──► Bus ──► listener ──► SubscriberSet::emit
//!                                                               ┌─────────┬─────────┐
//!                                                               ▼         ▼         ▼
//!                                                          [queue S1] [queue S2] ... [queue SN]
//!
//! Shutdown path:
//!   termination signal
//!       └─► Bus.publish(ShutdownRequested)
//!       └─► Registry::shutdown(): stop every service, kill() all, await completions
//!       └─► Bus.publish(ShutdownComplete)
//!       └─► listener drains the subscriber queues and exits
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use portvisor::{LogWriter, ServiceDescriptor, Subscribe, SupervisorBuilder, SupervisorConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter)];
//!     let sup = SupervisorBuilder::new(SupervisorConfig::default())
//!         .with_subscribers(subs)
//!         .build();
//!
//!     let echo = ServiceDescriptor::exec("echo", 7000, "/bin/cat");
//!     sup.run(vec![echo]).await?;
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::core::{LoadReport, Registry, SupervisorConfig, shutdown::ShutdownSignals};
use crate::descriptor::ServiceDescriptor;
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::subscribers::{Subscribe, SubscriberSet};

/// Coordinates the registry, event delivery (via [`SubscriberSet`]) and shutdown.
pub struct Supervisor {
    cfg: SupervisorConfig,
    bus: Bus,
    registry: Arc<Registry>,
    subscribers: Mutex<Vec<Arc<dyn Subscribe>>>,
}

impl Supervisor {
    pub(crate) fn new_internal(
        cfg: SupervisorConfig,
        bus: Bus,
        subscribers: Vec<Arc<dyn Subscribe>>,
        registry: Arc<Registry>,
    ) -> Self {
        Self {
            cfg,
            bus,
            registry,
            subscribers: Mutex::new(subscribers),
        }
    }

    /// Runtime configuration.
    pub fn config(&self) -> &SupervisorConfig {
        &self.cfg
    }

    /// Event bus shared with every service.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Registry of running services.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Registers `descriptors` and runs until SIGINT/SIGTERM/SIGQUIT, then
    /// stops and kills every service.
    pub async fn run(&self, descriptors: Vec<ServiceDescriptor>) -> Result<LoadReport, RuntimeError> {
        let mut signals = ShutdownSignals::install().map_err(|source| RuntimeError::Signal { source })?;
        self.run_until(descriptors, async move { signals.recv().await })
            .await
    }

    /// Like [`run`](Self::run), but shuts down when `shutdown` completes.
    ///
    /// The value of `shutdown` is recorded as the reason of
    /// [`EventKind::ShutdownRequested`].
    pub async fn run_until<F>(
        &self,
        descriptors: Vec<ServiceDescriptor>,
        shutdown: F,
    ) -> Result<LoadReport, RuntimeError>
    where
        F: Future<Output = &'static str>,
    {
        let listener = self.subscriber_listener();

        let report = match self.registry.load(descriptors).await {
            Ok(report) => report,
            Err(e) => {
                self.finish(listener).await;
                return Err(e.into());
            }
        };

        let reason = shutdown.await;
        self.bus
            .publish(Event::new(EventKind::ShutdownRequested).with_reason(reason));
        self.registry.shutdown().await;
        self.finish(listener).await;
        Ok(report)
    }

    /// Subscribes to the bus and forwards events to the subscriber set until
    /// [`EventKind::ShutdownComplete`], then drains the subscriber queues.
    fn subscriber_listener(&self) -> JoinHandle<()> {
        let subs = std::mem::take(
            &mut *self
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let set = SubscriberSet::new(subs, self.bus.clone());
        let mut rx = self.bus.subscribe();

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => {
                        set.emit(&ev);
                        if ev.kind == EventKind::ShutdownComplete {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
            set.shutdown().await;
        })
    }

    async fn finish(&self, listener: JoinHandle<()>) {
        self.bus.publish(Event::new(EventKind::ShutdownComplete));
        let _ = listener.await;
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use async_trait::async_trait;
    use tokio::sync::oneshot;

    use super::*;
    use crate::core::SupervisorBuilder;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<EventKind>>,
    }

    #[async_trait]
    impl Subscribe for Recorder {
        async fn on_event(&self, ev: &Event) {
            self.seen.lock().unwrap().push(ev.kind);
        }
    }

    fn local_cfg() -> SupervisorConfig {
        SupervisorConfig {
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            ..SupervisorConfig::default()
        }
    }

    #[tokio::test]
    async fn runs_services_until_shutdown_then_drains() {
        let rec = Arc::new(Recorder::default());
        let sup = SupervisorBuilder::new(local_cfg())
            .with_subscribers(vec![rec.clone() as Arc<dyn Subscribe>])
            .build();

        let (tx, rx) = oneshot::channel::<()>();
        let run = {
            let sup = Arc::clone(&sup);
            tokio::spawn(async move {
                sup.run_until(vec![ServiceDescriptor::exec("echo", 0, "/bin/cat")], async move {
                    let _ = rx.await;
                    "test"
                })
                .await
            })
        };

        while sup.registry().get("echo").await.is_none() {
            tokio::task::yield_now().await;
        }
        tx.send(()).unwrap();

        let report = run.await.unwrap().unwrap();
        assert_eq!(report.started, vec!["echo"]);
        assert!(sup.registry().is_empty().await);

        let seen = rec.seen.lock().unwrap().clone();
        let pos = |k: EventKind| seen.iter().position(|s| *s == k).unwrap();
        assert!(pos(EventKind::ServiceStarted) < pos(EventKind::ShutdownRequested));
        assert!(pos(EventKind::ShutdownRequested) < pos(EventKind::ServiceStopped));
        assert!(pos(EventKind::ServiceKilled) < pos(EventKind::ShutdownComplete));
        assert_eq!(seen.last(), Some(&EventKind::ShutdownComplete));
    }

    #[tokio::test]
    async fn invalid_descriptor_aborts_run() {
        let sup = SupervisorBuilder::new(local_cfg()).build();
        let bad = ServiceDescriptor {
            name: "bad".into(),
            command: "/bin/cat".into(),
            ..Default::default()
        };

        let err = sup
            .run_until(vec![bad], std::future::pending())
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "runtime_config_rejected");
    }
}
