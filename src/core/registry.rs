//! # Registry: name- and port-indexed table of services.
//!
//! Consumes descriptors, builds [`Service`]s, starts them and keeps them in two
//! tables that always agree:
//!
//! ```text
//! register(descriptor)
//!   ├─ action = redirect  → DescriptorReserved           → Registration::Reserved
//!   ├─ action = other     → UnknownAction (warning)      → Registration::Skipped
//!   └─ action = exec
//!        ├─ Service::new (port + command required)
//!        ├─ start()       (Retire: colliding holders of the port are stopped
//!        │                 first and restarted if the bind fails; tables unchanged)
//!        ├─ insert into by_name + by_port, dropping collisions
//!        └─ Retire: stop + kill the dropped services (awaited) → Registration::Started
//!           Overwrite: dropped services keep running
//! ```
//!
//! ## Rules
//! - Every insertion and removal updates both tables under one write lock.
//! - Registrations are serialized; lookups never wait for a registration to
//!   finish starting its service.
//! - The port key is the bound port (an ephemeral port for descriptors with
//!   port `0`).

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{Mutex, RwLock};

use crate::core::{ReplacePolicy, SupervisorConfig};
use crate::descriptor::{Action, ServiceDescriptor};
use crate::error::{ConfigError, RegistryError, ServiceError};
use crate::events::{Bus, Event, EventKind};
use crate::service::{KillOutcome, Service, SignalSink};

/// Result of registering one descriptor.
#[derive(Debug)]
pub enum Registration {
    /// An `exec` service was started and inserted.
    Started(Arc<Service>),
    /// A `redirect` descriptor was accepted; nothing runs.
    Reserved,
    /// The action is unknown; the descriptor was skipped.
    Skipped,
}

/// Outcome of [`Registry::load`].
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Names of services started, in load order.
    pub started: Vec<String>,
    /// Names of `redirect` descriptors.
    pub reserved: Vec<String>,
    /// Names of descriptors with an unknown action.
    pub skipped: Vec<String>,
    /// Service-scoped failures (e.g. bind errors); those services are not registered.
    pub failed: Vec<RegistryError>,
}

impl LoadReport {
    /// True if every `exec` descriptor was started.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Default)]
struct Tables {
    by_name: HashMap<String, Arc<Service>>,
    by_port: HashMap<u16, Arc<Service>>,
}

impl Tables {
    /// Distinct services registered under `name` or `port`.
    fn colliding(&self, name: &str, port: u16) -> Vec<Arc<Service>> {
        let mut out: Vec<Arc<Service>> = Vec::new();
        let by_port = (port != 0).then(|| self.by_port.get(&port)).flatten();
        for svc in self.by_name.get(name).into_iter().chain(by_port) {
            if !out.iter().any(|s| Arc::ptr_eq(s, svc)) {
                out.push(Arc::clone(svc));
            }
        }
        out
    }

    /// Removes every entry pointing at `svc`.
    fn remove(&mut self, svc: &Arc<Service>) {
        self.by_name.retain(|_, s| !Arc::ptr_eq(s, svc));
        self.by_port.retain(|_, s| !Arc::ptr_eq(s, svc));
    }

    /// Inserts `svc` under both keys; returns the distinct services it displaced.
    fn insert(&mut self, svc: &Arc<Service>, port: u16) -> Vec<Arc<Service>> {
        let mut displaced: Vec<Arc<Service>> = Vec::new();
        let old_name = self.by_name.insert(svc.name().to_string(), Arc::clone(svc));
        let old_port = self.by_port.insert(port, Arc::clone(svc));
        for old in old_name.into_iter().chain(old_port) {
            if !Arc::ptr_eq(&old, svc) && !displaced.iter().any(|s| Arc::ptr_eq(s, &old)) {
                displaced.push(old);
            }
        }
        for old in &displaced {
            self.by_name.retain(|_, s| !Arc::ptr_eq(s, old));
            self.by_port.retain(|_, s| !Arc::ptr_eq(s, old));
        }
        displaced
    }

    fn drain(&mut self) -> Vec<Arc<Service>> {
        let services: Vec<Arc<Service>> = self.by_name.drain().map(|(_, s)| s).collect();
        self.by_port.clear();
        services
    }
}

/// Name- and port-indexed table of running services.
pub struct Registry {
    tables: RwLock<Tables>,
    register_lock: Mutex<()>,
    cfg: SupervisorConfig,
    bus: Bus,
    signals: Arc<dyn SignalSink>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new(cfg: SupervisorConfig, bus: Bus, signals: Arc<dyn SignalSink>) -> Arc<Self> {
        Arc::new(Self {
            tables: RwLock::new(Tables::default()),
            register_lock: Mutex::new(()),
            cfg,
            bus,
            signals,
        })
    }

    /// Validates every descriptor, then registers them in order.
    ///
    /// Any `exec` descriptor without a port or command rejects the whole list
    /// before a single service is created. Bind failures only affect their own
    /// service and are listed in the report.
    pub async fn load(&self, descriptors: Vec<ServiceDescriptor>) -> Result<LoadReport, ConfigError> {
        for desc in &descriptors {
            if desc.action == Action::Exec {
                desc.exec_port()?;
            }
        }

        let mut report = LoadReport::default();
        for desc in descriptors {
            let name = desc.name.clone();
            match self.register(desc).await {
                Ok(Registration::Started(_)) => report.started.push(name),
                Ok(Registration::Reserved) => report.reserved.push(name),
                Ok(Registration::Skipped) => report.skipped.push(name),
                Err(e) => report.failed.push(e),
            }
        }
        Ok(report)
    }

    /// Registers one descriptor with the configured [`ReplacePolicy`].
    pub async fn register(&self, descriptor: ServiceDescriptor) -> Result<Registration, RegistryError> {
        self.replace(descriptor, self.cfg.replace).await
    }

    /// Registers one descriptor with an explicit [`ReplacePolicy`].
    pub async fn replace(
        &self,
        descriptor: ServiceDescriptor,
        policy: ReplacePolicy,
    ) -> Result<Registration, RegistryError> {
        match &descriptor.action {
            Action::Exec => {}
            Action::Redirect => {
                self.bus.publish(
                    Event::new(EventKind::DescriptorReserved).with_service(descriptor.name.as_str()),
                );
                return Ok(Registration::Reserved);
            }
            Action::Unknown(raw) => {
                self.bus.publish(
                    Event::new(EventKind::UnknownAction)
                        .with_service(descriptor.name.as_str())
                        .with_reason(raw.as_str()),
                );
                return Ok(Registration::Skipped);
            }
        }

        let _serial = self.register_lock.lock().await;
        let svc = Service::new(descriptor, &self.cfg, self.bus.clone(), Arc::clone(&self.signals))?;

        let colliding = match policy {
            ReplacePolicy::Retire => self.tables.read().await.colliding(svc.name(), svc.port()),
            ReplacePolicy::Overwrite => Vec::new(),
        };
        self.start_replacing(&svc, &colliding).await?;
        let port = svc.local_addr().await.map_or(svc.port(), |a| a.port());

        let displaced = {
            let mut tables = self.tables.write().await;
            for old in &colliding {
                tables.remove(old);
            }
            tables.insert(&svc, port)
        };
        for old in displaced {
            self.publish_replaced(&old, "overwritten");
        }
        self.retire(colliding).await;
        Ok(Registration::Started(svc))
    }

    /// Service registered under `id`: a name first, then a port number.
    pub async fn get(&self, id: &str) -> Option<Arc<Service>> {
        if let Some(svc) = self.get_by_name(id).await {
            return Some(svc);
        }
        let port = id.parse::<u16>().ok()?;
        self.get_by_port(port).await
    }

    /// Service registered under `name`.
    pub async fn get_by_name(&self, name: &str) -> Option<Arc<Service>> {
        self.tables.read().await.by_name.get(name).cloned()
    }

    /// Service listening on `port`.
    pub async fn get_by_port(&self, port: u16) -> Option<Arc<Service>> {
        self.tables.read().await.by_port.get(&port).cloned()
    }

    /// Sorted list of registered service names.
    pub async fn names(&self) -> Vec<String> {
        let tables = self.tables.read().await;
        let mut names: Vec<String> = tables.by_name.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Number of registered services.
    pub async fn len(&self) -> usize {
        self.tables.read().await.by_name.len()
    }

    /// True if no service is registered.
    pub async fn is_empty(&self) -> bool {
        self.tables.read().await.by_name.is_empty()
    }

    /// Removes every service, stops them, and awaits all kill escalations.
    ///
    /// Returns each service name with the stage that ended its escalation.
    pub async fn shutdown(&self) -> Vec<(String, Result<KillOutcome, ServiceError>)> {
        let _serial = self.register_lock.lock().await;
        let services = self.tables.write().await.drain();

        for svc in &services {
            svc.stop().await;
        }
        let outcomes = join_all(services.iter().map(|svc| svc.kill())).await;
        services
            .iter()
            .map(|svc| svc.name().to_string())
            .zip(outcomes)
            .collect()
    }

    /// Starts `svc` while `colliding` services are still registered.
    ///
    /// Colliding services listening on the new port are stopped first so the
    /// port is free; if the bind still fails they are started again and the
    /// error is returned with the tables untouched.
    async fn start_replacing(
        &self,
        svc: &Arc<Service>,
        colliding: &[Arc<Service>],
    ) -> Result<(), ServiceError> {
        let mut holders = Vec::new();
        if svc.port() != 0 {
            for old in colliding {
                if old.local_addr().await.map(|a| a.port()) == Some(svc.port()) {
                    old.stop().await;
                    holders.push(old);
                }
            }
        }

        let Err(e) = svc.start().await else {
            return Ok(());
        };
        for old in holders {
            // Failures are published as ServiceBindFailed; the entry stays.
            let _ = old.start().await;
        }
        Err(e)
    }

    /// Stops and kills services already taken out of the tables.
    async fn retire(&self, retired: Vec<Arc<Service>>) {
        for old in retired {
            old.stop().await;
            if let Err(e) = old.kill().await {
                self.bus.publish(
                    Event::new(EventKind::ServiceKilled)
                        .with_service(old.name())
                        .with_reason(e.as_label()),
                );
            }
            self.publish_replaced(&old, "retired");
        }
    }

    fn publish_replaced(&self, old: &Service, how: &'static str) {
        self.bus.publish(
            Event::new(EventKind::ServiceReplaced)
                .with_service(old.name())
                .with_port(old.port())
                .with_reason(how),
        );
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("cfg", &self.cfg)
            .finish_non_exhaustive()
    }
}
