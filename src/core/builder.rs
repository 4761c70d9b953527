use std::sync::Arc;

use crate::{
    core::SupervisorConfig,
    events::Bus,
    service::{OsSignals, SignalSink},
    subscribers::Subscribe,
};
use super::{registry::Registry, supervisor::Supervisor};

/// Builder for constructing a Supervisor with optional features.
pub struct SupervisorBuilder {
    cfg: SupervisorConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    signals: Arc<dyn SignalSink>,
}

impl SupervisorBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: SupervisorConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            signals: Arc::new(OsSignals),
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (service lifecycle, workers, signals)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Replaces the signal delivery used by every service ([`OsSignals`] by default).
    pub fn with_signal_sink(mut self, signals: Arc<dyn SignalSink>) -> Self {
        self.signals = signals;
        self
    }

    /// Builds and returns the Supervisor instance.
    ///
    /// This consumes the builder and initializes the runtime components:
    /// - Event bus for broadcasting
    /// - Registry for service lifecycle management
    ///
    /// Subscriber workers start when [`Supervisor::run`] is called.
    pub fn build(self) -> Arc<Supervisor> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let registry = Registry::new(self.cfg.clone(), bus.clone(), self.signals);

        Arc::new(Supervisor::new_internal(
            self.cfg,
            bus,
            self.subscribers,
            registry,
        ))
    }
}
