//! # Global runtime configuration.
//!
//! Provides [`SupervisorConfig`], the settings shared by the registry and every
//! service it creates. The value is passed at construction time; there is no
//! process-wide mutable state.
//!
//! ## Sentinel values
//! - descriptor `limit = 0` or absent → [`SupervisorConfig::default_limit`]
//! - `bus_capacity = 0` → clamped to 1
//! - `hangup_delay = 0` → hang up as soon as both directions of a connection drain

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Timings of the hangup → terminate → force-kill escalation.
///
/// ```text
/// t = 0                         SIGHUP  to all live workers
/// t = hangup_grace              SIGTERM to the survivors (or complete)
/// t = hangup + terminate_grace  SIGKILL to the survivors, complete
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EscalationPolicy {
    /// Wait after the hangup signal before checking the live set.
    pub hangup_grace: Duration,
    /// Wait after the terminate signal before force-killing.
    pub terminate_grace: Duration,
}

impl EscalationPolicy {
    /// Upper bound of the escalation (not counting the final signal dispatch).
    #[inline]
    pub fn total(&self) -> Duration {
        self.hangup_grace + self.terminate_grace
    }
}

impl Default for EscalationPolicy {
    /// `hangup_grace = 500ms`, `terminate_grace = 1000ms`.
    fn default() -> Self {
        Self {
            hangup_grace: Duration::from_millis(500),
            terminate_grace: Duration::from_millis(1000),
        }
    }
}

/// What the registry does when a descriptor collides with an already
/// registered service (same name or same port).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReplacePolicy {
    /// Stop and kill every colliding service before starting the new one.
    #[default]
    Retire,
    /// Start the new service and overwrite the table entries; the previous
    /// service keeps running but is no longer reachable through the registry.
    Overwrite,
}

/// Configuration for the supervisor runtime.
///
/// ## Field semantics
/// - `bind_addr`: address every service listens on
/// - `escalation`: timings of [`Service::kill`](crate::Service::kill)
/// - `hangup_delay`: how long a drained connection waits for its worker to
///   exit on its own before the worker gets `SIGHUP`
/// - `default_limit`: connection cap when a descriptor has none
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `replace`: collision handling used by [`Registry::register`](crate::Registry::register)
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// Address services bind to.
    pub bind_addr: IpAddr,

    /// Shutdown escalation timings.
    pub escalation: EscalationPolicy,

    /// Wait between a connection draining in both directions and the hangup
    /// of a worker that has not exited.
    pub hangup_delay: Duration,

    /// Maximum concurrent connections per service when the descriptor sets none.
    pub default_limit: usize,

    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Slow receivers that lag behind more than `bus_capacity` messages skip
    /// older events.
    pub bus_capacity: usize,

    /// Default collision handling for re-registered descriptors.
    pub replace: ReplacePolicy,
}

impl SupervisorConfig {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns the connection cap for a descriptor limit.
    #[inline]
    pub fn limit_for(&self, limit: Option<usize>) -> usize {
        match limit {
            Some(n) if n > 0 => n,
            _ => self.default_limit.max(1),
        }
    }
}

impl Default for SupervisorConfig {
    /// Default configuration:
    ///
    /// - `bind_addr = 0.0.0.0`
    /// - `escalation = 500ms / 1000ms`
    /// - `hangup_delay = 250ms`
    /// - `default_limit = 1000`
    /// - `bus_capacity = 1024`
    /// - `replace = ReplacePolicy::Retire`
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            escalation: EscalationPolicy::default(),
            hangup_delay: Duration::from_millis(250),
            default_limit: 1000,
            bus_capacity: 1024,
            replace: ReplacePolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_falls_back_to_default() {
        let cfg = SupervisorConfig::default();
        assert_eq!(cfg.limit_for(None), 1000);
        assert_eq!(cfg.limit_for(Some(0)), 1000);
        assert_eq!(cfg.limit_for(Some(3)), 3);
    }

    #[test]
    fn escalation_defaults() {
        let p = EscalationPolicy::default();
        assert_eq!(p.hangup_grace, Duration::from_millis(500));
        assert_eq!(p.total(), Duration::from_millis(1500));
    }

    #[test]
    fn bus_capacity_is_clamped() {
        let cfg = SupervisorConfig {
            bus_capacity: 0,
            ..SupervisorConfig::default()
        };
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }
}
