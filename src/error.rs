//! Error types used by the portvisor runtime.
//!
//! - [`ConfigError`]: descriptor validation and configuration file loading.
//! - [`ServiceError`]: failures scoped to a single service (bind, kill).
//! - [`RegistryError`]: either of the above, raised while registering one descriptor.
//! - [`RuntimeError`]: errors that abort [`Supervisor::run`](crate::Supervisor::run).
//!
//! All enums provide `as_label` (stable snake_case) for logs.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// # Configuration errors.
///
/// Raised at load time, before any service is started for the offending unit.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An `exec` descriptor has no port.
    #[error("service '{service}': port is required")]
    MissingPort {
        /// Descriptor name.
        service: String,
    },

    /// An `exec` descriptor has an empty command.
    #[error("service '{service}': command is required")]
    MissingCommand {
        /// Descriptor name.
        service: String,
    },

    /// A configuration file or directory could not be read.
    #[error("failed to read {path:?}: {source}")]
    Io {
        /// Path being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A configuration file is not valid JSON (or has the wrong shape).
    #[error("failed to parse {path:?}: {source}")]
    Parse {
        /// Path being parsed.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use portvisor::ConfigError;
    ///
    /// let err = ConfigError::MissingPort { service: "echo".into() };
    /// assert_eq!(err.as_label(), "config_missing_port");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::MissingPort { .. } => "config_missing_port",
            ConfigError::MissingCommand { .. } => "config_missing_command",
            ConfigError::Io { .. } => "config_io",
            ConfigError::Parse { .. } => "config_parse",
        }
    }
}

/// # Errors scoped to one service.
///
/// Never affect other services.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The listening socket could not be bound.
    #[error("service '{service}': failed to bind port {port}: {source}")]
    Bind {
        /// Service name.
        service: String,
        /// Port from the descriptor.
        port: u16,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The escalation task ended without reporting completion (runtime shutting down).
    #[error("service '{service}': kill escalation aborted")]
    KillAborted {
        /// Service name.
        service: String,
    },
}

impl ServiceError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ServiceError::Bind { .. } => "service_bind_failed",
            ServiceError::KillAborted { .. } => "service_kill_aborted",
        }
    }
}

/// # Errors raised while registering a single descriptor.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The descriptor is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The service could not be started.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl RegistryError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RegistryError::Config(e) => e.as_label(),
            RegistryError::Service(e) => e.as_label(),
        }
    }
}

/// # Errors produced by the supervisor runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The descriptor list was rejected; nothing was started.
    #[error("configuration rejected: {0}")]
    Config(#[from] ConfigError),

    /// OS signal handlers could not be installed.
    #[error("failed to install shutdown signal handlers: {source}")]
    Signal {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use portvisor::{ConfigError, RuntimeError};
    ///
    /// let err = RuntimeError::from(ConfigError::MissingPort { service: "echo".into() });
    /// assert_eq!(err.as_label(), "runtime_config_rejected");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Config(_) => "runtime_config_rejected",
            RuntimeError::Signal { .. } => "runtime_signal_setup",
        }
    }
}
