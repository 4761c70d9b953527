//! # Service descriptor: what to run on which port.
//!
//! Defines [`ServiceDescriptor`], the immutable description of one service, and
//! [`Action`], what the supervisor does with it.
//!
//! A descriptor can be created:
//! - **From JSON** through the [`Loader`](crate::Loader) (the usual path);
//! - **In code** with [`ServiceDescriptor::exec`] and the `with_*` builders.
//!
//! ## Rules
//! - `port` is optional while parsing but required for [`Action::Exec`].
//! - `limit` of `None` or `0` means the configured default
//!   ([`SupervisorConfig::default_limit`](crate::SupervisorConfig::default_limit)).
//! - Unknown `action` strings are kept verbatim in [`Action::Unknown`].

use std::fmt;

use serde::Deserialize;

use crate::error::ConfigError;

/// What the supervisor does with a descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum Action {
    /// Spawn `command` once per accepted connection.
    #[default]
    Exec,
    /// Reserved; accepted and ignored.
    Redirect,
    /// Anything else; skipped with a warning.
    Unknown(String),
}

impl Action {
    /// Action name as written in configuration.
    pub fn as_str(&self) -> &str {
        match self {
            Action::Exec => "exec",
            Action::Redirect => "redirect",
            Action::Unknown(raw) => raw,
        }
    }
}

impl From<String> for Action {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "exec" => Action::Exec,
            "redirect" => Action::Redirect,
            _ => Action::Unknown(raw),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Description of one service.
///
/// ## Example
/// ```rust
/// use portvisor::{Action, ServiceDescriptor};
///
/// let echo = ServiceDescriptor::exec("echo", 7000, "/bin/cat").with_limit(10);
/// assert_eq!(echo.action, Action::Exec);
/// assert_eq!(echo.exec_port().unwrap(), 7000);
///
/// let parsed: ServiceDescriptor =
///     serde_json::from_str(r#"{ "command": "/bin/cat", "action": "proxy" }"#).unwrap();
/// assert_eq!(parsed.action, Action::Unknown("proxy".into()));
/// assert!(parsed.exec_port().is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServiceDescriptor {
    /// Service name. Filled in by the loader from the map key or list index
    /// when absent.
    #[serde(default)]
    pub name: String,
    /// TCP port to listen on (`0` picks an ephemeral port).
    #[serde(default)]
    pub port: Option<u16>,
    /// Program spawned for each connection.
    #[serde(default)]
    pub command: String,
    /// Arguments passed to `command`.
    #[serde(default)]
    pub args: Vec<String>,
    /// Maximum concurrent connections.
    #[serde(default)]
    pub limit: Option<usize>,
    /// What to do with this descriptor.
    #[serde(default)]
    pub action: Action,
}

impl ServiceDescriptor {
    /// Creates an `exec` descriptor with no arguments and the default limit.
    pub fn exec(name: impl Into<String>, port: u16, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            port: Some(port),
            command: command.into(),
            ..Self::default()
        }
    }

    /// Replaces the argument list.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the connection limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the action.
    pub fn with_action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }

    /// Validates the descriptor as an `exec` service and returns its port.
    pub fn exec_port(&self) -> Result<u16, ConfigError> {
        let port = self.port.ok_or_else(|| ConfigError::MissingPort {
            service: self.name.clone(),
        })?;
        if self.command.is_empty() {
            return Err(ConfigError::MissingCommand {
                service: self.name.clone(),
            });
        }
        Ok(port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_descriptor() {
        let d: ServiceDescriptor = serde_json::from_str(
            r#"{ "port": 7001, "command": "/bin/echo", "args": ["a", "b"], "limit": 3, "action": "exec" }"#,
        )
        .unwrap();
        assert_eq!(d.port, Some(7001));
        assert_eq!(d.args, vec!["a", "b"]);
        assert_eq!(d.limit, Some(3));
        assert_eq!(d.action, Action::Exec);
        assert!(d.name.is_empty());
    }

    #[test]
    fn defaults_when_fields_absent() {
        let d: ServiceDescriptor = serde_json::from_str(r#"{ "port": 1 }"#).unwrap();
        assert!(d.args.is_empty());
        assert_eq!(d.limit, None);
        assert_eq!(d.action, Action::Exec);
    }

    #[test]
    fn redirect_and_unknown_actions() {
        let d: ServiceDescriptor = serde_json::from_str(r#"{ "action": "redirect" }"#).unwrap();
        assert_eq!(d.action, Action::Redirect);

        let d: ServiceDescriptor = serde_json::from_str(r#"{ "action": "fork" }"#).unwrap();
        assert_eq!(d.action.as_str(), "fork");
    }

    #[test]
    fn exec_requires_port_then_command() {
        let mut d = ServiceDescriptor {
            name: "svc".into(),
            ..Default::default()
        };
        assert!(matches!(d.exec_port(), Err(ConfigError::MissingPort { service }) if service == "svc"));

        d.port = Some(9);
        assert!(matches!(d.exec_port(), Err(ConfigError::MissingCommand { .. })));

        d.command = "/bin/true".into();
        assert_eq!(d.exec_port().unwrap(), 9);
    }
}
