//! # Cross-platform OS signal handling.
//!
//! Provides [`ShutdownSignals`]: handlers are installed up front by
//! [`ShutdownSignals::install`], and [`ShutdownSignals::recv`] completes when
//! the process receives a termination signal, reporting which one.
//!
//! ## Signals
//! **Unix platforms:**
//! - `SIGINT` (Ctrl-C in terminal)
//! - `SIGTERM` (default kill signal, used by systemd/init scripts)
//! - `SIGQUIT` (quit signal)
//!
//! **Other platforms:**
//! - `Ctrl-C` via [`tokio::signal::ctrl_c`]

use std::io;

/// Installed termination signal listeners.
#[cfg(unix)]
pub struct ShutdownSignals {
    sigint: tokio::signal::unix::Signal,
    sigterm: tokio::signal::unix::Signal,
    sigquit: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl ShutdownSignals {
    /// Registers listeners for `SIGINT`, `SIGTERM` and `SIGQUIT`.
    pub fn install() -> io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
            sigquit: signal(SignalKind::quit())?,
        })
    }

    /// Waits for the next termination signal and returns its name.
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.sigint.recv()  => "SIGINT",
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sigquit.recv() => "SIGQUIT",
        }
    }
}

/// Installed termination signal listeners.
#[cfg(not(unix))]
pub struct ShutdownSignals;

#[cfg(not(unix))]
impl ShutdownSignals {
    /// Nothing to register up front; Ctrl-C is awaited directly.
    pub fn install() -> io::Result<Self> {
        Ok(Self)
    }

    /// Waits for Ctrl-C.
    pub async fn recv(&mut self) -> &'static str {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "ctrl-c",
            Err(_) => std::future::pending().await,
        }
    }
}
