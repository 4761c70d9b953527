//! # Shutdown signals and their delivery.
//!
//! [`Signal`] names the three escalation steps; [`SignalSink`] is the seam
//! that actually delivers them. [`OsSignals`] sends real POSIX signals through
//! `nix`; tests substitute their own sink.

use std::fmt;
use std::io;

use super::worker::Worker;

/// Shutdown signal, in escalation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// `SIGHUP`: the connection is gone, please exit.
    Hangup,
    /// `SIGTERM`: exit now.
    Terminate,
    /// `SIGKILL`: cannot be caught.
    ForceKill,
}

impl Signal {
    /// Conventional signal name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Hangup => "SIGHUP",
            Signal::Terminate => "SIGTERM",
            Signal::ForceKill => "SIGKILL",
        }
    }

    #[cfg(unix)]
    fn to_nix(self) -> nix::sys::signal::Signal {
        use nix::sys::signal::Signal as Nix;
        match self {
            Signal::Hangup => Nix::SIGHUP,
            Signal::Terminate => Nix::SIGTERM,
            Signal::ForceKill => Nix::SIGKILL,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivers signals to worker processes.
///
/// Called while the owning service's worker set is locked, so implementations
/// must not block or touch that set synchronously.
pub trait SignalSink: Send + Sync + 'static {
    /// Sends `signal` to `worker`.
    fn deliver(&self, worker: &Worker, signal: Signal) -> io::Result<()>;
}

/// Sends real signals to the worker's process id.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsSignals;

impl SignalSink for OsSignals {
    fn deliver(&self, worker: &Worker, signal: Signal) -> io::Result<()> {
        deliver_os(worker.pid(), signal)
    }
}

#[cfg(unix)]
fn deliver_os(pid: u32, signal: Signal) -> io::Result<()> {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    // pid 0 or a negative value would address a whole process group.
    let raw = i32::try_from(pid)
        .ok()
        .filter(|p| *p > 0)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid pid {pid}")))?;
    kill(Pid::from_raw(raw), signal.to_nix()).map_err(io::Error::from)
}

#[cfg(not(unix))]
fn deliver_os(_pid: u32, signal: Signal) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("{signal} is not supported on this platform"),
    ))
}
