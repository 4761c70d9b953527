//! # ConnectionBridge: one accepted connection, one worker process.
//!
//! ```text
//!               ┌──────────── inbound ────────────┐
//! TcpStream ────┤ read half ──► copy ──► stdin    │  (EOF → close stdin: half-close)
//!               │                                  │
//!               │ write half ◄── stdout ◄─┐        │  (both EOF → shutdown write half)
//!               └────────────────── stderr ◄┘      │
//!                                                  │
//!                         child.wait() ──► worker_exited()
//! ```
//!
//! ## Events handled (one `select!` arm each)
//! - **inbound drained**: client finished sending; the worker's stdin is closed.
//! - **outbound drained**: worker closed stdout and stderr; the client sees EOF.
//! - **exit**: the worker is removed from the live set immediately.
//! - **both directions drained, no exit yet**: the worker gets one `SIGHUP`
//!   if it is still running after `hangup_delay`.
//!
//! The bridge ends once the worker has exited and its output is drained; an
//! inbound relay that is still waiting on the client is dropped, closing the
//! connection. The connection permit is released when the bridge ends.

use std::io;
use std::net::SocketAddr;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::select;
use tokio::sync::OwnedSemaphorePermit;
use tokio::time::{self, Instant};

use crate::events::{Event, EventKind};

use super::service::Service;
use super::signal::Signal;

const RELAY_BUF: usize = 8 * 1024;

/// Per-connection bridge between a TCP stream and a spawned worker.
pub(crate) struct ConnectionBridge {
    service: Arc<Service>,
    peer: SocketAddr,
}

/// Child process with its three pipes taken out.
struct Spawned {
    child: Child,
    pid: u32,
    stdin: ChildStdin,
    stdout: ChildStdout,
    stderr: ChildStderr,
}

impl ConnectionBridge {
    pub(crate) fn new(service: Arc<Service>, peer: SocketAddr) -> Self {
        Self { service, peer }
    }

    /// Runs the bridge to completion. Holds `permit` for its whole life.
    pub(crate) async fn run(self, mut stream: TcpStream, permit: OwnedSemaphorePermit) {
        let _permit = permit;

        let spawned = match self.spawn() {
            Ok(s) => s,
            Err(e) => {
                self.service.bus().publish(
                    Event::new(EventKind::WorkerSpawnFailed)
                        .with_service(self.service.shared_name())
                        .with_peer(self.peer)
                        .with_reason(e.to_string()),
                );
                let _ = stream.shutdown().await;
                return;
            }
        };
        let Spawned {
            mut child,
            pid,
            stdin,
            stdout,
            stderr,
        } = spawned;

        let id = self.service.worker_spawned(pid, self.peer).await;
        let (rd, wr) = stream.into_split();

        let inbound = relay_input(rd, stdin);
        let outbound = relay_output(stdout, stderr, wr);
        let exit = child.wait();
        let hangup = time::sleep(Duration::ZERO);
        tokio::pin!(inbound, outbound, exit, hangup);

        let mut inbound_done = false;
        let mut outbound_done = false;
        let mut exited = false;
        let mut hangup_armed = false;
        let mut hangup_sent = false;

        loop {
            select! {
                _ = &mut inbound, if !inbound_done => {
                    inbound_done = true;
                }
                _ = &mut outbound, if !outbound_done => {
                    outbound_done = true;
                }
                status = &mut exit, if !exited => {
                    exited = true;
                    let ev = Event::new(EventKind::WorkerExited)
                        .with_service(self.service.shared_name())
                        .with_pid(pid);
                    let ev = match status {
                        Ok(status) => ev.with_exit_status(&status),
                        Err(e) => ev.with_reason(e.to_string()),
                    };
                    self.service.worker_exited(id, ev).await;
                }
                _ = &mut hangup, if hangup_armed && !hangup_sent && !exited => {
                    hangup_sent = true;
                    self.service.signal_worker(id, Signal::Hangup).await;
                }
                else => break,
            }

            if exited && outbound_done {
                break;
            }
            // Hang up only if the worker outlives `hangup_delay`.
            if inbound_done && outbound_done && !exited && !hangup_armed {
                hangup_armed = true;
                hangup
                    .as_mut()
                    .reset(Instant::now() + self.service.hangup_delay());
            }
        }
    }

    fn spawn(&self) -> io::Result<Spawned> {
        let desc = self.service.descriptor();
        let mut child = Command::new(&desc.command)
            .args(&desc.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let pipes = (child.id(), child.stdin.take(), child.stdout.take(), child.stderr.take());
        match pipes {
            (Some(pid), Some(stdin), Some(stdout), Some(stderr)) => Ok(Spawned {
                child,
                pid,
                stdin,
                stdout,
                stderr,
            }),
            _ => {
                let _ = child.start_kill();
                Err(io::Error::other("worker exited before its pipes were attached"))
            }
        }
    }
}

/// Copies client bytes into the worker's stdin, then closes stdin.
async fn relay_input<R, W>(mut from: R, mut to: W) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let n = tokio::io::copy(&mut from, &mut to).await?;
    to.shutdown().await?;
    Ok(n)
}

/// Copies stdout and stderr into the client as data arrives, then shuts down
/// the client's write half.
///
/// Each stream keeps its own order; chunks of the two streams interleave in
/// arrival order.
async fn relay_output<O, E, W>(mut stdout: O, mut stderr: E, mut to: W) -> io::Result<u64>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut out_buf = vec![0u8; RELAY_BUF];
    let mut err_buf = vec![0u8; RELAY_BUF];
    let mut out_open = true;
    let mut err_open = true;
    let mut total = 0u64;

    while out_open || err_open {
        let chunk = select! {
            n = stdout.read(&mut out_buf), if out_open => match n? {
                0 => { out_open = false; continue; }
                n => &out_buf[..n],
            },
            n = stderr.read(&mut err_buf), if err_open => match n? {
                0 => { err_open = false; continue; }
                n => &err_buf[..n],
            },
        };
        to.write_all(chunk).await?;
        total += chunk.len() as u64;
    }
    to.shutdown().await?;
    Ok(total)
}
