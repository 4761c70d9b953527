//! Integration tests for the service lifecycle with real child processes.
//!
//! Covers:
//! - idempotent start
//! - stop / restart (socket closed, workers untouched, drain to Stopped)
//! - connection limit queueing
//! - worker exit isolation
//! - the hangup → terminate → force-kill escalation against real processes
#![cfg(unix)]

mod common;

use std::time::{Duration, Instant};

use portvisor::{EventKind, KillOutcome, ServiceDescriptor, ServiceState, Signal};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use common::*;

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn start_twice_binds_once() {
    let mut r = start(ServiceDescriptor::exec("cat", 0, "/bin/cat")).await;
    next_event(&mut r.events, EventKind::ServiceStarted).await;

    r.svc.start().await.unwrap();
    assert_eq!(r.svc.local_addr().await, Some(r.addr));
    assert_eq!(r.svc.state().await, ServiceState::Active);

    // Nothing else was published by the second start().
    r.bus.publish(portvisor::Event::new(EventKind::ShutdownRequested));
    let ev = r.events.recv().await.unwrap();
    assert_eq!(ev.kind, EventKind::ShutdownRequested);
}

#[tokio::test]
async fn stop_closes_socket_and_restart_listens_again() {
    let mut r = start(ServiceDescriptor::exec("cat", 0, "/bin/cat")).await;

    assert!(r.svc.stop().await);
    assert_eq!(r.svc.state().await, ServiceState::Stopped);
    assert_eq!(r.svc.local_addr().await, None);
    assert!(TcpStream::connect(r.addr).await.is_err());
    next_event(&mut r.events, EventKind::ServiceStopped).await;
    next_event(&mut r.events, EventKind::ServiceDrained).await;

    assert!(!r.svc.stop().await, "stop() on a stopped service is a no-op");

    r.svc.restart().await.unwrap();
    assert_eq!(r.svc.state().await, ServiceState::Active);
    next_event(&mut r.events, EventKind::ServiceRestarted).await;

    let addr = r.svc.local_addr().await.unwrap();
    assert_eq!(exchange(addr, b"again").await, b"again");
}

#[tokio::test]
async fn stop_leaves_workers_running_until_they_exit() {
    let r = start(ServiceDescriptor::exec("cat", 0, "/bin/cat")).await;

    let mut client = TcpStream::connect(r.addr).await.unwrap();
    client.write_all(b"ping").await.unwrap();
    assert_eq!(read_exact(&mut client, 4).await, b"ping");

    r.svc.stop().await;
    assert_eq!(r.svc.state().await, ServiceState::Draining);
    assert_eq!(r.svc.live_workers().await, 1);

    // The existing connection still works.
    client.write_all(b"pong").await.unwrap();
    assert_eq!(read_exact(&mut client, 4).await, b"pong");

    client.shutdown().await.unwrap();
    assert!(read_all(&mut client).await.is_empty());

    let svc = r.svc.clone();
    eventually(|| {
        let svc = svc.clone();
        async move { svc.state().await == ServiceState::Stopped }
    })
    .await;
}

// =============================================================================
// Connection limit
// =============================================================================

#[tokio::test]
async fn connections_beyond_limit_wait_for_a_slot() {
    let mut r = start(ServiceDescriptor::exec("cat", 0, "/bin/cat").with_limit(1)).await;

    let mut first = TcpStream::connect(r.addr).await.unwrap();
    first.write_all(b"1").await.unwrap();
    assert_eq!(read_exact(&mut first, 1).await, b"1");

    // Queued in the backlog: connected, but no worker yet.
    let mut second = TcpStream::connect(r.addr).await.unwrap();
    second.write_all(b"2").await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(r.svc.live_workers().await, 1);

    next_event(&mut r.events, EventKind::WorkerSpawned).await;
    assert!(matches!(
        r.events.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));

    first.shutdown().await.unwrap();
    assert_eq!(read_all(&mut first).await, b"");

    assert_eq!(read_exact(&mut second, 1).await, b"2");
    second.shutdown().await.unwrap();
    assert!(read_all(&mut second).await.is_empty());
}

#[tokio::test]
async fn worker_exit_removes_only_that_worker() {
    let r = start(ServiceDescriptor::exec("cat", 0, "/bin/cat")).await;

    let mut a = TcpStream::connect(r.addr).await.unwrap();
    let mut b = TcpStream::connect(r.addr).await.unwrap();
    a.write_all(b"a").await.unwrap();
    b.write_all(b"b").await.unwrap();
    assert_eq!(read_exact(&mut a, 1).await, b"a");
    assert_eq!(read_exact(&mut b, 1).await, b"b");
    assert_eq!(r.svc.live_workers().await, 2);

    let pids: Vec<u32> = r.svc.workers().await.iter().map(|w| w.pid()).collect();

    a.shutdown().await.unwrap();
    read_all(&mut a).await;

    let svc = r.svc.clone();
    eventually(|| {
        let svc = svc.clone();
        async move { svc.live_workers().await == 1 }
    })
    .await;

    let left = r.svc.workers().await;
    assert!(pids.contains(&left[0].pid()));
    b.write_all(b"still here").await.unwrap();
    assert_eq!(read_exact(&mut b, 10).await, b"still here");
}

// =============================================================================
// Escalation against real processes
// =============================================================================

/// Connects and waits for the worker to print `ready` (signal traps installed).
async fn ready_worker(r: &Running) -> TcpStream {
    let mut stream = TcpStream::connect(r.addr).await.unwrap();
    assert_eq!(read_exact(&mut stream, 6).await, b"ready\n");
    stream
}

#[tokio::test]
async fn kill_completes_after_hangup() {
    let mut r = start(sh("hup", "echo ready; exec sleep 30")).await;
    let _conn = ready_worker(&r).await;

    let started = Instant::now();
    let outcome = r.svc.kill().await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(outcome, KillOutcome::Hangup);
    assert!(elapsed >= Duration::from_millis(500), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(1400), "{elapsed:?}");
    assert_eq!(r.svc.live_workers().await, 0);

    let killed = next_event(&mut r.events, EventKind::ServiceKilled).await;
    assert_eq!(killed.reason.as_deref(), Some("hangup"));
}

#[tokio::test]
async fn kill_escalates_to_terminate() {
    let mut r = start(sh("term", "trap '' HUP; echo ready; while :; do sleep 0.05; done")).await;
    let _conn = ready_worker(&r).await;

    let started = Instant::now();
    let outcome = r.svc.kill().await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(outcome, KillOutcome::Terminate);
    assert!(elapsed >= Duration::from_millis(1500), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(2400), "{elapsed:?}");

    let mut sent = Vec::new();
    while let Ok(ev) = r.events.try_recv() {
        if ev.kind == EventKind::WorkerSignaled {
            sent.extend(ev.signal);
        }
    }
    assert_eq!(sent, vec![Signal::Hangup, Signal::Terminate]);
}

#[tokio::test]
async fn kill_force_kills_stubborn_worker() {
    let r = start(sh("stubborn", "trap '' HUP TERM; echo ready; while :; do sleep 0.05; done")).await;
    let _conn = ready_worker(&r).await;
    let pid = r.svc.workers().await[0].pid();

    let started = Instant::now();
    let outcome = r.svc.kill().await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(outcome, KillOutcome::ForceKill { pids: vec![pid] });
    assert!(elapsed >= Duration::from_millis(1500), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(2400), "{elapsed:?}");

    let svc = r.svc.clone();
    eventually(|| {
        let svc = svc.clone();
        async move { svc.live_workers().await == 0 }
    })
    .await;
}
