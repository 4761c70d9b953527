//! Integration tests for the connection bridge with real child processes.
//!
//! Covers:
//! - byte round trip through a worker
//! - stderr merged into the connection
//! - half-close (output keeps flowing after the client stops sending)
//! - spawn failure (connection closed, service keeps accepting)
//! - hangup once both directions are drained
#![cfg(unix)]

mod common;

use portvisor::{EventKind, ServiceDescriptor, ServiceState, Signal};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use common::*;

// =============================================================================
// Byte relay
// =============================================================================

#[tokio::test]
async fn cat_echoes_every_byte() {
    let mut r = start(ServiceDescriptor::exec("cat", 0, "/bin/cat")).await;

    let payload: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();
    let got = exchange(r.addr, &payload).await;
    assert_eq!(got, payload);

    let spawned = next_event(&mut r.events, EventKind::WorkerSpawned).await;
    let exited = next_event(&mut r.events, EventKind::WorkerExited).await;
    assert_eq!(spawned.pid, exited.pid);
    assert_eq!(exited.code, Some(0));
}

#[tokio::test]
async fn cat_sessions_exit_on_their_own() {
    let mut r = start(ServiceDescriptor::exec("cat", 0, "/bin/cat")).await;

    for i in 0..20 {
        let input = format!("session {i}");
        assert_eq!(exchange(r.addr, input.as_bytes()).await, input.as_bytes());
    }

    let mut exits = 0;
    while exits < 20 {
        let ev = next_event_of(&mut r.events, &[EventKind::WorkerExited, EventKind::WorkerSignaled]).await;
        assert_eq!(ev.kind, EventKind::WorkerExited, "worker was signaled: {ev:?}");
        assert_eq!(ev.code, Some(0));
        assert_eq!(ev.exit_signal, None);
        assert!(ev.lifetime.is_some());
        exits += 1;
    }
}

#[tokio::test]
async fn stderr_reaches_the_client() {
    let r = start(sh("both", "echo out; echo err >&2")).await;

    let got = String::from_utf8(exchange(r.addr, b"").await).unwrap();
    assert!(got.contains("out\n"), "{got:?}");
    assert!(got.contains("err\n"), "{got:?}");
}

#[tokio::test]
async fn output_flows_after_client_half_close() {
    let r = start(sh("late", "read line; echo got:$line; sleep 0.2; echo late")).await;

    let got = exchange(r.addr, b"x\n").await;
    assert_eq!(got, b"got:x\nlate\n");
}

// =============================================================================
// Failures and closure
// =============================================================================

#[tokio::test]
async fn spawn_failure_closes_connection_and_keeps_accepting() {
    let mut r = start(ServiceDescriptor::exec("ghost", 0, "/nonexistent/portvisor-worker")).await;

    for _ in 0..2 {
        let mut stream = TcpStream::connect(r.addr).await.unwrap();
        assert!(read_all(&mut stream).await.is_empty());

        let ev = next_event(&mut r.events, EventKind::WorkerSpawnFailed).await;
        assert!(ev.reason.is_some());
    }

    assert_eq!(r.svc.state().await, ServiceState::Active);
    assert_eq!(r.svc.live_workers().await, 0);
}

#[tokio::test]
async fn drained_connection_hangs_up_lingering_worker() {
    // Closes its output, then lingers until a signal ends it.
    let mut r = start(sh("linger", "exec >&- 2>&-; while :; do sleep 0.05; done")).await;

    let mut stream = TcpStream::connect(r.addr).await.unwrap();
    stream.shutdown().await.unwrap();
    assert!(read_all(&mut stream).await.is_empty());

    let signaled = next_event(&mut r.events, EventKind::WorkerSignaled).await;
    assert_eq!(signaled.signal, Some(Signal::Hangup));

    let exited = next_event(&mut r.events, EventKind::WorkerExited).await;
    assert_eq!(exited.pid, signaled.pid);
    assert_eq!(exited.exit_signal, Some(1));

    let svc = r.svc.clone();
    eventually(|| {
        let svc = svc.clone();
        async move { svc.live_workers().await == 0 }
    })
    .await;
}
