//! Shared helpers for the integration tests.
#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use portvisor::{Bus, Event, EventKind, OsSignals, Service, ServiceDescriptor, SupervisorConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::timeout;

/// Upper bound for anything a test waits on.
pub const PATIENCE: Duration = Duration::from_secs(10);

/// Default config, bound to loopback.
pub fn local_cfg() -> SupervisorConfig {
    SupervisorConfig {
        bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
        ..SupervisorConfig::default()
    }
}

/// `sh -c <script>` on an ephemeral port.
pub fn sh(name: &str, script: &str) -> ServiceDescriptor {
    ServiceDescriptor::exec(name, 0, "/bin/sh").with_args(["-c", script])
}

/// A started service, its event stream and its address.
pub struct Running {
    pub svc: Arc<Service>,
    pub bus: Bus,
    pub events: broadcast::Receiver<Event>,
    pub addr: SocketAddr,
}

/// Builds and starts a service with real OS signals.
pub async fn start(desc: ServiceDescriptor) -> Running {
    let bus = Bus::new(1024);
    let events = bus.subscribe();
    let svc = Service::new(desc, &local_cfg(), bus.clone(), Arc::new(OsSignals)).unwrap();
    svc.start().await.unwrap();
    let addr = svc.local_addr().await.unwrap();
    Running {
        svc,
        bus,
        events,
        addr,
    }
}

/// Waits for the next event of `kind`, skipping others.
pub async fn next_event(rx: &mut broadcast::Receiver<Event>, kind: EventKind) -> Event {
    next_event_of(rx, &[kind]).await
}

/// Waits for the next event whose kind is one of `kinds`.
pub async fn next_event_of(rx: &mut broadcast::Receiver<Event>, kinds: &[EventKind]) -> Event {
    timeout(PATIENCE, async {
        loop {
            match rx.recv().await {
                Ok(ev) if kinds.contains(&ev.kind) => return ev,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("bus closed while waiting for {kinds:?}: {e}"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {kinds:?}"))
}

/// Polls `check` until it holds.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    timeout(PATIENCE, async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never became true");
}

/// Sends `input`, half-closes, and reads everything the worker writes.
pub async fn exchange(addr: SocketAddr, input: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(input).await.unwrap();
    stream.shutdown().await.unwrap();
    read_all(&mut stream).await
}

/// Reads until EOF.
pub async fn read_all(stream: &mut TcpStream) -> Vec<u8> {
    let mut out = Vec::new();
    timeout(PATIENCE, stream.read_to_end(&mut out))
        .await
        .expect("timed out reading")
        .unwrap();
    out
}

/// Reads exactly `n` bytes.
pub async fn read_exact(stream: &mut TcpStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    timeout(PATIENCE, stream.read_exact(&mut buf))
        .await
        .expect("timed out reading")
        .unwrap();
    buf
}
