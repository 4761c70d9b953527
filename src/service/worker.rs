//! # Worker records and the per-service live set.
//!
//! A [`Worker`] binds one spawned process to the connection that caused it.
//! The [`WorkerSet`] is the service's authoritative list of live workers:
//!
//! ```text
//! bridge spawn ──► insert()          (Running)
//! escalation   ──► signal_all()      (Running → Terminating)
//! process exit ──► remove()          (→ Dead, gone from the set for good)
//! ```
//!
//! ## Rules
//! - Ids are never reused, so a removed worker cannot be resurrected.
//! - `signal_all` holds the write lock for the whole dispatch: every worker
//!   live at that moment receives the signal exactly once.

use std::collections::BTreeMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tokio::sync::RwLock;

use super::signal::{Signal, SignalSink};

/// Stable identifier of a worker within its service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkerId(u64);

/// Lifecycle of a worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Spawned, no shutdown signal sent yet.
    Running,
    /// At least one shutdown signal was delivered.
    Terminating,
    /// Exit reported; the record has left the live set.
    Dead,
}

/// One spawned process tied to one accepted connection.
#[derive(Debug, Clone)]
pub struct Worker {
    id: WorkerId,
    pid: u32,
    peer: Option<SocketAddr>,
    state: WorkerState,
    spawned_at: Instant,
}

impl Worker {
    /// Worker id.
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// OS process id.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Remote address of the connection, if known.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Current state.
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// When the process was spawned.
    pub fn spawned_at(&self) -> Instant {
        self.spawned_at
    }
}

/// Result of delivering one signal to one worker.
#[derive(Debug)]
pub struct SignalDelivery {
    /// Target worker id.
    pub id: WorkerId,
    /// Target process id.
    pub pid: u32,
    /// Signal sent.
    pub signal: Signal,
    /// Outcome reported by the sink.
    pub result: io::Result<()>,
}

/// Live workers of one service.
#[derive(Debug, Default)]
pub struct WorkerSet {
    workers: RwLock<BTreeMap<WorkerId, Worker>>,
    next_id: AtomicU64,
}

impl WorkerSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly spawned process and returns its id.
    pub async fn insert(&self, pid: u32, peer: Option<SocketAddr>) -> WorkerId {
        let id = WorkerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let worker = Worker {
            id,
            pid,
            peer,
            state: WorkerState::Running,
            spawned_at: Instant::now(),
        };
        self.workers.write().await.insert(id, worker);
        id
    }

    /// Removes a worker whose process exited; returns its final (Dead) record.
    pub async fn remove(&self, id: WorkerId) -> Option<Worker> {
        let mut worker = self.workers.write().await.remove(&id)?;
        worker.state = WorkerState::Dead;
        Some(worker)
    }

    /// Number of live workers.
    pub async fn len(&self) -> usize {
        self.workers.read().await.len()
    }

    /// True if no worker is live.
    pub async fn is_empty(&self) -> bool {
        self.workers.read().await.is_empty()
    }

    /// True if the worker is still live.
    pub async fn contains(&self, id: WorkerId) -> bool {
        self.workers.read().await.contains_key(&id)
    }

    /// Copies of all live worker records, in spawn order.
    pub async fn snapshot(&self) -> Vec<Worker> {
        self.workers.read().await.values().cloned().collect()
    }

    /// Sends `signal` to every live worker and marks them Terminating.
    pub async fn signal_all(&self, sink: &dyn SignalSink, signal: Signal) -> Vec<SignalDelivery> {
        let mut workers = self.workers.write().await;
        workers
            .values_mut()
            .map(|w| Self::deliver(sink, w, signal))
            .collect()
    }

    /// Sends `signal` to one worker if it is still live.
    pub async fn signal_one(
        &self,
        id: WorkerId,
        sink: &dyn SignalSink,
        signal: Signal,
    ) -> Option<SignalDelivery> {
        let mut workers = self.workers.write().await;
        workers.get_mut(&id).map(|w| Self::deliver(sink, w, signal))
    }

    fn deliver(sink: &dyn SignalSink, worker: &mut Worker, signal: Signal) -> SignalDelivery {
        let result = sink.deliver(worker, signal);
        worker.state = WorkerState::Terminating;
        SignalDelivery {
            id: worker.id,
            pid: worker.pid,
            signal,
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<(u32, Signal)>>,
    }

    impl SignalSink for Recording {
        fn deliver(&self, worker: &Worker, signal: Signal) -> io::Result<()> {
            self.sent.lock().unwrap().push((worker.pid(), signal));
            Ok(())
        }
    }

    #[tokio::test]
    async fn remove_only_touches_that_worker() {
        let set = WorkerSet::new();
        let a = set.insert(100, None).await;
        let b = set.insert(200, None).await;
        let c = set.insert(300, None).await;

        let gone = set.remove(b).await.unwrap();
        assert_eq!(gone.pid(), 200);
        assert_eq!(gone.state(), WorkerState::Dead);

        let pids: Vec<u32> = set.snapshot().await.iter().map(Worker::pid).collect();
        assert_eq!(pids, vec![100, 300]);
        assert!(set.contains(a).await);
        assert!(set.contains(c).await);
        assert!(set.remove(b).await.is_none());
    }

    #[tokio::test]
    async fn ids_are_not_reused() {
        let set = WorkerSet::new();
        let a = set.insert(1, None).await;
        set.remove(a).await;
        let b = set.insert(1, None).await;
        assert_ne!(a, b);
        assert!(!set.contains(a).await);
    }

    #[tokio::test]
    async fn signal_all_marks_terminating() {
        let set = WorkerSet::new();
        let sink = Recording::default();
        set.insert(10, None).await;
        set.insert(20, None).await;

        let deliveries = set.signal_all(&sink, Signal::Terminate).await;
        assert_eq!(deliveries.len(), 2);
        assert!(deliveries.iter().all(|d| d.result.is_ok()));
        assert_eq!(
            *sink.sent.lock().unwrap(),
            vec![(10, Signal::Terminate), (20, Signal::Terminate)]
        );
        assert!(
            set.snapshot()
                .await
                .iter()
                .all(|w| w.state() == WorkerState::Terminating)
        );
    }

    #[tokio::test]
    async fn signal_one_skips_dead_workers() {
        let set = WorkerSet::new();
        let sink = Recording::default();
        let id = set.insert(10, None).await;
        set.remove(id).await;
        assert!(set.signal_one(id, &sink, Signal::Hangup).await.is_none());
        assert!(sink.sent.lock().unwrap().is_empty());
    }
}
