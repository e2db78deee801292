//! Logging setup, engine counters and the settled-task ledger.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::domain::{Task, TaskId};

/// Install a fmt subscriber. `RUST_LOG` wins over `default_filter`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Point-in-time view of the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub queued: usize,
    pub in_flight: usize,
    pub completed: usize,
    pub failed: usize,
    pub retried: usize,
    pub dropped: usize,
    pub dead_lettered: usize,
    pub spawned: usize,
}

/// Counters shared by the workers.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Admitted tasks not yet finished by a worker (queued + in flight).
    /// Raised before admission, lowered after processing, so it never
    /// reaches zero while work remains.
    pub outstanding: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub completed: AtomicUsize,
    pub failed: AtomicUsize,
    pub retried: AtomicUsize,
    pub dropped: AtomicUsize,
    pub dead_lettered: AtomicUsize,
    pub spawned: AtomicUsize,
}

impl Metrics {
    pub fn incr(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn decr(counter: &AtomicUsize) {
        Self::sub(counter, 1);
    }

    /// Saturating subtract.
    pub fn sub(counter: &AtomicUsize, n: usize) {
        let _ = counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
            Some(v.saturating_sub(n))
        });
    }

    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self, queued: usize) -> EngineStats {
        EngineStats {
            queued,
            in_flight: self.in_flight.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            retried: self.retried.load(Ordering::SeqCst),
            dropped: self.dropped.load(Ordering::SeqCst),
            dead_lettered: self.dead_lettered.load(Ordering::SeqCst),
            spawned: self.spawned.load(Ordering::SeqCst),
        }
    }
}

/// How a task left the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Settlement {
    Completed,
    /// Retry budget exhausted.
    Failed,
    /// Could not be re-admitted and was discarded.
    Dropped,
    /// Could not be re-admitted and was parked.
    DeadLettered,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub settlement: Settlement,
    pub task: Task,
}

/// Bounded record of settled tasks, oldest evicted first.
///
/// Tasks are dropped by their worker once settled, so this is the only place
/// their final state stays visible.
pub struct TaskLedger {
    reports: Mutex<VecDeque<TaskReport>>,
    capacity: usize,
    tx: broadcast::Sender<TaskReport>,
}

impl TaskLedger {
    pub const DEFAULT_CAPACITY: usize = 1024;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            reports: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            tx,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn record(&self, settlement: Settlement, task: Task) {
        let report = TaskReport { settlement, task };
        {
            let mut reports = self.lock();
            if reports.len() >= self.capacity {
                if let Some(evicted) = reports.pop_front() {
                    debug!(task_id = %evicted.task.id, "ledger full, evicting oldest report");
                }
            }
            reports.push_back(report.clone());
        }
        let _ = self.tx.send(report);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskReport> {
        self.tx.subscribe()
    }

    /// Latest report for `id`. Ids are not unique, so later settlements win.
    pub fn get(&self, id: &TaskId) -> Option<TaskReport> {
        self.lock().iter().rev().find(|r| &r.task.id == id).cloned()
    }

    pub fn all(&self) -> Vec<TaskReport> {
        self.lock().iter().cloned().collect()
    }

    /// Take every report, oldest first, leaving the ledger empty.
    pub fn drain(&self) -> Vec<TaskReport> {
        self.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<TaskReport>> {
        self.reports.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TaskLedger {
    fn default() -> Self {
        Self::new()
    }
}
