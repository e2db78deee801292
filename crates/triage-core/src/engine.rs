//! OrchestrationEngine - queue + worker pool lifecycle.
//!
//! Construct -> `start` -> `add_task`... -> `stop`. The engine owns no global
//! state; every instance has its own queue, pool and ledger.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::domain::{Task, TaskId};
use crate::error::{Result, TriageError};
use crate::observability::{EngineStats, Metrics, Settlement, TaskLedger, TaskReport};
use crate::queue::{DeadLetters, TaskQueue};
use crate::runtime::{HandlerRegistry, Runtime};
use crate::worker::{WorkerContext, WorkerPool};

struct Lifecycle {
    running: bool,
    pool: WorkerPool,
}

pub struct OrchestrationEngine {
    queue: Arc<TaskQueue>,
    lifecycle: Mutex<Lifecycle>,
    ledger: Arc<TaskLedger>,
    dead_letters: Arc<DeadLetters>,
    metrics: Arc<Metrics>,
}

impl OrchestrationEngine {
    /// Engine with default policies. Starts stopped.
    pub fn new(queue_capacity: usize, worker_count: usize, registry: HandlerRegistry) -> Self {
        let config = EngineConfig {
            queue_capacity,
            worker_count,
            ..EngineConfig::default()
        };
        Self::build(&config, registry)
    }

    pub fn from_config(config: &EngineConfig, registry: HandlerRegistry) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, registry))
    }

    fn build(config: &EngineConfig, registry: HandlerRegistry) -> Self {
        let queue = Arc::new(TaskQueue::new(config.queue_capacity));
        let ledger = Arc::new(TaskLedger::with_capacity(config.ledger_capacity));
        let dead_letters = Arc::new(DeadLetters::new());
        let metrics = Arc::new(Metrics::default());

        let ctx = WorkerContext {
            queue: Arc::clone(&queue),
            runtime: Arc::new(Runtime::new(Arc::new(registry))),
            retry: config.retry_policy(),
            overflow: config.overflow,
            handler_timeout: config.handler_timeout(),
            idle_poll: config.idle_poll(),
            dead_letters: Arc::clone(&dead_letters),
            ledger: Arc::clone(&ledger),
            metrics: Arc::clone(&metrics),
        };

        Self {
            queue,
            lifecycle: Mutex::new(Lifecycle {
                running: false,
                pool: WorkerPool::new(ctx, config.worker_count),
            }),
            ledger,
            dead_letters,
            metrics,
        }
    }

    pub async fn start(&self) {
        let mut lc = self.lifecycle.lock().await;
        if lc.running {
            info!("orchestration engine is already running");
            return;
        }

        info!("starting orchestration engine");
        lc.running = true;
        lc.pool.start();
        info!("orchestration engine started");
    }

    /// Stop the workers (in-flight tasks finish first), then discard
    /// whatever is still queued.
    pub async fn stop(&self) {
        let mut lc = self.lifecycle.lock().await;
        if !lc.running {
            info!("orchestration engine is not running");
            return;
        }

        info!("stopping orchestration engine");
        lc.pool.stop().await;
        let discarded = self.queue.clear();
        Metrics::sub(&self.metrics.outstanding, discarded);
        lc.running = false;
        info!(discarded, "orchestration engine stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.lifecycle.lock().await.running
    }

    /// Submit a task. Fails with `EngineNotRunning` or `QueueFull`; never waits
    /// for queue capacity.
    pub async fn add_task(&self, task: Task) -> Result<()> {
        let lc = self.lifecycle.lock().await;
        if !lc.running {
            info!(task_id = %task.id, "cannot add task, orchestration engine is not running");
            return Err(TriageError::EngineNotRunning);
        }

        let task_id = task.id.clone();
        Metrics::incr(&self.metrics.outstanding);
        if let Err(err) = self.queue.enqueue(task) {
            Metrics::decr(&self.metrics.outstanding);
            info!(%task_id, error = %err, "failed to enqueue task");
            return Err(err);
        }
        debug!(%task_id, size = self.queue.size(), "task accepted");
        Ok(())
    }

    pub fn queue_size(&self) -> usize {
        self.queue.size()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn stats(&self) -> EngineStats {
        self.metrics.snapshot(self.queue.size())
    }

    /// Latest settlement recorded for `id`, if it has settled.
    pub fn task(&self, id: &TaskId) -> Option<TaskReport> {
        self.ledger.get(id)
    }

    pub fn settled(&self) -> Vec<TaskReport> {
        self.ledger.all()
    }

    /// Take the recorded reports, leaving the ledger empty.
    pub fn drain_settled(&self) -> Vec<TaskReport> {
        self.ledger.drain()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskReport> {
        self.ledger.subscribe()
    }

    pub fn dead_letters(&self) -> &DeadLetters {
        &self.dead_letters
    }

    /// Resolves once nothing is queued or in flight.
    pub async fn wait_idle(&self, poll: Duration) {
        loop {
            let outstanding = Metrics::get(&self.metrics.outstanding);
            if outstanding == 0 {
                return;
            }
            debug!(outstanding, size = self.queue.size(), "waiting for queue to drain");
            tokio::time::sleep(poll).await;
        }
    }

    /// Start, submit `tasks`, wait for everything (derived tasks included) to
    /// settle, stop. Returns the reports of the submitted tasks that completed.
    ///
    /// The first rejected submission aborts the batch.
    pub async fn run(&self, tasks: Vec<Task>, poll: Duration) -> Result<Vec<TaskReport>> {
        self.start().await;

        let ids: Vec<TaskId> = tasks.iter().map(|t| t.id.clone()).collect();
        for task in tasks {
            self.add_task(task).await?;
        }

        self.wait_idle(poll).await;
        self.stop().await;

        let mut completed = Vec::new();
        for id in &ids {
            match self.ledger.get(id) {
                Some(report) if report.settlement == Settlement::Completed => {
                    completed.push(report)
                }
                Some(report) => {
                    info!(task_id = %id, state = %report.task.state, "task did not complete")
                }
                None => info!(task_id = %id, "task never settled"),
            }
        }
        Ok(completed)
    }
}

impl std::fmt::Debug for OrchestrationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestrationEngine")
            .field("capacity", &self.queue.capacity())
            .field("queued", &self.queue.size())
            .finish()
    }
}
