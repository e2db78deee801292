use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, info_span, warn};
use ulid::Ulid;

use crate::domain::{DynamicAction, Task, TaskType};
use crate::error::TriageError;
use crate::observability::{Metrics, Settlement, TaskLedger};
use crate::queue::{DeadLetters, OverflowPolicy, RetryDecision, RetryPolicy, TaskQueue};
use crate::runtime::Runtime;

/// Everything a worker needs, shared by all workers of a pool.
pub struct WorkerContext {
    pub queue: Arc<TaskQueue>,
    pub runtime: Arc<Runtime>,
    pub retry: RetryPolicy,
    pub overflow: OverflowPolicy,
    pub handler_timeout: Duration,
    pub idle_poll: Duration,
    pub dead_letters: Arc<DeadLetters>,
    pub ledger: Arc<TaskLedger>,
    pub metrics: Arc<Metrics>,
}

/// Fixed-size pool of workers draining one queue.
/// - `start()` spawns `worker_count` workers sharing one shutdown signal
/// - `stop()` raises the signal and waits for every worker to exit
///
/// `start()` is not idempotent: a second call without `stop()` in between
/// spawns another set of workers on the same signal.
pub struct WorkerPool {
    ctx: Arc<WorkerContext>,
    worker_count: usize,
    shutdown_tx: Option<watch::Sender<bool>>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(ctx: WorkerContext, worker_count: usize) -> Self {
        Self {
            ctx: Arc::new(ctx),
            worker_count,
            shutdown_tx: None,
            joins: Vec::new(),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Workers spawned and not yet exited.
    pub fn active_workers(&self) -> usize {
        self.joins.iter().filter(|j| !j.is_finished()).count()
    }

    pub fn start(&mut self) {
        info!(workers = self.worker_count, "starting worker pool");
        let shutdown_tx = self
            .shutdown_tx
            .get_or_insert_with(|| watch::channel(false).0);

        for worker_id in 0..self.worker_count {
            let ctx = Arc::clone(&self.ctx);
            let rx = shutdown_tx.subscribe();
            self.joins
                .push(tokio::spawn(async move { worker_loop(worker_id, ctx, rx).await }));
        }
    }

    /// Signal shutdown and wait for all workers.
    /// In-flight tasks run to completion; nothing new is dequeued.
    pub async fn stop(&mut self) {
        info!("stopping worker pool");
        if let Some(tx) = self.shutdown_tx.take() {
            // ignore send error: every worker may already be gone
            let _ = tx.send(true);
        }
        for join in self.joins.drain(..) {
            if let Err(e) = join.await {
                error!(error = %e, "worker terminated abnormally");
            }
        }
        info!("worker pool stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    ctx: Arc<WorkerContext>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!(worker_id, "worker started");
    loop {
        // shutdown はタスクとタスクの間でだけ見る
        if *shutdown_rx.borrow() {
            break;
        }

        match ctx.queue.dequeue() {
            Ok(task) => ctx.process(worker_id, task).await,
            Err(_) => {
                let pause = idle_pause(ctx.idle_poll);
                tokio::select! {
                    _ = shutdown_rx.changed() => {}
                    _ = ctx.queue.wait_for_task() => {}
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        }
    }
    info!(worker_id, "worker stopping");
}

/// Poll interval plus up to 25% jitter so idle workers drift apart.
fn idle_pause(base: Duration) -> Duration {
    let max_jitter = (base.as_millis() / 4) as u64;
    if max_jitter == 0 {
        return base;
    }
    base + Duration::from_millis(rand::thread_rng().gen_range(0..=max_jitter))
}

impl WorkerContext {
    /// Run one dequeued task through dispatch and settle or requeue it.
    pub async fn process(&self, worker_id: usize, task: Task) {
        Metrics::incr(&self.metrics.in_flight);
        let span = info_span!(
            "task",
            worker_id,
            task_id = %task.id,
            task_type = %task.task_type,
            attempt = %Ulid::new(),
        );
        self.run_attempt(task).instrument(span).await;
        Metrics::decr(&self.metrics.in_flight);
        Metrics::decr(&self.metrics.outstanding);
    }

    async fn run_attempt(&self, mut task: Task) {
        task.mark_in_progress();
        info!(retries = task.retries, "processing task");

        let execution = self.runtime.execute(&mut task);
        let result = tokio::time::timeout(self.handler_timeout, execution).await;
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(_) => {
                // handler は途中で捨てられるので、ここで締めのステップを残す
                let step = format!("Timed out after {:?}.", self.handler_timeout);
                task.add_reasoning_step(step);
                Err(TriageError::HandlerTimeout {
                    task_id: task.id.to_string(),
                    after: self.handler_timeout,
                })
            }
        };

        match outcome {
            Ok(()) => self.on_success(task).await,
            Err(err) => self.on_failure(task, err).await,
        }
    }

    async fn on_success(&self, mut task: Task) {
        for action in task.dynamic_actions.clone() {
            info!(action = action.describe(), "handling dynamic action");
            let derived = derive_task(&task, &action);
            Metrics::incr(&self.metrics.spawned);
            self.readmit(derived).await;
        }

        task.mark_completed();
        info!("task completed");
        Metrics::incr(&self.metrics.completed);
        self.ledger.record(Settlement::Completed, task);
    }

    async fn on_failure(&self, mut task: Task, err: TriageError) {
        warn!(error = %err, "task failed");
        task.mark_failed();
        task.increment_retries();

        match self.retry.decide(task.retries) {
            RetryDecision::Requeue => {
                info!(retry = task.retries, "retrying task");
                Metrics::incr(&self.metrics.retried);
                task.requeue();
                self.readmit(task).await;
            }
            RetryDecision::GiveUp => {
                error!(retries = task.retries, "task failed after maximum retries");
                Metrics::incr(&self.metrics.failed);
                self.ledger.record(Settlement::Failed, task);
            }
        }
    }

    /// Put a task the engine produced back on the queue, applying the
    /// overflow policy when there is no room. Returns whether it was admitted.
    async fn readmit(&self, task: Task) -> bool {
        Metrics::incr(&self.metrics.outstanding);
        let offered = match self.overflow.block_timeout() {
            Some(wait) => self.queue.enqueue_within(task, wait).await,
            None => self.queue.offer(task),
        };

        let rejected = match offered {
            Ok(()) => return true,
            Err(task) => task,
        };
        Metrics::decr(&self.metrics.outstanding);

        match self.overflow {
            OverflowPolicy::Drop => {
                warn!(task_id = %rejected.id, "queue full, dropping task");
                Metrics::incr(&self.metrics.dropped);
                self.ledger.record(Settlement::Dropped, rejected);
            }
            OverflowPolicy::Block { .. } | OverflowPolicy::DeadLetter => {
                warn!(task_id = %rejected.id, "queue full, dead-lettering task");
                Metrics::incr(&self.metrics.dead_lettered);
                self.ledger.record(Settlement::DeadLettered, rejected.clone());
                self.dead_letters.push(rejected);
            }
        }
        false
    }
}

/// New task for a dynamic action. The id is derived from the origin's id,
/// so reprocessing the same origin yields the same derived id.
fn derive_task(origin: &Task, action: &DynamicAction) -> Task {
    match action {
        DynamicAction::EnqueueNotification => Task::new(
            origin.id.derived("notification"),
            TaskType::Notification,
            origin.payload.clone(),
        ),
    }
}
