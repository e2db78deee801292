//! Queue module: bounded FIFO, retry policy and overflow handling.

mod overflow;
mod retry;

pub use overflow::{DeadLetters, OverflowPolicy};
pub use retry::{RetryDecision, RetryPolicy};

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use crate::domain::Task;
use crate::error::{Result, TriageError};

/// Bounded, thread-safe FIFO of pending tasks.
///
/// Design:
/// - `enqueue` / `dequeue` never wait: a full or empty queue is reported as an error.
/// - One mutex guards the buffer; occupancy is the buffer length, so `size()`
///   always agrees with the last completed enqueue/dequeue.
/// - Waiting is opt-in (`wait_for_task`, `enqueue_within`) and happens outside the lock.
pub struct TaskQueue {
    buffer: Mutex<VecDeque<Task>>,
    capacity: usize,
    /// Raised on every admission.
    available: Notify,
    /// Raised whenever a slot frees up.
    space: Notify,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Mutex::new(VecDeque::new()),
            capacity,
            available: Notify::new(),
            space: Notify::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Admit a task, or fail with `QueueFull`.
    pub fn enqueue(&self, task: Task) -> Result<()> {
        self.offer(task)
            .map_err(|_| TriageError::QueueFull { capacity: self.capacity })
    }

    /// Like `enqueue`, but hands the task back when it is not admitted.
    pub fn offer(&self, task: Task) -> std::result::Result<(), Task> {
        {
            let mut buffer = self.lock();
            if buffer.len() >= self.capacity {
                return Err(task);
            }
            debug!(task_id = %task.id, size = buffer.len() + 1, "task added to the queue");
            buffer.push_back(task);
        }
        self.available.notify_one();
        Ok(())
    }

    /// Remove the oldest task, or fail with `QueueEmpty`.
    pub fn dequeue(&self) -> Result<Task> {
        let task = {
            let mut buffer = self.lock();
            let task = buffer.pop_front().ok_or(TriageError::QueueEmpty)?;
            debug!(task_id = %task.id, size = buffer.len(), "task removed from the queue");
            task
        };
        self.space.notify_one();
        Ok(task)
    }

    pub fn size(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Discard everything buffered. Returns how many tasks were dropped.
    pub fn clear(&self) -> usize {
        let discarded = {
            let mut buffer = self.lock();
            let n = buffer.len();
            buffer.clear();
            n
        };
        if discarded > 0 {
            debug!(discarded, "queue cleared");
            self.space.notify_waiters();
            self.space.notify_one();
        }
        discarded
    }

    /// Resolves once a task has been admitted since the last wake-up.
    ///
    /// A wake-up is not a guarantee: another worker may dequeue first.
    pub async fn wait_for_task(&self) {
        self.available.notified().await;
    }

    /// Keep offering the task until a slot frees up or `wait` elapses.
    pub async fn enqueue_within(
        &self,
        mut task: Task,
        wait: Duration,
    ) -> std::result::Result<(), Task> {
        let deadline = Instant::now() + wait;
        loop {
            match self.offer(task) {
                Ok(()) => return Ok(()),
                Err(rejected) => task = rejected,
            }
            if tokio::time::timeout_at(deadline, self.space.notified())
                .await
                .is_err()
            {
                // 最後にもう一度だけ試す
                return self.offer(task);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Task>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
