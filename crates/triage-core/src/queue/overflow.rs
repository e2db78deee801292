//! What happens to a retried or derived task when the queue has no room.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::Task;

/// Re-admission policy for tasks the engine itself puts back on the queue.
///
/// Caller submissions are never subject to this: `add_task` always fails fast
/// with `QueueFull`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Discard the task (logged and counted).
    #[default]
    Drop,

    /// Wait up to `timeout_ms` for a free slot, then dead-letter.
    Block { timeout_ms: u64 },

    /// Park the task in the dead-letter list.
    DeadLetter,
}

impl OverflowPolicy {
    pub fn block_timeout(&self) -> Option<Duration> {
        match self {
            OverflowPolicy::Block { timeout_ms } => Some(Duration::from_millis(*timeout_ms)),
            OverflowPolicy::Drop | OverflowPolicy::DeadLetter => None,
        }
    }
}

/// Tasks that could not be re-admitted, kept for the caller to inspect.
#[derive(Debug, Default)]
pub struct DeadLetters {
    tasks: Mutex<Vec<Task>>,
}

impl DeadLetters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, task: Task) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<Task> {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Take everything out, oldest first.
    pub fn drain(&self) -> Vec<Task> {
        std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner))
    }
}
