//! Task state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Task state.
///
/// State transitions:
/// - Pending -> InProgress -> Completed
/// - Pending -> InProgress -> Failed -> Pending (requeued while retries remain)
/// - Pending -> InProgress -> Failed (retries exhausted, stays here)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    /// Waiting in the queue.
    Pending,

    /// Owned by a worker, handler dispatch in progress.
    InProgress,

    /// Handler succeeded.
    Completed,

    /// Handler failed. Terminal once the retry budget is spent.
    Failed,
}

impl TaskState {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "Pending",
            TaskState::InProgress => "In Progress",
            TaskState::Completed => "Completed",
            TaskState::Failed => "Failed",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
