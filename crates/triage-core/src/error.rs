use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TriageError {
    #[error("queue is full (capacity={capacity})")]
    QueueFull { capacity: usize },

    #[error("queue is empty")]
    QueueEmpty,

    #[error("orchestration engine is not running")]
    EngineNotRunning,

    #[error("unknown task type: {0}")]
    UnknownTaskType(String),

    #[error("analysis service call to {endpoint} failed{}: {message}", status_suffix(.status))]
    ExternalService {
        endpoint: String,
        status: Option<u16>,
        message: String,
    },

    #[error("task {task_id} timed out after {after:?}")]
    HandlerTimeout { task_id: String, after: Duration },

    #[error("task {task_id} has an invalid payload: {reason}")]
    InvalidPayload { task_id: String, reason: String },

    #[error("no queue capacity freed within {waited:?} (capacity={capacity})")]
    OverflowTimeout { capacity: usize, waited: Duration },

    #[error("duplicate handler for task_type={0}")]
    DuplicateHandler(String),

    #[error("configuration error: {0}")]
    Config(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

impl TriageError {
    /// Processing failures are retried by the worker; admission errors are
    /// returned to whoever tried to enqueue.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TriageError::UnknownTaskType(_)
                | TriageError::ExternalService { .. }
                | TriageError::HandlerTimeout { .. }
                | TriageError::InvalidPayload { .. }
        )
    }
}

impl From<config::ConfigError> for TriageError {
    fn from(err: config::ConfigError) -> Self {
        TriageError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TriageError>;
