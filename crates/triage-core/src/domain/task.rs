use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::TaskState;

/// Caller-supplied task identity. Uniqueness is not enforced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identity for a task derived from this one, e.g. `notification-<id>`.
    pub fn derived(&self, prefix: &str) -> Self {
        Self(format!("{prefix}-{}", self.0))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Selects the handler a task is dispatched to.
///
/// `Unknown` keeps the raw tag so dispatch can report it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskType {
    Summarization,
    Categorization,
    Sentiment,
    Notification,
    Unknown(String),
}

impl TaskType {
    pub fn as_str(&self) -> &str {
        match self {
            TaskType::Summarization => "Summarization",
            TaskType::Categorization => "Categorization",
            TaskType::Sentiment => "Sentiment",
            TaskType::Notification => "Notification",
            TaskType::Unknown(tag) => tag,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, TaskType::Unknown(_))
    }
}

impl FromStr for TaskType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.trim().to_ascii_lowercase().as_str() {
            "summarization" | "summarize" => TaskType::Summarization,
            "categorization" | "categorize" => TaskType::Categorization,
            "sentiment" => TaskType::Sentiment,
            "notification" => TaskType::Notification,
            _ => TaskType::Unknown(s.to_string()),
        };
        Ok(kind)
    }
}

impl From<&str> for TaskType {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(kind) => kind,
            Err(never) => match never {},
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Follow-up work a handler decided on. Turned into new tasks after success.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DynamicAction {
    EnqueueNotification,
}

impl DynamicAction {
    pub fn describe(&self) -> &'static str {
        match self {
            DynamicAction::EnqueueNotification => "Enqueue Notification Task",
        }
    }
}

/// A unit of work.
///
/// Owned by exactly one component at a time: the queue while pending, a
/// single worker while in progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub task_type: TaskType,
    pub payload: serde_json::Value,
    pub result: Option<String>,
    pub state: TaskState,
    pub retries: u32,
    pub reasoning_steps: Vec<String>,
    pub dynamic_actions: Vec<DynamicAction>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        id: impl Into<TaskId>,
        task_type: impl Into<TaskType>,
        payload: impl Into<serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            task_type: task_type.into(),
            payload: payload.into(),
            result: None,
            state: TaskState::Pending,
            retries: 0,
            reasoning_steps: Vec::new(),
            dynamic_actions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Payload as text, for analysis handlers.
    pub fn text(&self) -> Option<&str> {
        self.payload.as_str()
    }

    pub fn is_terminal(&self, max_retries: u32) -> bool {
        match self.state {
            TaskState::Completed => true,
            TaskState::Failed => self.retries >= max_retries,
            TaskState::Pending | TaskState::InProgress => false,
        }
    }

    pub fn mark_in_progress(&mut self) {
        self.state = TaskState::InProgress;
        self.touch();
    }

    pub fn mark_completed(&mut self) {
        self.state = TaskState::Completed;
        self.touch();
    }

    pub fn mark_failed(&mut self) {
        self.state = TaskState::Failed;
        self.touch();
    }

    /// Failed -> Pending, ahead of re-admission.
    pub fn requeue(&mut self) {
        self.state = TaskState::Pending;
        self.touch();
    }

    pub fn increment_retries(&mut self) {
        self.retries += 1;
        self.touch();
    }

    pub fn set_result(&mut self, result: impl Into<String>) {
        self.result = Some(result.into());
        self.touch();
    }

    pub fn add_reasoning_step(&mut self, step: impl Into<String>) {
        self.reasoning_steps.push(step.into());
        self.touch();
    }

    /// Ordered set: a repeated action is ignored.
    pub fn add_dynamic_action(&mut self, action: DynamicAction) {
        if !self.dynamic_actions.contains(&action) {
            self.dynamic_actions.push(action);
            self.touch();
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
