use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::client::AnalysisClient;
use crate::domain::{Task, TaskType};
use crate::error::{Result, TriageError};
use crate::handlers::{AnalysisHandler, NotificationHandler, Notifier};

/// A handler for a specific task type.
///
/// Takes the task mutably: the worker owns it for the duration of the call,
/// so the handler can append reasoning steps, dynamic actions and the result.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &mut Task) -> Result<()>;
}

/// Registry of handlers (task_type -> handler).
///
/// Design:
/// - Built during initialization (mutable).
/// - Used during runtime (immutable, shared behind `Arc`).
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<TaskType, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// One handler per known task type: the three analysis kinds go through
    /// `client`, notifications are published on `notifier`.
    pub fn standard(client: Arc<dyn AnalysisClient>, notifier: Notifier) -> Self {
        let mut registry = Self::new();
        for task_type in [
            TaskType::Summarization,
            TaskType::Categorization,
            TaskType::Sentiment,
            TaskType::Notification,
        ] {
            let client = Arc::clone(&client);
            let handler: Arc<dyn TaskHandler> = match &task_type {
                TaskType::Summarization => Arc::new(AnalysisHandler::summarization(client)),
                TaskType::Categorization => Arc::new(AnalysisHandler::categorization(client)),
                TaskType::Sentiment => Arc::new(AnalysisHandler::sentiment(client)),
                TaskType::Notification => Arc::new(NotificationHandler::new(notifier.clone())),
                TaskType::Unknown(_) => continue,
            };
            registry.handlers.insert(task_type, handler);
        }
        registry
    }

    /// Register a handler for a task type.
    ///
    /// Unknown tags cannot carry a handler; they always fail dispatch.
    pub fn register(
        &mut self,
        task_type: TaskType,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<()> {
        if let TaskType::Unknown(tag) = &task_type {
            return Err(TriageError::UnknownTaskType(tag.clone()));
        }
        if self.handlers.contains_key(&task_type) {
            return Err(TriageError::DuplicateHandler(task_type.to_string()));
        }
        self.handlers.insert(task_type, handler);
        Ok(())
    }

    pub fn get(&self, task_type: &TaskType) -> Option<&Arc<dyn TaskHandler>> {
        self.handlers.get(task_type)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Runtime executes a task by dispatching to the handler for its type.
pub struct Runtime {
    registry: Arc<HandlerRegistry>,
}

impl Runtime {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Execute one task. Unknown or unregistered types fail before any
    /// external call is made.
    pub async fn execute(&self, task: &mut Task) -> Result<()> {
        let handler = self
            .registry
            .get(&task.task_type)
            .cloned()
            .ok_or_else(|| TriageError::UnknownTaskType(task.task_type.to_string()))?;

        handler.handle(task).await
    }
}
