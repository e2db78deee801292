use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::info;

use crate::domain::{Task, TaskId};
use crate::error::Result;
use crate::runtime::TaskHandler;

/// Published for every processed Notification task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub task_id: TaskId,
    pub message: String,
}

/// Fan-out of notifications to whoever subscribed.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Returns how many subscribers received it. Zero is fine.
    pub fn publish(&self, notification: Notification) -> usize {
        self.tx.send(notification).unwrap_or(0)
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(64)
    }
}

pub struct NotificationHandler {
    notifier: Notifier,
}

impl NotificationHandler {
    pub fn new(notifier: Notifier) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl TaskHandler for NotificationHandler {
    async fn handle(&self, task: &mut Task) -> Result<()> {
        task.add_reasoning_step("Started notification.");

        let subject = match task.text() {
            Some(text) => text.to_string(),
            None => task.payload.to_string(),
        };
        let message = format!("Task {} needs attention: {subject}", task.id);
        let delivered = self.notifier.publish(Notification {
            task_id: task.id.clone(),
            message: message.clone(),
        });
        info!(task_id = %task.id, delivered, "notification sent");

        task.add_reasoning_step("Completed notification.");
        task.set_result(message);
        Ok(())
    }
}
