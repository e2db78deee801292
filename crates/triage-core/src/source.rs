//! Where work comes from.
//!
//! An `ItemSource` yields `WorkItem`s; each becomes one `Task`. The bundled
//! `SampleInbox` turns a fixed set of emails into analysis tasks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Task, TaskId, TaskType};
use crate::error::Result;

/// A unit of incoming work, before it is admitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: TaskId,
    pub task_type: TaskType,
    pub payload: serde_json::Value,
}

impl From<WorkItem> for Task {
    fn from(item: WorkItem) -> Self {
        Task::new(item.id, item.task_type, item.payload)
    }
}

#[async_trait]
pub trait ItemSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<WorkItem>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Email {
    pub id: String,
    pub subject: String,
    pub body: String,
}

impl Email {
    pub fn new(id: &str, subject: &str, body: &str) -> Self {
        Self {
            id: id.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        }
    }

    /// Summarization, categorization and sentiment over the body.
    pub fn work_items(&self) -> Vec<WorkItem> {
        [
            ("summarize", TaskType::Summarization),
            ("categorize", TaskType::Categorization),
            ("sentiment", TaskType::Sentiment),
        ]
        .into_iter()
        .map(|(prefix, task_type)| WorkItem {
            id: TaskId::new(format!("{prefix}-{}", self.id)),
            task_type,
            payload: serde_json::Value::String(self.body.clone()),
        })
        .collect()
    }
}

/// Fixed in-memory inbox.
#[derive(Debug, Clone)]
pub struct SampleInbox {
    emails: Vec<Email>,
}

impl SampleInbox {
    pub fn new(emails: Vec<Email>) -> Self {
        Self { emails }
    }

    pub fn emails(&self) -> &[Email] {
        &self.emails
    }
}

impl Default for SampleInbox {
    fn default() -> Self {
        Self::new(vec![
            Email::new(
                "1",
                "Your invoice for October",
                "Dear user, your invoice is $45. Please pay by the due date.",
            ),
            Email::new(
                "2",
                "Congratulations!",
                "We are thrilled to announce you got the job!",
            ),
            Email::new(
                "3",
                "Limited Offer!",
                "Get 50% off on all electronics until midnight.",
            ),
        ])
    }
}

#[async_trait]
impl ItemSource for SampleInbox {
    async fn fetch(&self) -> Result<Vec<WorkItem>> {
        Ok(self.emails.iter().flat_map(Email::work_items).collect())
    }
}
