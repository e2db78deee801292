use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::client::{AnalysisClient, Endpoint};
use crate::domain::{DynamicAction, Task};
use crate::error::{Result, TriageError};
use crate::runtime::TaskHandler;

/// Calls the analysis service for one endpoint and records the answer.
///
/// Reasoning steps are appended before and after the external call, so the
/// audit trail shows every attempt, including failed ones.
pub struct AnalysisHandler {
    endpoint: Endpoint,
    /// Used in reasoning steps: "Started summarization." etc.
    label: &'static str,
    client: Arc<dyn AnalysisClient>,
}

impl AnalysisHandler {
    pub fn summarization(client: Arc<dyn AnalysisClient>) -> Self {
        Self {
            endpoint: Endpoint::Summarize,
            label: "summarization",
            client,
        }
    }

    /// Also flags high-priority items for a follow-up notification.
    pub fn categorization(client: Arc<dyn AnalysisClient>) -> Self {
        Self {
            endpoint: Endpoint::Categorize,
            label: "categorization",
            client,
        }
    }

    pub fn sentiment(client: Arc<dyn AnalysisClient>) -> Self {
        Self {
            endpoint: Endpoint::Sentiment,
            label: "sentiment analysis",
            client,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }
}

#[async_trait]
impl TaskHandler for AnalysisHandler {
    async fn handle(&self, task: &mut Task) -> Result<()> {
        let prompt = task
            .text()
            .map(str::to_string)
            .ok_or_else(|| TriageError::InvalidPayload {
                task_id: task.id.to_string(),
                reason: "expected text content".to_string(),
            })?;

        task.add_reasoning_step(format!("Started {}.", self.label));

        let answer = match self.client.analyze(self.endpoint, &prompt).await {
            Ok(answer) => answer,
            Err(err) => {
                task.add_reasoning_step(format!("Failed {}.", self.label));
                return Err(err);
            }
        };

        task.add_reasoning_step(format!("Completed {}.", self.label));
        if self.endpoint == Endpoint::Categorize && is_high_priority(&prompt, &answer) {
            debug!(task_id = %task.id, category = %answer, "high priority item");
            task.add_dynamic_action(DynamicAction::EnqueueNotification);
        }
        task.set_result(answer);
        Ok(())
    }
}

/// An item is high priority when the service says so, or when the text
/// itself is marked urgent.
pub fn is_high_priority(text: &str, category: &str) -> bool {
    let category = category.to_ascii_lowercase();
    category.contains("high priority")
        || category.contains("urgent")
        || text.to_ascii_lowercase().contains("urgent")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskType;
    use crate::testing::MockAnalysisClient;
    use rstest::rstest;

    #[tokio::test]
    async fn records_steps_and_result_on_success() {
        let client = Arc::new(MockAnalysisClient::new().with_reply("a short summary"));
        let handler = AnalysisHandler::summarization(client.clone());

        let mut task = Task::new("summarize-1", TaskType::Summarization, "long email body");
        handler.handle(&mut task).await.unwrap();

        assert_eq!(
            task.reasoning_steps,
            vec!["Started summarization.", "Completed summarization."]
        );
        assert_eq!(task.result.as_deref(), Some("a short summary"));
        assert!(task.dynamic_actions.is_empty());
        assert_eq!(client.calls(), vec![(Endpoint::Summarize, "long email body".to_string())]);
    }

    #[tokio::test]
    async fn records_failure_step_and_propagates_error() {
        let client = Arc::new(MockAnalysisClient::new().with_status_error(502));
        let handler = AnalysisHandler::sentiment(client);

        let mut task = Task::new("sentiment-1", TaskType::Sentiment, "meh");
        let err = handler.handle(&mut task).await.unwrap_err();

        assert!(matches!(err, TriageError::ExternalService { status: Some(502), .. }));
        assert_eq!(
            task.reasoning_steps,
            vec!["Started sentiment analysis.", "Failed sentiment analysis."]
        );
        assert!(task.result.is_none());
    }

    #[tokio::test]
    async fn high_priority_category_requests_notification() {
        let client = Arc::new(MockAnalysisClient::new().with_reply("High Priority"));
        let handler = AnalysisHandler::categorization(client);

        let mut task = Task::new("categorize-1", TaskType::Categorization, "server is down");
        handler.handle(&mut task).await.unwrap();

        assert_eq!(task.dynamic_actions, vec![DynamicAction::EnqueueNotification]);
    }

    #[tokio::test]
    async fn summarization_never_requests_notification() {
        let client = Arc::new(MockAnalysisClient::new().with_reply("urgent summary"));
        let handler = AnalysisHandler::summarization(client);

        let mut task = Task::new("summarize-1", TaskType::Summarization, "urgent: call back");
        handler.handle(&mut task).await.unwrap();

        assert!(task.dynamic_actions.is_empty());
    }

    #[tokio::test]
    async fn non_text_payload_fails_without_calling_service() {
        let client = Arc::new(MockAnalysisClient::new().with_reply("unused"));
        let handler = AnalysisHandler::categorization(client.clone());

        let payload = serde_json::json!({"n": 1});
        let mut task = Task::new("categorize-1", TaskType::Categorization, payload);
        let err = handler.handle(&mut task).await.unwrap_err();

        assert!(matches!(err, TriageError::InvalidPayload { .. }));
        assert_eq!(client.call_count(), 0);
    }

    #[rstest]
    #[case("please reply", "High Priority", true)]
    #[case("URGENT: invoice overdue", "Finance", true)]
    #[case("newsletter", "urgent", true)]
    #[case("Get 50% off", "Promotions", false)]
    fn high_priority_detection(#[case] text: &str, #[case] category: &str, #[case] expected: bool) {
        assert_eq!(is_high_priority(text, category), expected);
    }
}
