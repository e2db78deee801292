//! Test doubles for the handler and analysis-client seams.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::client::{AnalysisClient, Endpoint};
use crate::domain::Task;
use crate::error::{Result, TriageError};
use crate::runtime::TaskHandler;

#[derive(Clone)]
enum Scripted {
    Reply(String),
    Status(u16),
}

/// Scripted analysis client.
///
/// Replies are consumed in order; once exhausted the fallback (if any) is
/// repeated, otherwise the call fails like a 503.
#[derive(Default)]
pub struct MockAnalysisClient {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Option<Scripted>,
    delay: Option<Duration>,
    calls: Mutex<Vec<(Endpoint, String)>>,
}

impl MockAnalysisClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, text: impl Into<String>) -> Self {
        self.script.lock().unwrap().push_back(Scripted::Reply(text.into()));
        self
    }

    pub fn with_status_error(self, status: u16) -> Self {
        self.script.lock().unwrap().push_back(Scripted::Status(status));
        self
    }

    pub fn always_reply(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(Scripted::Reply(text.into()));
        self
    }

    pub fn always_fail(mut self, status: u16) -> Self {
        self.fallback = Some(Scripted::Status(status));
        self
    }

    /// Sleep this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<(Endpoint, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl AnalysisClient for MockAnalysisClient {
    async fn analyze(&self, endpoint: Endpoint, prompt: &str) -> Result<String> {
        self.calls.lock().unwrap().push((endpoint, prompt.to_string()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.fallback.clone())
            .unwrap_or(Scripted::Status(503));

        match next {
            Scripted::Reply(text) => Ok(text),
            Scripted::Status(status) => Err(TriageError::ExternalService {
                endpoint: endpoint.path().to_string(),
                status: Some(status),
                message: "scripted failure".to_string(),
            }),
        }
    }
}

/// Always fails; counts how often it was invoked.
#[derive(Default)]
pub struct FailingHandler {
    attempts: AtomicU32,
}

impl FailingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskHandler for FailingHandler {
    async fn handle(&self, task: &mut Task) -> Result<()> {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        task.add_reasoning_step(format!("attempt {n} failed"));
        Err(TriageError::ExternalService {
            endpoint: "/test".to_string(),
            status: Some(500),
            message: format!("intentional failure #{n}"),
        })
    }
}

/// Succeeds after sleeping; counts invocations.
pub struct SlowHandler {
    delay: Duration,
    calls: AtomicU32,
}

impl SlowHandler {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskHandler for SlowHandler {
    async fn handle(&self, task: &mut Task) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        task.set_result("done");
        Ok(())
    }
}
