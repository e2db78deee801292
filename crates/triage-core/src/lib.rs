//! triage-core
//!
//! In-process task orchestration: a bounded FIFO queue drained by a pool of
//! async workers, which dispatch each task to the handler registered for its
//! type and retry failures up to a fixed budget.
//!
//! # Modules
//! - **domain**: Task, TaskId, TaskType, TaskState, DynamicAction
//! - **queue**: bounded TaskQueue, RetryPolicy, OverflowPolicy / DeadLetters
//! - **runtime**: TaskHandler trait, HandlerRegistry, Runtime dispatch
//! - **handlers**: analysis (HTTP service) and notification handlers
//! - **client**: AnalysisClient trait + reqwest implementation
//! - **worker**: WorkerPool and per-task processing
//! - **engine**: OrchestrationEngine facade
//! - **source**: WorkItem / ItemSource, SampleInbox
//! - **config**, **observability**, **error**

pub mod client;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod observability;
pub mod queue;
pub mod runtime;
pub mod source;
pub mod worker;

#[cfg(test)]
pub mod testing;

pub use client::{AnalysisClient, Endpoint, HttpAnalysisClient};
pub use config::{AnalysisConfig, EngineConfig};
pub use domain::{DynamicAction, Task, TaskId, TaskState, TaskType};
pub use engine::OrchestrationEngine;
pub use error::{Result, TriageError};
pub use handlers::{Notification, Notifier};
pub use observability::{EngineStats, Settlement, TaskReport};
pub use queue::{OverflowPolicy, RetryPolicy, TaskQueue};
pub use runtime::{HandlerRegistry, TaskHandler};
pub use source::{Email, ItemSource, SampleInbox, WorkItem};
