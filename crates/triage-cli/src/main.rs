use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use triage_core::observability::init_tracing;
use triage_core::{
    EngineConfig, HandlerRegistry, HttpAnalysisClient, ItemSource, Notifier, OrchestrationEngine,
    SampleInbox, Task, TaskId, TaskReport, TaskType,
};

const POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Parser)]
#[command(name = "triage", version, about = "Run analysis tasks through the orchestration engine")]
struct Cli {
    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log: String,

    /// Config file (TOML / YAML / JSON).
    #[arg(long, global = true, env = "TRIAGE_CONFIG")]
    config: Option<PathBuf>,

    /// Analysis service base URL.
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[arg(long, global = true)]
    workers: Option<usize>,

    #[arg(long, global = true)]
    capacity: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Process the sample inbox and print one report per email.
    Simulate,

    /// Submit a single task, wait for it to settle and print it.
    Submit {
        #[arg(long = "type")]
        task_type: String,

        #[arg(long)]
        payload: String,

        #[arg(long, default_value = "task-1")]
        id: String,
    },
}

#[derive(Debug, Serialize)]
struct EmailReport {
    email_id: String,
    subject: String,
    tasks: Vec<TaskReport>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log);

    let mut config = EngineConfig::load(cli.config.as_deref()).context("loading config")?;
    if let Some(url) = &cli.base_url {
        config.analysis.base_url = url.clone();
    }
    if let Some(n) = cli.workers {
        config.worker_count = n;
    }
    if let Some(n) = cli.capacity {
        config.queue_capacity = n;
    }

    let client = HttpAnalysisClient::new(&config.analysis)?;
    let notifier = Notifier::default();
    let mut notifications = notifier.subscribe();
    tokio::spawn(async move {
        while let Ok(n) = notifications.recv().await {
            info!(task_id = %n.task_id, "{}", n.message);
        }
    });

    let registry = HandlerRegistry::standard(Arc::new(client), notifier);
    let engine = OrchestrationEngine::from_config(&config, registry)?;
    info!(
        capacity = config.queue_capacity,
        workers = config.worker_count,
        base_url = %config.analysis.base_url,
        "engine configured"
    );

    match cli.command {
        Command::Simulate => simulate(&engine).await,
        Command::Submit {
            task_type,
            payload,
            id,
        } => submit(&engine, &id, TaskType::from(task_type.as_str()), payload).await,
    }
}

async fn simulate(engine: &OrchestrationEngine) -> anyhow::Result<()> {
    let inbox = SampleInbox::default();
    let tasks: Vec<Task> = inbox.fetch().await?.into_iter().map(Task::from).collect();
    if tasks.len() > engine.capacity() {
        warn!(
            tasks = tasks.len(),
            capacity = engine.capacity(),
            "more tasks than queue capacity, some may be rejected"
        );
    }

    engine.run(tasks, POLL).await?;

    for email in inbox.emails() {
        let mut reports = Vec::new();
        for item in email.work_items() {
            let derived = item.id.derived("notification");
            for id in [item.id, derived] {
                if let Some(report) = engine.task(&id) {
                    reports.push(report);
                }
            }
        }
        let out = EmailReport {
            email_id: email.id.clone(),
            subject: email.subject.clone(),
            tasks: reports,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    }

    let stats = engine.stats();
    info!(
        completed = stats.completed,
        failed = stats.failed,
        retried = stats.retried,
        spawned = stats.spawned,
        "simulation finished"
    );
    Ok(())
}

async fn submit(
    engine: &OrchestrationEngine,
    id: &str,
    task_type: TaskType,
    payload: String,
) -> anyhow::Result<()> {
    if !task_type.is_known() {
        warn!(%task_type, "no handler for this task type, it will fail after retries");
    }

    engine.start().await;
    let submitted = engine.add_task(Task::new(id, task_type, payload)).await;
    if submitted.is_ok() {
        engine.wait_idle(POLL).await;
    }
    engine.stop().await;
    submitted?;

    let Some(report) = engine.task(&TaskId::new(id)) else {
        bail!("task {id} did not settle");
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
