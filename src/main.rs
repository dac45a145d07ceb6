#![allow(missing_docs)]

//! Volition binary: boots the agent runtime and exposes a small CLI.
//!
//! `start` runs the execution loop and the proactive scheduler until
//! interrupted; `status` prints the queue and scheduler snapshot; `plan`
//! decomposes a goal into tasks and enqueues them for the next `start`.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use volition::agent::{agent_status, ExecutionLoop};
use volition::config::Config;
use volition::executor::TaskExecutor;
use volition::llm::ollama::OllamaClient;
use volition::llm::LlmClient;
use volition::logging::LogMode;
use volition::memory::InMemoryStore;
use volition::planner::GoalPlanner;
use volition::prompts;
use volition::reflection::SelfReflection;
use volition::scheduler::ProactiveScheduler;
use volition::tasks::{TaskPriority, TaskStore};

#[derive(Debug, Parser)]
#[command(name = "volition", version, about = "Autonomous agent runtime over a local LLM")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the agent: execution loop plus proactive scheduler.
    Start,
    /// Print queue counts and scheduled jobs as JSON.
    Status,
    /// Decompose a goal into tasks and enqueue them.
    Plan {
        /// The goal to decompose.
        goal: String,
        /// Priority for the planned tasks.
        #[arg(long, default_value = "high")]
        priority: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Start => start().await,
        Command::Status => status().await,
        Command::Plan { goal, priority } => plan(&goal, &priority).await,
    }
}

/// Shared wiring for every subcommand.
struct Runtime {
    config: Config,
    store: Arc<TaskStore>,
    llm: Arc<dyn LlmClient>,
    planner: Arc<GoalPlanner>,
}

fn build_runtime() -> Result<Runtime> {
    let config = Config::load()?;
    let store = Arc::new(TaskStore::open(
        config.queue.path.clone(),
        config.queue.max_retries,
    ));
    let llm: Arc<dyn LlmClient> =
        Arc::new(OllamaClient::new(&config.llm).context("failed to build LLM client")?);
    let system_prompt = prompts::system_prompt(&config.agent.name, &config.autonomy);
    let planner = Arc::new(GoalPlanner::new(
        Arc::clone(&llm),
        Arc::clone(&store),
        system_prompt,
    ));
    Ok(Runtime {
        config,
        store,
        llm,
        planner,
    })
}

async fn start() -> Result<()> {
    let config = Config::load()?;
    let _logging = volition::logging::init(LogMode::Agent(&config.agent))?;
    let runtime = build_runtime()?;
    info!(name = %runtime.config.agent.name, "agent starting");

    if !runtime.llm.is_available().await {
        warn!(
            host = %runtime.config.llm.host,
            "model backend is not reachable; tasks will fail until it comes up"
        );
    }

    let system_prompt = prompts::system_prompt(
        &runtime.config.agent.name,
        &runtime.config.autonomy,
    );
    let executor = Arc::new(TaskExecutor::new(
        Arc::clone(&runtime.llm),
        runtime.config.autonomy.clone(),
        &runtime.config.executor,
        system_prompt,
    )?);

    let memory = Arc::new(InMemoryStore::new());
    let reflection = Arc::new(
        SelfReflection::new(Arc::clone(&runtime.llm), Arc::clone(&runtime.store))
            .with_memory(memory),
    );

    let execution_loop = ExecutionLoop::new(
        Arc::clone(&runtime.store),
        executor,
        &runtime.config.agent,
    )
    .with_reflection(reflection);

    let scheduler = ProactiveScheduler::new(
        Arc::clone(&runtime.planner),
        Arc::clone(&runtime.store),
        runtime.config.scheduler.clone(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let loop_rx = shutdown_rx.clone();
    let loop_handle = tokio::spawn(async move { execution_loop.run(loop_rx).await });
    let scheduler_handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = tokio::join!(loop_handle, scheduler_handle);
    info!("agent stopped");
    Ok(())
}

async fn status() -> Result<()> {
    volition::logging::init(LogMode::Cli)?;
    let runtime = build_runtime()?;
    let scheduler = ProactiveScheduler::new(
        Arc::clone(&runtime.planner),
        Arc::clone(&runtime.store),
        runtime.config.scheduler.clone(),
    );
    let status = agent_status(&runtime.store, scheduler.jobs());
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn plan(goal: &str, priority: &str) -> Result<()> {
    volition::logging::init(LogMode::Cli)?;
    let runtime = build_runtime()?;
    let priority = parse_priority(priority)?;
    let tasks = runtime.planner.plan(goal, "", priority).await?;
    for task in &tasks {
        println!("{}  [{:?}] {}", task.id, task.task_type, task.action);
    }
    Ok(())
}

fn parse_priority(s: &str) -> Result<TaskPriority> {
    match s.to_lowercase().as_str() {
        "critical" => Ok(TaskPriority::Critical),
        "high" => Ok(TaskPriority::High),
        "normal" => Ok(TaskPriority::Normal),
        "background" => Ok(TaskPriority::Background),
        other => anyhow::bail!("unknown priority: {other}"),
    }
}
