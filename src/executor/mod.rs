//! Task execution: one handler per task type.
//!
//! The executor carries out a single task and returns its result text.
//! Handlers fail with a [`TaskError`]; the execution loop records the error
//! into the task's attempt history and decides on retry or terminal failure.
//! Policy checks happen here, immediately before the side effect, even when
//! the decision engine already approved the request.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::ExecutorConfig;
use crate::llm::{LlmClient, LlmError};
use crate::policy::AutonomyPolicy;
use crate::tasks::{Task, TaskType};

pub mod file;
pub mod shell;
pub mod web;

/// Timeout for web fetches.
const WEB_TIMEOUT_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors produced while executing a task.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The autonomy policy rejected the action. Not retried with a new
    /// strategy: reflection is skipped for these.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// A subprocess or fetch exceeded its time budget.
    #[error("timed out after {seconds}s: {detail}")]
    Timeout {
        /// The exceeded budget in seconds.
        seconds: u64,
        /// The command or URL that overran.
        detail: String,
    },
    /// The action ran and reported failure (non-zero exit, I/O error).
    #[error("execution failed: {0}")]
    Execution(String),
    /// Model-produced structured output the handler cannot use.
    #[error("invalid structured output: {0}")]
    Validation(String),
    /// LLM or HTTP connectivity failure.
    #[error("transport error: {0}")]
    Transport(String),
}

impl TaskError {
    /// Whether this failure should bypass self-reflection.
    ///
    /// A permission denial is a policy outcome, not a strategy problem; a
    /// revised command would still be blocked.
    pub fn skips_reflection(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }
}

impl From<LlmError> for TaskError {
    fn from(e: LlmError) -> Self {
        Self::Transport(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Per-task-type execution over the shared LLM transport.
pub struct TaskExecutor {
    llm: Arc<dyn LlmClient>,
    policy: AutonomyPolicy,
    http: reqwest::Client,
    shell_timeout: Duration,
    search_endpoint: String,
    system_prompt: String,
}

impl TaskExecutor {
    /// Build an executor.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(
        llm: Arc<dyn LlmClient>,
        policy: AutonomyPolicy,
        cfg: &ExecutorConfig,
        system_prompt: String,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(WEB_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            llm,
            policy,
            http,
            shell_timeout: Duration::from_secs(cfg.shell_timeout_secs),
            search_endpoint: cfg.search_endpoint.clone(),
            system_prompt,
        })
    }

    /// Carry out a single task, returning its result text.
    ///
    /// # Errors
    ///
    /// Returns a [`TaskError`] classifying the failure for retry handling.
    pub async fn execute(&self, task: &Task) -> Result<String, TaskError> {
        debug!(task_id = %task.id, task_type = ?task.task_type, "dispatching task");
        match task.task_type {
            TaskType::Shell => shell::execute_shell(self, task).await,
            TaskType::File => file::execute_file(self, task).await,
            TaskType::Web => web::execute_web(self, task).await,
            TaskType::Api => self.execute_api(task).await,
            TaskType::Think => self.execute_think(task).await,
        }
    }

    /// Delegate an escalated task toward the external API tier.
    ///
    /// The smart router owns the actual external call; this seam hands it
    /// the task text and returns the routed response.
    async fn execute_api(&self, task: &Task) -> Result<String, TaskError> {
        let prompt = format!(
            "Handle this API task: {}\nDetails: {}",
            task.action, task.command
        );
        Ok(self.llm.generate(&prompt, None, 0.3).await?)
    }

    /// Reason about the action with the full system prompt.
    async fn execute_think(&self, task: &Task) -> Result<String, TaskError> {
        let mut prompt = format!("Think about and respond to: {}", task.action);
        if !task.command.is_empty() {
            prompt.push_str("\nContext: ");
            prompt.push_str(&task.command);
        }
        Ok(self
            .llm
            .generate(&prompt, Some(&self.system_prompt), 0.7)
            .await?)
    }
}
