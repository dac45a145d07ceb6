//! The autonomous execution loop.
//!
//! A single-consumer dispatcher over the shared [`TaskStore`]: pull the next
//! runnable task, run it through the [`TaskExecutor`], record the outcome,
//! and hand retryable failures to the [`ReflectionHook`]. At most one task
//! is in progress at any time; cron-triggered enqueues land in the queue and
//! wait their turn.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::AgentConfig;
use crate::executor::{TaskError, TaskExecutor};
use crate::scheduler::JobInfo;
use crate::tasks::{QueueSummary, Task, TaskStatus, TaskStore};

// ---------------------------------------------------------------------------
// Reflection seam
// ---------------------------------------------------------------------------

/// Callback invoked after a failure that left the task eligible for retry.
///
/// The loop consumes this interface instead of a concrete reflection engine
/// so the wiring stays at construction time. The default is [`NoopReflection`].
#[async_trait]
pub trait ReflectionHook: Send + Sync {
    /// Called with the failed task (already back in `pending`) and the error.
    async fn on_failure(&self, task: &Task, error: &str);
}

/// Hook that does nothing; retries reuse the unchanged command.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReflection;

#[async_trait]
impl ReflectionHook for NoopReflection {
    async fn on_failure(&self, _task: &Task, _error: &str) {}
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// The latest recorded error for a task, for the status view.
#[derive(Debug, Clone, Serialize)]
pub struct TaskErrorInfo {
    /// Task identifier.
    pub id: String,
    /// Task action description.
    pub action: String,
    /// Last error message.
    pub error: String,
    /// Whether the task has terminally failed.
    pub terminal: bool,
}

/// Snapshot returned by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    /// Counts by task status.
    pub queue: QueueSummary,
    /// Tasks waiting for dispatch.
    pub pending: usize,
    /// Whether a task is currently executing.
    pub in_progress: bool,
    /// Latest error per task that has one; terminal failures stay visible
    /// until completed tasks are cleared.
    pub errors: Vec<TaskErrorInfo>,
    /// Scheduled jobs with their next run times.
    pub scheduled_jobs: Vec<JobInfo>,
}

/// Assemble the status snapshot from the store and the scheduler's job list.
pub fn agent_status(store: &TaskStore, scheduled_jobs: Vec<JobInfo>) -> AgentStatus {
    let queue = store.summary();
    let errors = store
        .all()
        .into_iter()
        .filter_map(|task| {
            task.error.clone().map(|error| TaskErrorInfo {
                id: task.id.clone(),
                action: task.action.clone(),
                error,
                terminal: task.status == TaskStatus::Failed,
            })
        })
        .collect();
    AgentStatus {
        pending: queue.pending,
        in_progress: queue.in_progress > 0,
        queue,
        errors,
        scheduled_jobs,
    }
}

// ---------------------------------------------------------------------------
// Execution loop
// ---------------------------------------------------------------------------

/// The autonomous Reason-Act dispatcher.
pub struct ExecutionLoop {
    store: Arc<TaskStore>,
    executor: Arc<TaskExecutor>,
    hook: Arc<dyn ReflectionHook>,
    idle_poll: Duration,
    inter_task: Duration,
}

impl ExecutionLoop {
    /// Create a loop with no reflection wired.
    pub fn new(store: Arc<TaskStore>, executor: Arc<TaskExecutor>, cfg: &AgentConfig) -> Self {
        Self {
            store,
            executor,
            hook: Arc::new(NoopReflection),
            idle_poll: Duration::from_secs(cfg.idle_poll_secs),
            inter_task: Duration::from_secs(cfg.inter_task_secs),
        }
    }

    /// Install a reflection hook.
    #[must_use]
    pub fn with_reflection(mut self, hook: Arc<dyn ReflectionHook>) -> Self {
        self.hook = hook;
        self
    }

    /// Run until the shutdown signal flips.
    ///
    /// The signal is observed at the top of each iteration and during every
    /// sleep. An in-flight subprocess is not killed on shutdown; its timeout
    /// bounds how long it can linger.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("execution loop started");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let Some(task) = self.store.next_runnable() else {
                if sleep_or_shutdown(&mut shutdown_rx, self.idle_poll).await {
                    break;
                }
                continue;
            };

            info!(task_id = %task.id, action = %task.action, "executing task");
            if let Err(e) = self.store.mark_in_progress(&task.id) {
                warn!(task_id = %task.id, error = %e, "could not claim task");
                continue;
            }

            self.dispatch(&task).await;

            if sleep_or_shutdown(&mut shutdown_rx, self.inter_task).await {
                break;
            }
        }

        info!("execution loop stopped");
    }

    /// Execute one claimed task and record the outcome.
    async fn dispatch(&self, task: &Task) {
        match self.executor.execute(task).await {
            Ok(result) => {
                if let Err(e) = self.store.mark_completed(&task.id, &result) {
                    error!(task_id = %task.id, error = %e, "failed to record completion");
                }
                let preview: String = result.chars().take(100).collect();
                info!(task_id = %task.id, result = %preview, "task completed");
            }
            Err(task_error) => {
                let error_msg = task_error.to_string();
                warn!(task_id = %task.id, error = %error_msg, "task failed");

                let approach = if task.command.is_empty() {
                    &task.action
                } else {
                    &task.command
                };
                let attempt = format!("Attempt with approach: {approach}");
                if let Err(e) = self.store.mark_failed(&task.id, &error_msg, &attempt) {
                    error!(task_id = %task.id, error = %e, "failed to record failure");
                    return;
                }

                if task_error.skips_reflection() {
                    return;
                }
                // Reflect only when the store put the task back in pending.
                if let Some(updated) = self.store.get(&task.id) {
                    if updated.status == TaskStatus::Pending {
                        info!(task_id = %task.id, "triggering self-reflection");
                        self.hook.on_failure(&updated, &error_msg).await;
                    }
                }
            }
        }
    }

    /// Execute a single task outside the loop (manual or test use).
    ///
    /// # Errors
    ///
    /// Propagates the executor's [`TaskError`].
    pub async fn execute_single(&self, task: &Task) -> Result<String, TaskError> {
        self.executor.execute(task).await
    }
}

/// Sleep for `duration`, returning `true` if shutdown fired first.
async fn sleep_or_shutdown(shutdown_rx: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    tokio::select! {
        () = tokio::time::sleep(duration) => false,
        result = shutdown_rx.changed() => result.is_err() || *shutdown_rx.borrow(),
    }
}
