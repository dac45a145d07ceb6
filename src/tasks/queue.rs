//! Durable task queue store.
//!
//! The store exclusively owns the task list. Every other component holds an
//! `Arc<TaskStore>` and mutates through its operations; the full list is
//! serialized to a single JSON file after every mutation, so the file is
//! never more than one mutation behind memory.
//!
//! Dispatch order: priorities are scanned highest-first, and within a
//! priority tasks are considered in insertion order. Retries re-enter
//! `pending` at their original position, so an old task cannot be starved
//! by newer tasks of the same priority.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::{Task, TaskStatus, TaskType, DISPATCH_ORDER};

/// Counts by status for the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueSummary {
    /// All tasks currently in the queue file.
    pub total: usize,
    /// Tasks waiting for dispatch.
    pub pending: usize,
    /// Tasks currently executing (0 or 1 under the single-consumer loop).
    pub in_progress: usize,
    /// Terminally succeeded tasks.
    pub completed: usize,
    /// Terminally failed tasks.
    pub failed: usize,
    /// Blocked tasks.
    pub blocked: usize,
    /// Cancelled tasks.
    pub cancelled: usize,
}

/// The durable task queue.
///
/// Operations serialize through an internal mutex; the critical sections
/// include the persistence write so that on-disk ordering matches the
/// in-memory mutation order.
#[derive(Debug)]
pub struct TaskStore {
    path: PathBuf,
    max_retries: usize,
    tasks: Mutex<Vec<Task>>,
}

impl TaskStore {
    /// Open the store, restoring any existing queue file.
    ///
    /// A missing file starts an empty queue. A malformed file is logged and
    /// discarded; the agent boots with an empty queue rather than aborting.
    pub fn open(path: impl Into<PathBuf>, max_retries: usize) -> Self {
        let path = path.into();
        let tasks = load_queue_file(&path);
        let pending = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .count();
        info!(
            path = %path.display(),
            total = tasks.len(),
            pending,
            "task queue loaded"
        );
        Self {
            path,
            max_retries,
            tasks: Mutex::new(tasks),
        }
    }

    /// The configured retry budget.
    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Task>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a single task and persist.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue file cannot be written; the in-memory
    /// mutation is retained.
    pub fn add(&self, task: Task) -> Result<()> {
        let mut tasks = self.lock();
        tasks.push(task);
        self.persist(&tasks)
    }

    /// Append a batch of tasks with a single persistence write.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue file cannot be written.
    pub fn add_all(&self, batch: Vec<Task>) -> Result<()> {
        let mut tasks = self.lock();
        tasks.extend(batch);
        self.persist(&tasks)
    }

    /// Snapshot a task by id.
    pub fn get(&self, id: &str) -> Option<Task> {
        self.lock().iter().find(|t| t.id == id).cloned()
    }

    /// Snapshot the whole queue.
    pub fn all(&self) -> Vec<Task> {
        self.lock().clone()
    }

    /// The single highest-priority runnable task, if any.
    ///
    /// A task is runnable iff it is pending and every dependency is
    /// completed. Does not mutate status.
    pub fn next_runnable(&self) -> Option<Task> {
        let tasks = self.lock();
        for priority in DISPATCH_ORDER {
            for task in tasks.iter() {
                if task.status != TaskStatus::Pending || task.priority != priority {
                    continue;
                }
                let deps_met = task.depends_on.iter().all(|dep| {
                    tasks
                        .iter()
                        .any(|t| t.id == *dep && t.status == TaskStatus::Completed)
                });
                if deps_met {
                    return Some(task.clone());
                }
            }
        }
        None
    }

    /// Transition a pending task to in-progress.
    ///
    /// # Errors
    ///
    /// Returns an error if the task is missing or not pending, or if the
    /// queue file cannot be written.
    pub fn mark_in_progress(&self, id: &str) -> Result<()> {
        let mut tasks = self.lock();
        let task = find_mut(&mut tasks, id)?;
        if task.status != TaskStatus::Pending {
            anyhow::bail!("task {id} is {:?}, expected pending", task.status);
        }
        task.status = TaskStatus::InProgress;
        self.persist(&tasks)
    }

    /// Record a successful result and complete the task.
    ///
    /// Idempotent for a task that is already completed: the result and the
    /// completion timestamp are left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the task is missing or the file write fails.
    pub fn mark_completed(&self, id: &str, result: &str) -> Result<()> {
        let mut tasks = self.lock();
        let task = find_mut(&mut tasks, id)?;
        if task.status == TaskStatus::Completed {
            return Ok(());
        }
        task.status = TaskStatus::Completed;
        task.result = Some(result.to_owned());
        task.completed_at = Some(Utc::now());
        self.persist(&tasks)
    }

    /// Record a failed attempt.
    ///
    /// Appends the attempt descriptor (falling back to the error text) and
    /// either returns the task to `pending` for retry or, once the retry
    /// budget is exhausted, transitions it terminally to `failed`.
    ///
    /// # Errors
    ///
    /// Returns an error if the task is missing or the file write fails.
    pub fn mark_failed(&self, id: &str, error: &str, attempt: &str) -> Result<()> {
        let mut tasks = self.lock();
        let task = find_mut(&mut tasks, id)?;
        task.error = Some(error.to_owned());
        let descriptor = if attempt.is_empty() { error } else { attempt };
        task.attempts.push(descriptor.to_owned());
        task.status = if task.attempts.len() >= self.max_retries {
            TaskStatus::Failed
        } else {
            TaskStatus::Pending
        };
        self.persist(&tasks)
    }

    /// Overwrite a task's command with a revised strategy.
    ///
    /// # Errors
    ///
    /// Returns an error if the task is missing or the file write fails.
    pub fn set_strategy(&self, id: &str, command: &str) -> Result<()> {
        let mut tasks = self.lock();
        let task = find_mut(&mut tasks, id)?;
        task.command = command.to_owned();
        self.persist(&tasks)
    }

    /// Escalate a task to the external API tier.
    ///
    /// # Errors
    ///
    /// Returns an error if the task is missing or the file write fails.
    pub fn escalate(&self, id: &str, reason: &str) -> Result<()> {
        let mut tasks = self.lock();
        let task = find_mut(&mut tasks, id)?;
        task.task_type = TaskType::Api;
        task.command = format!("Escalated: {reason}");
        self.persist(&tasks)
    }

    /// Number of pending tasks.
    pub fn pending_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .count()
    }

    /// Counts by status.
    pub fn summary(&self) -> QueueSummary {
        let tasks = self.lock();
        let count = |status: TaskStatus| tasks.iter().filter(|t| t.status == status).count();
        QueueSummary {
            total: tasks.len(),
            pending: count(TaskStatus::Pending),
            in_progress: count(TaskStatus::InProgress),
            completed: count(TaskStatus::Completed),
            failed: count(TaskStatus::Failed),
            blocked: count(TaskStatus::Blocked),
            cancelled: count(TaskStatus::Cancelled),
        }
    }

    /// Remove exactly the completed tasks.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue file cannot be written.
    pub fn clear_completed(&self) -> Result<()> {
        let mut tasks = self.lock();
        tasks.retain(|t| t.status != TaskStatus::Completed);
        self.persist(&tasks)
    }

    /// Write the full task list to the queue file.
    fn persist(&self, tasks: &[Task]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create queue directory {}", parent.display())
                })?;
            }
        }
        let json = serde_json::to_string_pretty(tasks).context("failed to serialize queue")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("failed to write queue file {}", self.path.display()))
    }
}

fn find_mut<'a>(tasks: &'a mut [Task], id: &str) -> Result<&'a mut Task> {
    tasks
        .iter_mut()
        .find(|t| t.id == id)
        .ok_or_else(|| anyhow::anyhow!("no task with id {id} in queue"))
}

fn load_queue_file(path: &Path) -> Vec<Task> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read queue file, starting empty");
            return Vec::new();
        }
    };
    match serde_json::from_str(&contents) {
        Ok(tasks) => tasks,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "malformed queue file, starting empty");
            Vec::new()
        }
    }
}
