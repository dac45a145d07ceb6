//! Task model: the unit of autonomous work.
//!
//! Tasks are created by the goal planner and the proactive scheduler,
//! dispatched by the execution loop, and mutated only through the
//! [`queue::TaskStore`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod queue;

pub use queue::{QueueSummary, TaskStore};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Dispatch precedence buckets, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    /// Dispatched before everything else.
    Critical,
    /// User-triggered goals default here.
    High,
    /// Planner default.
    #[default]
    Normal,
    /// Housekeeping work.
    Background,
}

/// Priorities in dispatch order for the queue scan.
pub const DISPATCH_ORDER: [TaskPriority; 4] = [
    TaskPriority::Critical,
    TaskPriority::High,
    TaskPriority::Normal,
    TaskPriority::Background,
];

/// Task lifecycle state.
///
/// `Completed`, `Failed`, and `Cancelled` are terminal. A task may bounce
/// between `Pending` and `InProgress` while retries remain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for dispatch.
    #[default]
    Pending,
    /// Currently being executed; at most one task at a time.
    InProgress,
    /// Finished with a result.
    Completed,
    /// Exhausted its retry budget.
    Failed,
    /// Waiting on something outside the queue.
    Blocked,
    /// Withdrawn before completion.
    Cancelled,
}

impl TaskStatus {
    /// Whether this status admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Handler category for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    /// Subprocess execution.
    Shell,
    /// Read/write/create/delete a file.
    File,
    /// Fetch a URL or run a lite search.
    Web,
    /// Delegate to the external API router.
    Api,
    /// Pure LLM reasoning.
    #[default]
    Think,
}

impl TaskType {
    /// Parse a planner-produced type string, falling back to `Think` for
    /// anything unrecognised.
    pub fn parse_lossy(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "shell" => Self::Shell,
            "file" => Self::File,
            "web" => Self::Web,
            "api" => Self::Api,
            _ => Self::Think,
        }
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A single executable task in the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Short opaque identifier, unique within the queue.
    pub id: String,
    /// Originating high-level goal; shared by sibling tasks of one plan.
    pub goal: String,
    /// Natural-language description of what to do.
    #[serde(default)]
    pub action: String,
    /// Handler category.
    #[serde(default)]
    pub task_type: TaskType,
    /// Concrete payload (shell string, URL, strategy hint). Reflection may
    /// rewrite this between attempts.
    #[serde(default)]
    pub command: String,
    /// Dispatch precedence bucket.
    #[serde(default)]
    pub priority: TaskPriority,
    /// Lifecycle state.
    #[serde(default)]
    pub status: TaskStatus,
    /// The task that spawned this one, if any.
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Tasks that must complete before this one is runnable.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Output text on success.
    #[serde(default)]
    pub result: Option<String>,
    /// Last error message on failure.
    #[serde(default)]
    pub error: Option<String>,
    /// One descriptor per past attempt; the length is the retry count.
    #[serde(default)]
    pub attempts: Vec<String>,
    /// Creation timestamp.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Completion timestamp, set exactly once.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a pending task with a fresh id.
    pub fn new(
        goal: impl Into<String>,
        action: impl Into<String>,
        task_type: TaskType,
        command: impl Into<String>,
        priority: TaskPriority,
    ) -> Self {
        Self {
            id: new_task_id(),
            goal: goal.into(),
            action: action.into(),
            task_type,
            command: command.into(),
            priority,
            status: TaskStatus::Pending,
            parent_id: None,
            depends_on: Vec::new(),
            result: None,
            error: None,
            attempts: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Set the dependency list.
    #[must_use]
    pub fn with_depends_on(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }
}

/// Generate a short opaque task id (8 hex characters).
pub fn new_task_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}
