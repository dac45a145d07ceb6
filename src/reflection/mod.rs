//! Self-reflection: failure analysis and strategy revision.
//!
//! After a retryable failure the reflection engine asks the model for a
//! root cause and a new strategy, then mutates the task through the queue
//! store: either the command is overwritten with the revised strategy, or
//! the task is escalated to the external API tier. Lessons learned are
//! written to long-term memory on a best-effort basis.
//!
//! Reflection never changes task status; the store already restored
//! `pending` when attempts remained.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::agent::ReflectionHook;
use crate::llm::{extract_json, LlmClient};
use crate::memory::MemoryStore;
use crate::prompts;
use crate::tasks::{Task, TaskStore};

/// Characters of raw model output kept as a strategy when parsing fails.
const RAW_STRATEGY_CAP: usize = 500;

/// Parsed outcome of one reflection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reflection {
    /// What went wrong.
    #[serde(default)]
    pub root_cause: String,
    /// What to try differently on the next attempt.
    #[serde(default)]
    pub new_strategy: String,
    /// Whether the task should be handed to the external tier.
    #[serde(default)]
    pub should_escalate: bool,
    /// Why escalation is warranted.
    #[serde(default)]
    pub escalation_reason: String,
}

/// One reflection as recorded in the history buffer.
#[derive(Debug, Clone, Serialize)]
pub struct ReflectionRecord {
    /// The failed task.
    pub task_id: String,
    /// Its action description.
    pub task_action: String,
    /// The error that triggered reflection.
    pub error: String,
    /// How many attempts had been made.
    pub attempt_number: usize,
    /// Diagnosed root cause.
    pub root_cause: String,
    /// Revised strategy, if any.
    pub new_strategy: String,
    /// Whether this reflection escalated.
    pub should_escalate: bool,
}

/// Aggregate view over the reflection history.
#[derive(Debug, Clone, Serialize)]
pub struct ReflectionSummary {
    /// Total reflections since startup.
    pub total_reflections: usize,
    /// How many of them escalated.
    pub escalations: usize,
    /// The five most recent records.
    pub recent: Vec<ReflectionRecord>,
}

/// Analyzes task failures and revises strategies through the store.
pub struct SelfReflection {
    llm: Arc<dyn LlmClient>,
    store: Arc<TaskStore>,
    memory: Option<Arc<dyn MemoryStore>>,
    history: Mutex<Vec<ReflectionRecord>>,
}

impl SelfReflection {
    /// Create a reflection engine without memory wiring.
    pub fn new(llm: Arc<dyn LlmClient>, store: Arc<TaskStore>) -> Self {
        Self {
            llm,
            store,
            memory: None,
            history: Mutex::new(Vec::new()),
        }
    }

    /// Wire a memory store for lesson persistence.
    #[must_use]
    pub fn with_memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    fn lock_history(&self) -> MutexGuard<'_, Vec<ReflectionRecord>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reflect on a failed task and apply the revised strategy.
    ///
    /// # Errors
    ///
    /// Returns an error on LLM transport failure or when the store cannot
    /// persist the mutation. Unparseable model output degrades to a raw
    /// truncated strategy rather than failing.
    pub async fn reflect(&self, task: &Task, error: &str) -> Result<Reflection> {
        info!(task_id = %task.id, action = %task.action, "reflecting on failure");

        let prompt = prompts::reflection_prompt(&task.action, error, &task.attempts);
        let response = self.llm.generate(&prompt, None, 0.3).await?;

        let reflection = match serde_json::from_str::<Reflection>(extract_json(&response)) {
            Ok(reflection) => reflection,
            Err(_) => Reflection {
                root_cause: "Unable to determine root cause".to_owned(),
                new_strategy: response.trim().chars().take(RAW_STRATEGY_CAP).collect(),
                should_escalate: false,
                escalation_reason: String::new(),
            },
        };

        self.lock_history().push(ReflectionRecord {
            task_id: task.id.clone(),
            task_action: task.action.clone(),
            error: error.to_owned(),
            attempt_number: task.attempts.len(),
            root_cause: reflection.root_cause.clone(),
            new_strategy: reflection.new_strategy.clone(),
            should_escalate: reflection.should_escalate,
        });

        info!(root_cause = %reflection.root_cause, "failure diagnosed");

        if reflection.should_escalate {
            info!(task_id = %task.id, "escalating task to the external tier");
            self.store.escalate(&task.id, &reflection.escalation_reason)?;
        } else if !reflection.new_strategy.is_empty() {
            info!(task_id = %task.id, "retrying with revised strategy");
            self.store.set_strategy(&task.id, &reflection.new_strategy)?;
        }

        self.store_lesson(task, &reflection).await;

        Ok(reflection)
    }

    /// Persist a lesson-learned document; failures are logged, not raised.
    async fn store_lesson(&self, task: &Task, reflection: &Reflection) {
        let Some(memory) = &self.memory else {
            return;
        };
        let lesson = format!(
            "LESSON LEARNED: When trying to '{}', it failed because: {}. Better approach: {}.",
            task.action,
            if reflection.root_cause.is_empty() {
                "unknown"
            } else {
                &reflection.root_cause
            },
            if reflection.new_strategy.is_empty() {
                "try differently"
            } else {
                &reflection.new_strategy
            },
        );
        let metadata = json!({"type": "lesson", "task": task.action});
        if let Err(e) = memory.store(&lesson, metadata).await {
            warn!(error = %e, "failed to store lesson in memory");
        }
    }

    /// Check memory for similar past failures and their solutions.
    ///
    /// Memory outages yield an empty list.
    pub async fn recall_similar_failures(&self, description: &str) -> Vec<String> {
        let Some(memory) = &self.memory else {
            return Vec::new();
        };
        let query = format!("lesson learned about: {description}");
        match memory
            .search(&query, 3, Some(json!({"type": "lesson"})))
            .await
        {
            Ok(hits) => hits.into_iter().map(|hit| hit.content).collect(),
            Err(e) => {
                warn!(error = %e, "lesson recall failed");
                Vec::new()
            }
        }
    }

    /// Aggregate view over all reflections since startup.
    pub fn summary(&self) -> ReflectionSummary {
        let history = self.lock_history();
        let recent_start = history.len().saturating_sub(5);
        ReflectionSummary {
            total_reflections: history.len(),
            escalations: history.iter().filter(|r| r.should_escalate).count(),
            recent: history.get(recent_start..).unwrap_or_default().to_vec(),
        }
    }
}

#[async_trait]
impl ReflectionHook for SelfReflection {
    async fn on_failure(&self, task: &Task, error: &str) {
        if let Err(e) = self.reflect(task, error).await {
            warn!(task_id = %task.id, error = %e, "reflection failed");
        }
    }
}
