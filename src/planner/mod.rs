//! Goal planner: decomposes high-level goals into dependency-linked tasks.
//!
//! The planner asks the LLM for a step list in a fixed JSON schema, rewrites
//! the plan-local integer ids into queue task ids, and appends the whole
//! batch to the store in one persistence write. Malformed model output never
//! aborts a request; it degrades to a single `think` task carrying the goal.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use serde::Deserialize;
use tracing::{info, warn};

use crate::llm::{extract_json, LlmClient};
use crate::prompts;
use crate::tasks::{Task, TaskPriority, TaskStore, TaskType};

/// One step of a plan as produced by the model.
#[derive(Debug, Deserialize)]
struct PlanStep {
    /// Plan-local id referenced by `depends_on` of later steps.
    id: Option<i64>,
    #[serde(default)]
    action: String,
    #[serde(default, rename = "type")]
    step_type: String,
    #[serde(default)]
    command: String,
    #[serde(default)]
    depends_on: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct PlanDocument {
    #[serde(default)]
    steps: Vec<PlanStep>,
}

/// Decomposes goals into executable tasks on the shared queue.
pub struct GoalPlanner {
    llm: Arc<dyn LlmClient>,
    store: Arc<TaskStore>,
    system_prompt: String,
}

impl GoalPlanner {
    /// Create a planner over the shared store.
    pub fn new(llm: Arc<dyn LlmClient>, store: Arc<TaskStore>, system_prompt: String) -> Self {
        Self {
            llm,
            store,
            system_prompt,
        }
    }

    /// The queue this planner appends to.
    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    /// Decompose a goal into tasks and append them to the queue.
    ///
    /// Plan-local `depends_on` references are rewritten to task ids; unknown
    /// references are dropped rather than failing the plan.
    ///
    /// # Errors
    ///
    /// Returns an error only when the LLM transport fails or the queue file
    /// cannot be written. Unparseable model output falls back to a
    /// single-task plan.
    pub async fn plan(
        &self,
        goal: &str,
        context: &str,
        priority: TaskPriority,
    ) -> Result<Vec<Task>> {
        info!(goal, "planning goal");

        let prompt = prompts::goal_planning_prompt(goal, context);
        let response = self
            .llm
            .generate(&prompt, Some(&self.system_prompt), 0.3)
            .await?;

        let steps = match serde_json::from_str::<PlanDocument>(extract_json(&response)) {
            Ok(plan) => plan.steps,
            Err(e) => {
                let preview: String = response.chars().take(200).collect();
                warn!(error = %e, response = %preview, "failed to parse plan, creating single task");
                vec![PlanStep {
                    id: Some(1),
                    action: goal.to_owned(),
                    step_type: "think".to_owned(),
                    command: String::new(),
                    depends_on: Vec::new(),
                }]
            }
        };

        let tasks = build_tasks(goal, priority, &steps);
        self.store.add_all(tasks.clone())?;

        info!(goal, count = tasks.len(), "plan created");
        Ok(tasks)
    }
}

/// Materialise plan steps as tasks and rewrite plan-local dependency ids.
fn build_tasks(goal: &str, priority: TaskPriority, steps: &[PlanStep]) -> Vec<Task> {
    let mut tasks: Vec<Task> = Vec::with_capacity(steps.len());
    let mut id_mapping: HashMap<i64, String> = HashMap::new();

    for (index, step) in steps.iter().enumerate() {
        let task = Task::new(
            goal,
            step.action.clone(),
            TaskType::parse_lossy(&step.step_type),
            step.command.clone(),
            priority,
        );
        let local_id = step
            .id
            .unwrap_or_else(|| i64::try_from(index.saturating_add(1)).unwrap_or(i64::MAX));
        id_mapping.insert(local_id, task.id.clone());
        tasks.push(task);
    }

    for (task, step) in tasks.iter_mut().zip(steps) {
        task.depends_on = step
            .depends_on
            .iter()
            .filter_map(|dep| id_mapping.get(dep).cloned())
            .collect();
    }

    tasks
}
