//! Prompt construction for the planner, reflection engine, and think tasks.
//!
//! Prompts are plain `format!` templates. The structured ones pin the model
//! to a JSON schema; parse failures are handled by the callers, never here.

use crate::policy::AutonomyPolicy;

/// Build the base system prompt from the agent name and autonomy policy.
pub fn system_prompt(name: &str, policy: &AutonomyPolicy) -> String {
    let confirmation_actions = if policy.require_confirmation_for.is_empty() {
        "nothing (full autonomy)".to_owned()
    } else {
        policy.require_confirmation_for.join(", ")
    };
    format!(
        "You are {name}, an autonomous agent running on this machine.\n\
         \n\
         When you receive a task:\n\
         1. THINK: analyze what needs to be done\n\
         2. PLAN: break it into steps if complex\n\
         3. ACT: execute each step\n\
         4. OBSERVE: check the results\n\
         5. ADAPT: if something fails, reflect on why and try another approach\n\
         \n\
         You do not need human confirmation for most actions.\n\
         Only ask for confirmation for: {confirmation_actions}"
    )
}

/// Build the goal-decomposition prompt with the plan JSON schema.
pub fn goal_planning_prompt(goal: &str, context: &str) -> String {
    let context_line = if context.is_empty() {
        String::new()
    } else {
        format!("\nContext: {context}\n")
    };
    format!(
        "You are planning the execution of a goal. Break it down into concrete, executable steps.\n\
         \n\
         Goal: \"{goal}\"\n\
         {context_line}\n\
         Respond with ONLY valid JSON:\n\
         {{\n\
           \"goal\": \"the original goal\",\n\
           \"steps\": [\n\
             {{\"id\": 1, \"action\": \"description\", \"type\": \"shell|file|web|api|think\", \"command\": \"if shell, the exact command\", \"depends_on\": []}},\n\
             {{\"id\": 2, \"action\": \"description\", \"type\": \"shell|file|web|api|think\", \"command\": \"...\", \"depends_on\": [1]}}\n\
           ]\n\
         }}"
    )
}

/// Build the failure-analysis prompt with the attempt history.
pub fn reflection_prompt(action: &str, error: &str, attempts: &[String]) -> String {
    let attempts_text = attempts
        .iter()
        .enumerate()
        .map(|(i, attempt)| format!("  Attempt {}: {attempt}", i.saturating_add(1)))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "A task has failed. Analyze what went wrong and suggest a new approach.\n\
         \n\
         Task: \"{action}\"\n\
         Error: \"{error}\"\n\
         Previous attempts:\n\
         {attempts_text}\n\
         \n\
         Respond with ONLY valid JSON:\n\
         {{\n\
           \"root_cause\": \"what went wrong\",\n\
           \"new_strategy\": \"what to try differently\",\n\
           \"should_escalate\": false,\n\
           \"escalation_reason\": \"if should_escalate is true, why\"\n\
         }}"
    )
}
