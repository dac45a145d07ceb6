//! Decision engine: execute autonomously, ask the human, or refuse.
//!
//! Two LLM-assisted predicates sit in front of the planner: [`DecisionEngine::evaluate`]
//! decides how to handle an incoming request, and
//! [`DecisionEngine::classify_complexity`] grades it for routing. The policy
//! oracle always has the last word: confirmation triggers short-circuit
//! before any model call, and a dangerous classification outside full
//! autonomy is forced back to the human.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::llm::{extract_json, LlmClient, LlmError};
use crate::policy::{AutonomyPolicy, RiskLevel};

// ---------------------------------------------------------------------------
// Decision types
// ---------------------------------------------------------------------------

/// How the agent should handle a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    /// Proceed autonomously.
    #[default]
    Execute,
    /// Hand the request back to the human.
    AskHuman,
    /// Decline entirely.
    Refuse,
}

/// Outcome of evaluating a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    /// The chosen handling.
    #[serde(default)]
    pub action: DecisionAction,
    /// Risk class; seeded from the policy oracle.
    #[serde(default)]
    pub risk_level: RiskLevel,
    /// Whether a larger external model is needed.
    #[serde(default)]
    pub requires_external: bool,
    /// Brief model reasoning.
    #[serde(default)]
    pub reasoning: String,
    /// Suggested concrete approach.
    #[serde(default)]
    pub suggested_approach: String,
    /// Suggested task type string, when the model offers one.
    #[serde(default)]
    pub task_type: Option<String>,
    /// Estimated number of steps, when the model offers one.
    #[serde(default)]
    pub estimated_steps: Option<u32>,
}

/// Complexity grade for routing a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Complexity {
    /// 1 = simple, 2 = needs memory, 3 = external tier.
    #[serde(default = "default_level")]
    pub level: u8,
    /// Model self-reported confidence in `[0, 1]`.
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Whether retrieval should be engaged.
    #[serde(default)]
    pub needs_rag: bool,
    /// Brief model reasoning.
    #[serde(default)]
    pub reasoning: String,
}

fn default_level() -> u8 {
    1
}

fn default_confidence() -> f64 {
    1.0
}

/// A proactive action the agent proposes after observing the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProactiveAction {
    /// Whether action is warranted at all.
    #[serde(default)]
    pub should_act: bool,
    /// What to do.
    #[serde(default)]
    pub action: String,
    /// `immediate`, `soon`, or `when_convenient`.
    #[serde(default)]
    pub urgency: String,
    /// Why.
    #[serde(default)]
    pub reasoning: String,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// LLM-assisted decision making, bounded by the autonomy policy.
pub struct DecisionEngine {
    llm: Arc<dyn LlmClient>,
    policy: AutonomyPolicy,
    confidence_threshold: f64,
}

impl DecisionEngine {
    /// Create an engine over the given policy.
    pub fn new(llm: Arc<dyn LlmClient>, policy: AutonomyPolicy, confidence_threshold: f64) -> Self {
        Self {
            llm,
            policy,
            confidence_threshold,
        }
    }

    /// Evaluate a request and decide how to handle it.
    ///
    /// Confirmation-listed requests return `ask_human` without consulting
    /// the model. Unparseable model output defaults to `execute` at the
    /// oracle-computed risk level.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] only on transport failure.
    pub async fn evaluate(&self, request: &str, context: &str) -> Result<Decision, LlmError> {
        let risk = self.policy.risk_level(request);

        if self.policy.requires_confirmation(request) {
            debug!(request, "confirmation trigger matched, short-circuiting to ask_human");
            return Ok(Decision {
                action: DecisionAction::AskHuman,
                risk_level: RiskLevel::Dangerous,
                requires_external: false,
                reasoning: "This action requires human confirmation per safety policy.".to_owned(),
                suggested_approach: request.to_owned(),
                task_type: None,
                estimated_steps: None,
            });
        }

        let prompt = evaluation_prompt(request, context, self.policy.is_autonomous(), risk);
        let response = self.llm.generate(&prompt, None, 0.2).await?;

        let mut decision = match serde_json::from_str::<Decision>(extract_json(&response)) {
            Ok(decision) => decision,
            Err(e) => {
                warn!(error = %e, "unparseable decision, defaulting to execute");
                return Ok(Decision {
                    action: DecisionAction::Execute,
                    risk_level: risk,
                    requires_external: false,
                    reasoning: "Default decision: proceed with execution".to_owned(),
                    suggested_approach: request.to_owned(),
                    task_type: None,
                    estimated_steps: None,
                });
            }
        };

        if risk == RiskLevel::Dangerous && !self.policy.is_autonomous() {
            decision.action = DecisionAction::AskHuman;
            decision
                .reasoning
                .push_str(" (overridden: autonomy not fully enabled)");
        }

        Ok(decision)
    }

    /// Classify the complexity of a message for routing.
    ///
    /// A low-confidence grade below level 3 escalates to level 3.
    /// Unparseable model output defaults to level 1 at half confidence.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] only on transport failure.
    pub async fn classify_complexity(&self, message: &str) -> Result<Complexity, LlmError> {
        let prompt = complexity_prompt(message);
        let response = self.llm.generate(&prompt, None, 0.1).await?;

        let mut complexity = match serde_json::from_str::<Complexity>(extract_json(&response)) {
            Ok(complexity) => complexity,
            Err(e) => {
                warn!(error = %e, "unparseable complexity grade, defaulting to local");
                return Ok(Complexity {
                    level: 1,
                    confidence: 0.5,
                    needs_rag: false,
                    reasoning: "parse error, defaulting to local".to_owned(),
                });
            }
        };

        if complexity.confidence < self.confidence_threshold && complexity.level < 3 {
            complexity.reasoning = format!(
                "Low confidence ({}), escalating to external API",
                complexity.confidence
            );
            complexity.level = 3;
        }

        Ok(complexity)
    }

    /// Given an observation about the system, decide whether to act.
    ///
    /// Returns `None` when autonomy is not full, when the model advises
    /// against acting, or when its output is unparseable.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] only on transport failure.
    pub async fn should_proactively_act(
        &self,
        observation: &str,
    ) -> Result<Option<ProactiveAction>, LlmError> {
        if !self.policy.is_autonomous() {
            return Ok(None);
        }

        let prompt = proactive_prompt(observation);
        let response = self.llm.generate(&prompt, None, 0.3).await?;

        match serde_json::from_str::<ProactiveAction>(extract_json(&response)) {
            Ok(action) if action.should_act => Ok(Some(action)),
            Ok(_) => Ok(None),
            Err(_) => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

fn evaluation_prompt(request: &str, context: &str, autonomous: bool, risk: RiskLevel) -> String {
    let context_line = if context.is_empty() {
        String::new()
    } else {
        format!("Context: {context}\n")
    };
    let level = if autonomous { "full" } else { "supervised" };
    format!(
        "You are an autonomous agent making a decision.\n\
         \n\
         Request: \"{request}\"\n\
         {context_line}\
         Your autonomy level: {level}\n\
         \n\
         Evaluate this request and decide how to handle it.\n\
         Respond with ONLY valid JSON:\n\
         {{\n\
           \"action\": \"execute\",\n\
           \"risk_level\": \"{risk}\",\n\
           \"requires_external\": false,\n\
           \"reasoning\": \"brief reasoning\",\n\
           \"suggested_approach\": \"what to do\",\n\
           \"task_type\": \"shell|file|web|api|think\",\n\
           \"estimated_steps\": 1\n\
         }}\n\
         \n\
         Rules:\n\
         - action \"execute\" = proceed autonomously\n\
         - action \"ask_human\" = only for truly ambiguous or personal decisions\n\
         - action \"refuse\" = only for clearly harmful requests\n\
         - requires_external = true only if this needs a larger model"
    )
}

fn complexity_prompt(message: &str) -> String {
    format!(
        "Classify the complexity of this request:\n\
         \"{message}\"\n\
         \n\
         Level 1 = Simple (chat, basic Q&A), handled locally\n\
         Level 2 = Medium (needs memory/context), handled locally with retrieval\n\
         Level 3 = Complex (deep reasoning, code, math), routed to the external API\n\
         \n\
         Respond with JSON only: {{\"level\": 1, \"confidence\": 0.9, \"needs_rag\": false, \"reasoning\": \"brief\"}}"
    )
}

fn proactive_prompt(observation: &str) -> String {
    format!(
        "You observed something on the system:\n\
         \"{observation}\"\n\
         \n\
         Should you take proactive action? If yes, what should you do?\n\
         Respond with JSON:\n\
         {{\n\
           \"should_act\": true,\n\
           \"action\": \"what to do\",\n\
           \"urgency\": \"immediate|soon|when_convenient\",\n\
           \"reasoning\": \"why\"\n\
         }}"
    )
}
