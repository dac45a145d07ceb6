//! Autonomy policy: the stateless predicates gating dangerous actions.
//!
//! Pure substring classification over configured risk lists — no I/O, no
//! model calls. The executor and decision engine consult these predicates
//! before any side-effect reaches the host.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Risk classification
// ---------------------------------------------------------------------------

/// Risk class assigned to an action description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// No matched risk pattern.
    #[default]
    Safe,
    /// Matched the moderate list.
    Moderate,
    /// Matched the dangerous list.
    Dangerous,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Safe => f.write_str("safe"),
            Self::Moderate => f.write_str("moderate"),
            Self::Dangerous => f.write_str("dangerous"),
        }
    }
}

/// Action categories with an individual auto-execution toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Shell command execution.
    Shell,
    /// File create/write/delete.
    Files,
    /// Package installation.
    Packages,
    /// Web fetches and searches.
    Web,
    /// Creating scheduled jobs.
    Schedule,
}

/// Autonomy level: full autonomy executes dangerous-but-permitted actions
/// without a human in the loop; supervised does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AutonomyLevel {
    /// Act without human confirmation wherever the toggles permit.
    #[default]
    Full,
    /// Dangerous actions always go back to the human.
    Supervised,
}

// ---------------------------------------------------------------------------
// Policy configuration
// ---------------------------------------------------------------------------

/// Substring lists for risk classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLists {
    /// Patterns classified as moderate risk.
    pub moderate: Vec<String>,
    /// Patterns classified as dangerous. Dangerous wins over moderate.
    pub dangerous: Vec<String>,
}

impl Default for RiskLists {
    fn default() -> Self {
        Self {
            moderate: vec![
                "install".to_owned(),
                "delete file".to_owned(),
                "kill".to_owned(),
                "chmod".to_owned(),
                "systemctl".to_owned(),
            ],
            dangerous: vec![
                "rm -rf".to_owned(),
                "mkfs".to_owned(),
                "dd if=".to_owned(),
                "shutdown".to_owned(),
                "reboot".to_owned(),
                "format disk".to_owned(),
            ],
        }
    }
}

/// The autonomy policy evaluated by the oracle predicates.
///
/// Loaded from the `[autonomy]` section of the config file; every field has
/// a permissive-but-guarded default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutonomyPolicy {
    /// Global autonomy level.
    pub level: AutonomyLevel,
    /// Allow unattended shell execution.
    pub auto_execute_shell: bool,
    /// Allow unattended file management.
    pub auto_manage_files: bool,
    /// Allow unattended package installation.
    pub auto_install_packages: bool,
    /// Allow unattended web access.
    pub auto_browse_web: bool,
    /// Allow the agent to create its own scheduled jobs.
    pub auto_schedule_tasks: bool,
    /// Substrings that force a human confirmation regardless of risk class.
    pub require_confirmation_for: Vec<String>,
    /// Risk classification lists.
    pub risk: RiskLists,
}

impl Default for AutonomyPolicy {
    fn default() -> Self {
        Self {
            level: AutonomyLevel::Full,
            auto_execute_shell: true,
            auto_manage_files: true,
            auto_install_packages: true,
            auto_browse_web: true,
            auto_schedule_tasks: true,
            require_confirmation_for: vec![
                "rm -rf".to_owned(),
                "mkfs".to_owned(),
                "dd if=".to_owned(),
            ],
            risk: RiskLists::default(),
        }
    }
}

impl AutonomyPolicy {
    /// Classify the risk of an action description.
    ///
    /// Case-insensitive substring match; the dangerous list wins over the
    /// moderate list. Total over arbitrary strings.
    pub fn risk_level(&self, action: &str) -> RiskLevel {
        let action_lower = action.to_lowercase();
        if self
            .risk
            .dangerous
            .iter()
            .any(|pattern| action_lower.contains(&pattern.to_lowercase()))
        {
            return RiskLevel::Dangerous;
        }
        if self
            .risk
            .moderate
            .iter()
            .any(|pattern| action_lower.contains(&pattern.to_lowercase()))
        {
            return RiskLevel::Moderate;
        }
        RiskLevel::Safe
    }

    /// Whether the command contains a confirmation-trigger substring.
    pub fn requires_confirmation(&self, command: &str) -> bool {
        self.require_confirmation_for
            .iter()
            .any(|trigger| command.contains(trigger))
    }

    /// Whether an action category may run without a human in the loop.
    pub fn can_auto_execute(&self, kind: ActionKind) -> bool {
        match kind {
            ActionKind::Shell => self.auto_execute_shell,
            ActionKind::Files => self.auto_manage_files,
            ActionKind::Packages => self.auto_install_packages,
            ActionKind::Web => self.auto_browse_web,
            ActionKind::Schedule => self.auto_schedule_tasks,
        }
    }

    /// Whether the global autonomy level is full.
    pub fn is_autonomous(&self) -> bool {
        self.level == AutonomyLevel::Full
    }
}
