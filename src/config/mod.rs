//! Configuration loading and management.
//!
//! Loads runtime configuration from `./volition.toml` (or
//! `$VOLITION_CONFIG_PATH`). Environment variables override file values;
//! file values override defaults.
//!
//! Precedence: env vars > config file > defaults.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::policy::AutonomyPolicy;

// ── Top-level config ────────────────────────────────────────────

/// Top-level runtime configuration loaded from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Agent identity and execution-loop pacing.
    pub agent: AgentConfig,
    /// Durable task queue settings.
    pub queue: QueueConfig,
    /// Local LLM transport settings.
    pub llm: LlmConfig,
    /// Proactive scheduler settings.
    pub scheduler: SchedulerConfig,
    /// Task executor settings.
    pub executor: ExecutorConfig,
    /// Request routing settings.
    pub router: RouterConfig,
    /// Autonomy policy: risk lists, toggles, confirmation triggers.
    pub autonomy: AutonomyPolicy,
}

impl Config {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// Config file path: `$VOLITION_CONFIG_PATH` or `./volition.toml`.
    /// A missing file is not an error; defaults apply.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from the TOML file only, no env overrides.
    fn load_from_file() -> Result<Self> {
        let path = Self::config_path();
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                let config: Config =
                    toml::from_str(&contents).context("failed to parse config TOML")?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no config file found, using defaults");
                Ok(Config::default())
            }
            Err(e) => Err(anyhow::anyhow!("failed to read config file: {e}")),
        }
    }

    /// Resolve the config file path.
    fn config_path() -> PathBuf {
        match std::env::var("VOLITION_CONFIG_PATH") {
            Ok(p) => PathBuf::from(p),
            Err(_) => PathBuf::from("volition.toml"),
        }
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function for testability (avoids `set_var` in tests).
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        // Queue.
        if let Some(v) = env("AUTONOMY_TASK_QUEUE_PATH") {
            self.queue.path = PathBuf::from(v);
        }
        override_parsed(&mut self.queue.max_retries, "AUTONOMY_MAX_RETRIES", &env);

        // Scheduler.
        if let Some(v) = env("SCHEDULER_JOBS_PATH") {
            self.scheduler.jobs_path = PathBuf::from(v);
        }
        override_parsed(
            &mut self.scheduler.health_check_interval_hours,
            "SCHEDULER_HEALTH_CHECK_INTERVAL_HOURS",
            &env,
        );
        override_parsed(
            &mut self.scheduler.memory_consolidation_hours,
            "SCHEDULER_MEMORY_CONSOLIDATION_HOURS",
            &env,
        );
        override_parsed(
            &mut self.scheduler.evolution_schedule_hours,
            "EVOLUTION_SCHEDULE_HOURS",
            &env,
        );
        override_parsed(
            &mut self.scheduler.evolution_min_samples,
            "EVOLUTION_MIN_SAMPLES",
            &env,
        );

        // Executor.
        override_parsed(&mut self.executor.shell_timeout_secs, "SHELL_TIMEOUT", &env);

        // Router.
        override_parsed(
            &mut self.router.confidence_threshold,
            "ROUTER_CONFIDENCE_THRESHOLD",
            &env,
        );

        // LLM.
        if let Some(v) = env("OLLAMA_HOST") {
            self.llm.host = v;
        }
        if let Some(v) = env("VOLITION_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = env("EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        override_parsed(&mut self.llm.context_length, "VOLITION_CONTEXT_LENGTH", &env);
        override_parsed(&mut self.llm.timeout_secs, "OLLAMA_TIMEOUT", &env);
    }
}

/// Parse an env override into a typed field, warning on invalid values.
fn override_parsed<T: std::str::FromStr>(
    field: &mut T,
    key: &str,
    env: &impl Fn(&str) -> Option<String>,
) {
    if let Some(v) = env(key) {
        match v.parse() {
            Ok(parsed) => *field = parsed,
            Err(_) => tracing::warn!(var = key, value = %v, "ignoring invalid env override"),
        }
    }
}

// ── Sections ────────────────────────────────────────────────────

/// Agent identity and loop pacing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Display name used in system prompts.
    pub name: String,
    /// Sleep between queue polls when no task is runnable, in seconds.
    pub idle_poll_secs: u64,
    /// Sleep between task dispatches, in seconds.
    pub inter_task_secs: u64,
    /// Directory for rotated JSON log files.
    pub logs_dir: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "Volition".to_owned(),
            idle_poll_secs: 5,
            inter_task_secs: 1,
            logs_dir: PathBuf::from("./data/logs"),
        }
    }
}

/// Durable task queue settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Path of the JSON queue file.
    pub path: PathBuf,
    /// Maximum attempts per task before it terminally fails.
    pub max_retries: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/task_queue.json"),
            max_retries: 3,
        }
    }
}

/// Local LLM transport settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of the Ollama daemon.
    pub host: String,
    /// Completion model name.
    pub model: String,
    /// Embedding model name.
    pub embedding_model: String,
    /// Context window requested per call.
    pub context_length: u32,
    /// Request timeout in seconds. CPU inference can be slow; the timeout
    /// surfaces as a sentinel response, not an error.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:11434".to_owned(),
            model: "llama3".to_owned(),
            embedding_model: "nomic-embed-text".to_owned(),
            context_length: 16384,
            timeout_secs: 600,
        }
    }
}

/// Built-in scheduled behaviors that can be switched off individually.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BehaviorFlags {
    /// Periodic system health check.
    pub daily_health_check: bool,
    /// Periodic memory consolidation.
    pub auto_memory_consolidation: bool,
    /// Periodic training-data readiness check.
    pub auto_evolution_trigger: bool,
    /// Six-hourly disk space monitor.
    pub monitor_disk_space: bool,
}

impl Default for BehaviorFlags {
    fn default() -> Self {
        Self {
            daily_health_check: true,
            auto_memory_consolidation: true,
            auto_evolution_trigger: true,
            monitor_disk_space: true,
        }
    }
}

/// Proactive scheduler settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Path of the dynamic-jobs JSON file.
    pub jobs_path: PathBuf,
    /// Tick interval for cron evaluation, in seconds.
    pub tick_secs: u64,
    /// Built-in health check interval, in hours.
    pub health_check_interval_hours: u64,
    /// Built-in memory consolidation interval, in hours.
    pub memory_consolidation_hours: u64,
    /// Built-in evolution-readiness interval, in hours.
    pub evolution_schedule_hours: u64,
    /// Sample count threshold the evolution check reports against.
    pub evolution_min_samples: u64,
    /// Per-behavior enable flags.
    pub behaviors: BehaviorFlags,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            jobs_path: PathBuf::from("./data/scheduled_jobs.json"),
            tick_secs: 60,
            health_check_interval_hours: 24,
            memory_consolidation_hours: 168,
            evolution_schedule_hours: 168,
            evolution_min_samples: 200,
            behaviors: BehaviorFlags::default(),
        }
    }
}

/// Task executor settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Shell subprocess timeout, in seconds.
    pub shell_timeout_secs: u64,
    /// Lite search endpoint the web handler queries for `search:` tasks.
    pub search_endpoint: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            shell_timeout_secs: 300,
            search_endpoint: "https://lite.duckduckgo.com/lite/?q=".to_owned(),
        }
    }
}

/// Request routing settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Below this classification confidence, complexity escalates to the
    /// external tier.
    pub confidence_threshold: f64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
        }
    }
}
