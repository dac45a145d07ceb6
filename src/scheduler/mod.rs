//! Proactive scheduler: the agent initiates work on its own.
//!
//! A tick loop evaluates two job families against the clock:
//!
//! - **Built-in jobs** fire on fixed intervals (health check, memory
//!   consolidation, evolution-readiness, disk monitor) and enqueue a canned
//!   task directly.
//! - **Dynamic jobs** are cron-triggered, created at runtime, persisted to a
//!   JSON file, and restored on startup. A firing dynamic job invokes the
//!   goal planner with the job's goal.
//!
//! Triggers only enqueue; they never block on task completion and never
//! preempt the task currently executing.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::SchedulerConfig;
use crate::planner::GoalPlanner;
use crate::tasks::{Task, TaskPriority, TaskStore, TaskType};

// ---------------------------------------------------------------------------
// Job records
// ---------------------------------------------------------------------------

/// A dynamically created cron job, as persisted to the jobs file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    /// Stable identifier derived from the name.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Goal handed to the planner on each firing.
    pub goal: String,
    /// Five-field cron expression (minute, hour, day-of-month, month,
    /// day-of-week).
    pub schedule: String,
    /// Priority of the planned tasks.
    pub priority: TaskPriority,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A scheduled job as reported by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    /// Job identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Next firing time, when computable.
    pub next_run: Option<DateTime<Utc>>,
}

/// A built-in interval job definition.
struct BuiltinJob {
    id: &'static str,
    name: &'static str,
    interval: Duration,
}

// ---------------------------------------------------------------------------
// Cron helpers
// ---------------------------------------------------------------------------

/// Normalize a standard 5-field cron expression to the 6-field form the
/// `cron` crate parses (a seconds field is prepended). Expressions that
/// already carry 6 or 7 fields pass through unchanged.
pub fn normalize_cron(expr: &str) -> String {
    let fields = expr.split_whitespace().count();
    if fields == 5 {
        format!("0 {expr}")
    } else {
        expr.to_owned()
    }
}

fn parse_schedule(expr: &str) -> Result<cron::Schedule> {
    cron::Schedule::from_str(&normalize_cron(expr))
        .with_context(|| format!("invalid cron expression: {expr}"))
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Cron/interval engine feeding the shared task queue.
pub struct ProactiveScheduler {
    planner: Arc<GoalPlanner>,
    store: Arc<TaskStore>,
    cfg: SchedulerConfig,
    jobs: Mutex<Vec<ScheduledJob>>,
    last_run: Mutex<HashMap<String, DateTime<Utc>>>,
    started_at: DateTime<Utc>,
}

impl ProactiveScheduler {
    /// Create a scheduler, restoring dynamic jobs from the jobs file.
    ///
    /// A malformed file or an individual job with an invalid cron expression
    /// is skipped with a warning; boot never aborts on scheduler state.
    pub fn new(planner: Arc<GoalPlanner>, store: Arc<TaskStore>, cfg: SchedulerConfig) -> Self {
        let jobs = load_jobs_file(&cfg.jobs_path);
        if !jobs.is_empty() {
            info!(count = jobs.len(), "restored dynamic scheduled jobs");
        }
        Self {
            planner,
            store,
            cfg,
            jobs: Mutex::new(jobs),
            last_run: Mutex::new(HashMap::new()),
            started_at: Utc::now(),
        }
    }

    fn lock_jobs(&self) -> MutexGuard<'_, Vec<ScheduledJob>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_last_run(&self) -> MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.last_run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run the tick loop until the shutdown signal flips.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        for builtin in self.builtin_jobs() {
            info!(
                job = builtin.id,
                interval_secs = builtin.interval.as_secs(),
                "scheduled builtin job"
            );
        }
        info!(tick_secs = self.cfg.tick_secs, "proactive scheduler started");

        let mut interval = tokio::time::interval(Duration::from_secs(self.cfg.tick_secs.max(1)));
        // Skip the immediate first tick.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_tick(Utc::now()).await;
                }
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        info!("proactive scheduler stopped");
    }

    /// Evaluate both job families against a single point in time.
    ///
    /// Public so a caller (or test) can drive ticks with an explicit clock.
    pub async fn run_tick(&self, now: DateTime<Utc>) {
        for builtin in &self.builtin_jobs() {
            if self.builtin_due(builtin, now) {
                self.fire_builtin(builtin.id, now);
            }
        }

        for job in self.due_dynamic_jobs(now) {
            info!(job = %job.id, goal = %job.goal, "triggered scheduled goal");
            self.lock_last_run().insert(job.id.clone(), now);
            if let Err(e) = self.planner.plan(&job.goal, "", job.priority).await {
                error!(job = %job.id, error = %e, "scheduled goal planning failed");
            }
        }
    }

    /// Whether an interval job has a full interval behind it.
    fn builtin_due(&self, builtin: &BuiltinJob, now: DateTime<Utc>) -> bool {
        let anchor = self
            .lock_last_run()
            .get(builtin.id)
            .copied()
            .unwrap_or(self.started_at);
        let elapsed = now.signed_duration_since(anchor);
        elapsed.num_seconds() >= i64::try_from(builtin.interval.as_secs()).unwrap_or(i64::MAX)
    }

    /// Dynamic jobs with a cron trigger between their last run and now.
    ///
    /// Jobs that have never fired anchor at scheduler startup, so a restored
    /// job waits for its next cron match instead of firing at boot.
    fn due_dynamic_jobs(&self, now: DateTime<Utc>) -> Vec<ScheduledJob> {
        let last_run = self.lock_last_run();
        self.lock_jobs()
            .iter()
            .filter(|job| {
                let schedule = match parse_schedule(&job.schedule) {
                    Ok(schedule) => schedule,
                    Err(e) => {
                        warn!(job = %job.id, error = %e, "skipping job with invalid cron");
                        return false;
                    }
                };
                let after = last_run.get(&job.id).copied().unwrap_or(self.started_at);
                schedule.after(&after).take(1).any(|next| next <= now)
            })
            .cloned()
            .collect()
    }

    /// Enqueue the canned task for a built-in job and record the run.
    fn fire_builtin(&self, id: &str, now: DateTime<Utc>) {
        info!(job = id, "running builtin job");
        self.lock_last_run().insert(id.to_owned(), now);
        let task = match id {
            "health_check" => Task::new(
                "System health check",
                "Check system health: disk usage, memory usage, CPU load, service status. Report any issues.",
                TaskType::Shell,
                "echo '=== DISK ===' && df -h / && echo '=== MEM ===' && free -h && echo '=== CPU ===' && uptime && echo '=== SERVICES ===' && systemctl is-active ollama",
                TaskPriority::Background,
            ),
            "memory_consolidation" => Task::new(
                "Memory consolidation",
                "Consolidate and summarize old memories to free up space and improve retrieval quality.",
                TaskType::Think,
                "",
                TaskPriority::Background,
            ),
            "evolution_check" => Task::new(
                "Check evolution readiness",
                format!(
                    "Check if there are at least {} quality interactions for training. If yes, trigger an evolution cycle.",
                    self.cfg.evolution_min_samples
                ),
                TaskType::Shell,
                "wc -l data/training/interactions.jsonl 2>/dev/null || echo '0 lines'",
                TaskPriority::Background,
            ),
            "disk_monitor" => Task::new(
                "Disk space check",
                "Check disk usage. If above 90%, clean up old logs and temporary files.",
                TaskType::Shell,
                "df -h / | tail -1 | awk '{print $5}'",
                TaskPriority::High,
            ),
            other => {
                warn!(job = other, "unknown builtin job");
                return;
            }
        };
        if let Err(e) = self.store.add(task) {
            error!(job = id, error = %e, "failed to enqueue builtin task");
        }
    }

    /// The enabled built-in jobs with their configured intervals.
    fn builtin_jobs(&self) -> Vec<BuiltinJob> {
        let hours = |h: u64| Duration::from_secs(h.saturating_mul(3600));
        let behaviors = &self.cfg.behaviors;
        let mut builtins = Vec::new();
        if behaviors.daily_health_check {
            builtins.push(BuiltinJob {
                id: "health_check",
                name: "System Health Check",
                interval: hours(self.cfg.health_check_interval_hours),
            });
        }
        if behaviors.auto_memory_consolidation {
            builtins.push(BuiltinJob {
                id: "memory_consolidation",
                name: "Memory Consolidation",
                interval: hours(self.cfg.memory_consolidation_hours),
            });
        }
        if behaviors.auto_evolution_trigger {
            builtins.push(BuiltinJob {
                id: "evolution_check",
                name: "Evolution Check",
                interval: hours(self.cfg.evolution_schedule_hours),
            });
        }
        if behaviors.monitor_disk_space {
            builtins.push(BuiltinJob {
                id: "disk_monitor",
                name: "Disk Space Monitor",
                interval: hours(6),
            });
        }
        builtins
    }

    // ── Dynamic job management ──────────────────────────────────

    /// Register a cron-triggered goal and persist it.
    ///
    /// An existing job with the same derived id is replaced.
    ///
    /// # Errors
    ///
    /// Returns an error if the cron expression is invalid or the jobs file
    /// cannot be written.
    pub fn add_dynamic_job(
        &self,
        name: &str,
        goal: &str,
        schedule: &str,
        priority: TaskPriority,
    ) -> Result<ScheduledJob> {
        parse_schedule(schedule)?;

        let id = format!("dynamic_{}", name.to_lowercase().replace(' ', "_"));
        let job = ScheduledJob {
            id: id.clone(),
            name: name.to_owned(),
            goal: goal.to_owned(),
            schedule: schedule.to_owned(),
            priority,
            created_at: Utc::now(),
        };

        {
            let mut jobs = self.lock_jobs();
            jobs.retain(|existing| existing.id != id);
            jobs.push(job.clone());
            save_jobs_file(&self.cfg.jobs_path, &jobs)?;
        }

        info!(job = %id, schedule, "dynamic job added");
        Ok(job)
    }

    /// Unregister a dynamic job and persist the removal.
    ///
    /// An unknown id is logged, not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the jobs file cannot be written.
    pub fn remove_dynamic_job(&self, job_id: &str) -> Result<()> {
        {
            let mut jobs = self.lock_jobs();
            let before = jobs.len();
            jobs.retain(|job| job.id != job_id);
            if jobs.len() == before {
                warn!(job = job_id, "no such dynamic job to remove");
                return Ok(());
            }
            save_jobs_file(&self.cfg.jobs_path, &jobs)?;
        }
        self.lock_last_run().remove(job_id);
        info!(job = job_id, "dynamic job removed");
        Ok(())
    }

    /// All scheduled jobs (built-in and dynamic) with next run times.
    pub fn jobs(&self) -> Vec<JobInfo> {
        let last_run = self.lock_last_run();
        let mut infos: Vec<JobInfo> = self
            .builtin_jobs()
            .iter()
            .map(|builtin| {
                let anchor = last_run.get(builtin.id).copied().unwrap_or(self.started_at);
                let next = chrono::Duration::try_seconds(
                    i64::try_from(builtin.interval.as_secs()).unwrap_or(i64::MAX),
                )
                .and_then(|interval| anchor.checked_add_signed(interval));
                JobInfo {
                    id: builtin.id.to_owned(),
                    name: builtin.name.to_owned(),
                    next_run: next,
                }
            })
            .collect();

        for job in self.lock_jobs().iter() {
            let next_run = parse_schedule(&job.schedule)
                .ok()
                .and_then(|schedule| schedule.upcoming(Utc).next());
            infos.push(JobInfo {
                id: job.id.clone(),
                name: job.name.clone(),
                next_run,
            });
        }

        infos
    }

    /// Snapshot of the dynamic jobs.
    pub fn dynamic_jobs(&self) -> Vec<ScheduledJob> {
        self.lock_jobs().clone()
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

fn load_jobs_file(path: &Path) -> Vec<ScheduledJob> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read jobs file");
            return Vec::new();
        }
    };
    let jobs: Vec<ScheduledJob> = match serde_json::from_str(&contents) {
        Ok(jobs) => jobs,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "malformed jobs file, starting empty");
            return Vec::new();
        }
    };
    // Drop jobs whose schedule no longer parses rather than refusing to boot.
    jobs.into_iter()
        .filter(|job| match parse_schedule(&job.schedule) {
            Ok(_) => true,
            Err(e) => {
                warn!(job = %job.id, error = %e, "skipping restored job with invalid cron");
                false
            }
        })
        .collect()
}

fn save_jobs_file(path: &Path, jobs: &[ScheduledJob]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create jobs directory {}", parent.display()))?;
        }
    }
    let json = serde_json::to_string_pretty(jobs).context("failed to serialize jobs")?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write jobs file {}", path.display()))
}
