//! Tests for `src/scheduler/` — dynamic jobs, builtins, and persistence.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tempfile::TempDir;

use volition::config::{BehaviorFlags, SchedulerConfig};
use volition::llm::LlmClient;
use volition::planner::GoalPlanner;
use volition::scheduler::{ProactiveScheduler, ScheduledJob};
use volition::tasks::{TaskPriority, TaskStatus, TaskStore};

use crate::mock_llm::ScriptedLlm;

struct Fixture {
    scheduler: ProactiveScheduler,
    store: Arc<TaskStore>,
    llm: Arc<ScriptedLlm>,
    _dir: TempDir,
}

fn fixture_with(cfg_mut: impl FnOnce(&mut SchedulerConfig)) -> Fixture {
    let dir = TempDir::new().expect("tempdir");
    let mut cfg = SchedulerConfig {
        jobs_path: dir.path().join("jobs.json"),
        ..SchedulerConfig::default()
    };
    cfg_mut(&mut cfg);

    let store = Arc::new(TaskStore::open(dir.path().join("queue.json"), 3));
    // Dynamic firings invoke the planner; a plain single-step plan will do.
    let llm = Arc::new(ScriptedLlm::always(
        r#"{"steps": [{"id": 1, "action": "planned step", "type": "think", "command": "", "depends_on": []}]}"#,
    ));
    let planner = Arc::new(GoalPlanner::new(
        Arc::clone(&llm) as Arc<dyn LlmClient>,
        Arc::clone(&store),
        "system".to_owned(),
    ));
    let scheduler = ProactiveScheduler::new(planner, Arc::clone(&store), cfg);
    Fixture {
        scheduler,
        store,
        llm,
        _dir: dir,
    }
}

fn fixture() -> Fixture {
    fixture_with(|_| {})
}

#[test]
fn add_dynamic_job_persists_and_derives_id() {
    let f = fixture();
    let job = f
        .scheduler
        .add_dynamic_job("Nightly Review", "review the day", "0 3 * * *", TaskPriority::Normal)
        .expect("add job");

    assert_eq!(job.id, "dynamic_nightly_review");

    let jobs = f.scheduler.dynamic_jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].schedule, "0 3 * * *");

    // Persisted as a JSON array of job entries.
    let on_disk: Vec<ScheduledJob> = serde_json::from_str(
        &std::fs::read_to_string(f._dir.path().join("jobs.json")).expect("read"),
    )
    .expect("parse");
    assert_eq!(on_disk.len(), 1);
    assert_eq!(on_disk[0].id, "dynamic_nightly_review");
}

#[test]
fn add_dynamic_job_rejects_invalid_cron() {
    let f = fixture();
    let result =
        f.scheduler
            .add_dynamic_job("Bad", "goal", "whenever you like", TaskPriority::Normal);
    assert!(result.is_err());
    assert!(f.scheduler.dynamic_jobs().is_empty());
}

#[test]
fn same_name_replaces_the_existing_job() {
    let f = fixture();
    f.scheduler
        .add_dynamic_job("Sweep", "old goal", "0 1 * * *", TaskPriority::Normal)
        .expect("add");
    f.scheduler
        .add_dynamic_job("Sweep", "new goal", "0 2 * * *", TaskPriority::High)
        .expect("replace");

    let jobs = f.scheduler.dynamic_jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].goal, "new goal");
    assert_eq!(jobs[0].schedule, "0 2 * * *");
}

#[test]
fn remove_dynamic_job_persists_removal() {
    let f = fixture();
    f.scheduler
        .add_dynamic_job("Sweep", "goal", "0 1 * * *", TaskPriority::Normal)
        .expect("add");
    f.scheduler
        .remove_dynamic_job("dynamic_sweep")
        .expect("remove");

    assert!(f.scheduler.dynamic_jobs().is_empty());
    let on_disk: Vec<ScheduledJob> = serde_json::from_str(
        &std::fs::read_to_string(f._dir.path().join("jobs.json")).expect("read"),
    )
    .expect("parse");
    assert!(on_disk.is_empty());
}

#[test]
fn removing_an_unknown_job_is_not_an_error() {
    let f = fixture();
    assert!(f.scheduler.remove_dynamic_job("dynamic_ghost").is_ok());
}

#[test]
fn restore_skips_jobs_with_invalid_cron() {
    let dir = TempDir::new().expect("tempdir");
    let jobs_path = dir.path().join("jobs.json");
    let seeded = serde_json::json!([
        {"id": "dynamic_good", "name": "Good", "goal": "g", "schedule": "0 3 * * *",
         "priority": "normal", "created_at": "2026-01-01T00:00:00Z"},
        {"id": "dynamic_bad", "name": "Bad", "goal": "g", "schedule": "not cron",
         "priority": "normal", "created_at": "2026-01-01T00:00:00Z"}
    ]);
    std::fs::write(&jobs_path, seeded.to_string()).expect("seed");

    let store = Arc::new(TaskStore::open(dir.path().join("queue.json"), 3));
    let llm = Arc::new(ScriptedLlm::always("{}"));
    let planner = Arc::new(GoalPlanner::new(
        llm as Arc<dyn LlmClient>,
        Arc::clone(&store),
        "system".to_owned(),
    ));
    let cfg = SchedulerConfig {
        jobs_path,
        ..SchedulerConfig::default()
    };
    let scheduler = ProactiveScheduler::new(planner, store, cfg);

    let jobs = scheduler.dynamic_jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, "dynamic_good");
}

#[test]
fn malformed_jobs_file_starts_empty() {
    let dir = TempDir::new().expect("tempdir");
    let jobs_path = dir.path().join("jobs.json");
    std::fs::write(&jobs_path, "[{broken").expect("seed");

    let store = Arc::new(TaskStore::open(dir.path().join("queue.json"), 3));
    let llm = Arc::new(ScriptedLlm::always("{}"));
    let planner = Arc::new(GoalPlanner::new(
        llm as Arc<dyn LlmClient>,
        Arc::clone(&store),
        "system".to_owned(),
    ));
    let cfg = SchedulerConfig {
        jobs_path,
        ..SchedulerConfig::default()
    };
    let scheduler = ProactiveScheduler::new(planner, store, cfg);
    assert!(scheduler.dynamic_jobs().is_empty());
}

#[tokio::test]
async fn due_dynamic_job_invokes_the_planner() {
    let f = fixture();
    f.scheduler
        .add_dynamic_job("Every Minute", "recurring goal", "* * * * *", TaskPriority::Background)
        .expect("add");

    // A tick two minutes from startup is past at least one cron match.
    f.scheduler.run_tick(Utc::now() + Duration::minutes(2)).await;

    assert_eq!(f.llm.call_count(), 1, "planner should have been invoked once");
    assert_eq!(f.store.pending_count(), 1);
    let planned = f.store.next_runnable().expect("planned task");
    assert_eq!(planned.goal, "recurring goal");
    assert_eq!(planned.priority, TaskPriority::Background);
}

#[tokio::test]
async fn dynamic_job_does_not_refire_within_the_same_interval() {
    let f = fixture();
    f.scheduler
        .add_dynamic_job("Every Minute", "recurring goal", "* * * * *", TaskPriority::Normal)
        .expect("add");

    let fire_time = Utc::now() + Duration::minutes(2);
    f.scheduler.run_tick(fire_time).await;
    // Same instant again: no cron match between last run and now.
    f.scheduler.run_tick(fire_time).await;

    assert_eq!(f.llm.call_count(), 1);
}

#[tokio::test]
async fn builtin_disk_monitor_enqueues_high_priority_shell_task() {
    let f = fixture();

    // Seven hours past startup: disk monitor (6h) is due, health check (24h)
    // and the weekly builtins are not.
    f.scheduler.run_tick(Utc::now() + Duration::hours(7)).await;

    let tasks = f.store.all();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].goal, "Disk space check");
    assert_eq!(tasks[0].priority, TaskPriority::High);
    assert_eq!(tasks[0].status, TaskStatus::Pending);
    assert_eq!(f.llm.call_count(), 0, "builtins enqueue directly, no planning");
}

#[tokio::test]
async fn builtins_respect_behavior_flags() {
    let f = fixture_with(|cfg| {
        cfg.behaviors = BehaviorFlags {
            daily_health_check: false,
            auto_memory_consolidation: false,
            auto_evolution_trigger: false,
            monitor_disk_space: false,
        };
    });

    f.scheduler.run_tick(Utc::now() + Duration::days(30)).await;
    assert!(f.store.all().is_empty());
}

#[tokio::test]
async fn health_check_due_after_its_interval() {
    let f = fixture();

    f.scheduler.run_tick(Utc::now() + Duration::hours(25)).await;

    let goals: Vec<String> = f.store.all().into_iter().map(|t| t.goal).collect();
    assert!(goals.contains(&"System health check".to_owned()));
    assert!(goals.contains(&"Disk space check".to_owned()));
}

#[test]
fn jobs_listing_includes_builtins_and_dynamic_jobs() {
    let f = fixture();
    f.scheduler
        .add_dynamic_job("Sweep", "goal", "0 1 * * *", TaskPriority::Normal)
        .expect("add");

    let jobs = f.scheduler.jobs();
    let ids: Vec<&str> = jobs.iter().map(|j| j.id.as_str()).collect();
    assert!(ids.contains(&"health_check"));
    assert!(ids.contains(&"disk_monitor"));
    assert!(ids.contains(&"dynamic_sweep"));
    // Every listed job can report a next run.
    assert!(jobs.iter().all(|j| j.next_run.is_some()));
}
