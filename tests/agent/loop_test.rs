//! End-to-end tests for the execution loop: dispatch order, retry with
//! reflection, terminal failure, and the policy gate.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::watch;

use volition::agent::{agent_status, ExecutionLoop, ReflectionHook};
use volition::config::{AgentConfig, ExecutorConfig};
use volition::executor::TaskExecutor;
use volition::llm::LlmClient;
use volition::planner::GoalPlanner;
use volition::policy::AutonomyPolicy;
use volition::reflection::SelfReflection;
use volition::tasks::{Task, TaskPriority, TaskStatus, TaskStore, TaskType};

use crate::mock_llm::ScriptedLlm;

fn fast_agent_config(dir: &TempDir) -> AgentConfig {
    AgentConfig {
        name: "TestAgent".to_owned(),
        idle_poll_secs: 0,
        inter_task_secs: 0,
        logs_dir: dir.path().join("logs"),
    }
}

fn build_executor(llm: Arc<dyn LlmClient>, policy: AutonomyPolicy) -> Arc<TaskExecutor> {
    Arc::new(
        TaskExecutor::new(llm, policy, &ExecutorConfig::default(), "system".to_owned())
            .expect("executor"),
    )
}

/// Drive the loop until the predicate holds, then shut it down.
async fn run_until(
    execution_loop: ExecutionLoop,
    store: Arc<TaskStore>,
    pred: impl Fn(&TaskStore) -> bool,
) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { execution_loop.run(shutdown_rx).await });

    let waited = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if pred(&store) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;

    shutdown_tx.send(true).expect("send shutdown");
    handle.await.expect("join loop");
    waited.expect("loop did not reach the expected state in time");
}

/// Hook that records which tasks it was invoked for.
#[derive(Default)]
struct RecordingHook {
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl ReflectionHook for RecordingHook {
    async fn on_failure(&self, task: &Task, _error: &str) {
        self.calls.lock().expect("lock").push(task.id.clone());
    }
}

#[tokio::test]
async fn linear_plan_completes_in_order() {
    let dir = TempDir::new().expect("tempdir");
    let store = Arc::new(TaskStore::open(dir.path().join("queue.json"), 3));

    let plan = r#"{"steps": [
        {"id": 1, "action": "A", "type": "think", "command": "", "depends_on": []},
        {"id": 2, "action": "B", "type": "think", "command": "", "depends_on": [1]}
    ]}"#;
    let llm: Arc<ScriptedLlm> = Arc::new(ScriptedLlm::new(&[plan, "done A", "done B"]));

    let planner = GoalPlanner::new(
        Arc::clone(&llm) as Arc<dyn LlmClient>,
        Arc::clone(&store),
        "system".to_owned(),
    );
    let tasks = planner
        .plan("two step goal", "", TaskPriority::Normal)
        .await
        .expect("plan");
    let (a_id, b_id) = (tasks[0].id.clone(), tasks[1].id.clone());

    let executor = build_executor(Arc::clone(&llm) as Arc<dyn LlmClient>, AutonomyPolicy::default());
    let execution_loop = ExecutionLoop::new(Arc::clone(&store), executor, &fast_agent_config(&dir));

    run_until(execution_loop, Arc::clone(&store), |store| {
        store.summary().completed == 2
    })
    .await;

    // A ran first and consumed the first scripted response.
    let a = store.get(&a_id).expect("a");
    let b = store.get(&b_id).expect("b");
    assert_eq!(a.result.as_deref(), Some("done A"));
    assert_eq!(b.result.as_deref(), Some("done B"));
    assert!(a.completed_at.is_some() && b.completed_at.is_some());

    // The queue file reflects the final state.
    let on_disk: Vec<Task> = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("queue.json")).expect("read"),
    )
    .expect("parse");
    assert_eq!(on_disk.len(), 2);
    assert!(on_disk.iter().all(|t| t.completed_at.is_some()));
}

#[tokio::test]
async fn failed_task_retries_with_revised_strategy() {
    let dir = TempDir::new().expect("tempdir");
    let store = Arc::new(TaskStore::open(dir.path().join("queue.json"), 2));

    let task = Task::new(
        "retry goal",
        "produce ok",
        TaskType::Shell,
        "false",
        TaskPriority::Normal,
    );
    let id = task.id.clone();
    store.add(task).expect("add");

    // The only model call is the reflection after the first failure.
    let reflection_json = r#"{"root_cause": "command always fails",
        "new_strategy": "echo ok", "should_escalate": false, "escalation_reason": ""}"#;
    let llm: Arc<ScriptedLlm> = Arc::new(ScriptedLlm::new(&[reflection_json]));

    let reflection = Arc::new(SelfReflection::new(
        Arc::clone(&llm) as Arc<dyn LlmClient>,
        Arc::clone(&store),
    ));
    let executor = build_executor(Arc::clone(&llm) as Arc<dyn LlmClient>, AutonomyPolicy::default());
    let execution_loop = ExecutionLoop::new(Arc::clone(&store), executor, &fast_agent_config(&dir))
        .with_reflection(reflection);

    run_until(execution_loop, Arc::clone(&store), |store| {
        store
            .get(&id)
            .is_some_and(|t| t.status == TaskStatus::Completed)
    })
    .await;

    let task = store.get(&id).expect("get");
    assert_eq!(task.result.as_deref(), Some("ok"));
    assert_eq!(task.attempts.len(), 1, "one failed attempt before success");
    assert_eq!(task.command, "echo ok");
}

#[tokio::test]
async fn retry_budget_exhaustion_is_terminal() {
    let dir = TempDir::new().expect("tempdir");
    let store = Arc::new(TaskStore::open(dir.path().join("queue.json"), 2));

    let task = Task::new(
        "doomed goal",
        "always fails",
        TaskType::Shell,
        "false",
        TaskPriority::Normal,
    );
    let id = task.id.clone();
    store.add(task).expect("add");

    let llm: Arc<ScriptedLlm> = Arc::new(ScriptedLlm::always("no strategy from me"));
    let executor = build_executor(Arc::clone(&llm) as Arc<dyn LlmClient>, AutonomyPolicy::default());
    // Default no-op hook: the command never changes.
    let execution_loop = ExecutionLoop::new(Arc::clone(&store), executor, &fast_agent_config(&dir));

    run_until(execution_loop, Arc::clone(&store), |store| {
        store
            .get(&id)
            .is_some_and(|t| t.status == TaskStatus::Failed)
    })
    .await;

    let task = store.get(&id).expect("get");
    assert_eq!(task.attempts.len(), 2);
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(store.next_runnable().is_none());
}

#[tokio::test]
async fn permission_denied_counts_attempts_but_skips_reflection() {
    let dir = TempDir::new().expect("tempdir");
    let store = Arc::new(TaskStore::open(dir.path().join("queue.json"), 2));

    let task = Task::new(
        "blocked goal",
        "wipe the disk",
        TaskType::Shell,
        "rm -rf /",
        TaskPriority::Normal,
    );
    let id = task.id.clone();
    store.add(task).expect("add");

    let llm: Arc<ScriptedLlm> = Arc::new(ScriptedLlm::always("unused"));
    let hook = Arc::new(RecordingHook::default());
    let executor = build_executor(Arc::clone(&llm) as Arc<dyn LlmClient>, AutonomyPolicy::default());
    let execution_loop = ExecutionLoop::new(Arc::clone(&store), executor, &fast_agent_config(&dir))
        .with_reflection(Arc::clone(&hook) as Arc<dyn ReflectionHook>);

    run_until(execution_loop, Arc::clone(&store), |store| {
        store
            .get(&id)
            .is_some_and(|t| t.status == TaskStatus::Failed)
    })
    .await;

    let task = store.get(&id).expect("get");
    assert!(task.error.as_deref().is_some_and(|e| e.contains("permission denied")));
    assert!(hook.calls.lock().expect("lock").is_empty(), "no reflection for policy denials");
    assert_eq!(llm.call_count(), 0, "no model call for a blocked command");
}

#[tokio::test]
async fn status_snapshot_reports_queue_and_flags() {
    let dir = TempDir::new().expect("tempdir");
    let store = Arc::new(TaskStore::open(dir.path().join("queue.json"), 3));

    store
        .add(Task::new(
            "g",
            "waiting",
            TaskType::Think,
            "",
            TaskPriority::Normal,
        ))
        .expect("add");

    let status = agent_status(&store, vec![]);
    assert_eq!(status.pending, 1);
    assert!(!status.in_progress);
    assert_eq!(status.queue.total, 1);
    assert!(status.errors.is_empty());
    assert!(status.scheduled_jobs.is_empty());
}

#[tokio::test]
async fn status_snapshot_surfaces_latest_task_errors() {
    let dir = TempDir::new().expect("tempdir");
    let store = Arc::new(TaskStore::open(dir.path().join("queue.json"), 1));

    let task = Task::new("g", "explode", TaskType::Shell, "false", TaskPriority::Normal);
    let id = task.id.clone();
    store.add(task).expect("add");
    store.mark_in_progress(&id).expect("claim");
    store.mark_failed(&id, "exit 1", "").expect("fail");

    let status = agent_status(&store, vec![]);
    assert_eq!(status.errors.len(), 1);
    assert_eq!(status.errors[0].error, "exit 1");
    assert!(status.errors[0].terminal);
}
