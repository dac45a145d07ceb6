//! Tests for `src/reflection/` — strategy revision, escalation, lessons.

use std::sync::Arc;

use tempfile::TempDir;

use volition::memory::{InMemoryStore, MemoryStore};
use volition::reflection::SelfReflection;
use volition::tasks::{Task, TaskPriority, TaskStore, TaskType};

use crate::mock_llm::ScriptedLlm;

fn seeded_store(dir: &TempDir) -> (Arc<TaskStore>, Task) {
    let store = Arc::new(TaskStore::open(dir.path().join("queue.json"), 3));
    let task = Task::new(
        "test goal",
        "list the directory",
        TaskType::Shell,
        "lz -la",
        TaskPriority::Normal,
    );
    store.add(task.clone()).expect("add");
    (store, task)
}

#[tokio::test]
async fn new_strategy_overwrites_the_command() {
    let dir = TempDir::new().expect("tempdir");
    let (store, task) = seeded_store(&dir);
    let response = r#"{"root_cause": "typo in the binary name", "new_strategy": "ls -la",
        "should_escalate": false, "escalation_reason": ""}"#;
    let llm = Arc::new(ScriptedLlm::new(&[response]));
    let reflection = SelfReflection::new(llm, Arc::clone(&store));

    let outcome = reflection
        .reflect(&task, "command not found: lz")
        .await
        .expect("reflect");

    assert_eq!(outcome.new_strategy, "ls -la");
    let updated = store.get(&task.id).expect("get");
    assert_eq!(updated.command, "ls -la");
    assert_eq!(updated.task_type, TaskType::Shell);
}

#[tokio::test]
async fn escalation_rewrites_type_and_command() {
    let dir = TempDir::new().expect("tempdir");
    let (store, task) = seeded_store(&dir);
    let response = r#"{"root_cause": "needs a bigger model", "new_strategy": "",
        "should_escalate": true, "escalation_reason": "beyond local capability"}"#;
    let llm = Arc::new(ScriptedLlm::new(&[response]));
    let reflection = SelfReflection::new(llm, Arc::clone(&store));

    reflection.reflect(&task, "gave up").await.expect("reflect");

    let updated = store.get(&task.id).expect("get");
    assert_eq!(updated.task_type, TaskType::Api);
    assert_eq!(updated.command, "Escalated: beyond local capability");
}

#[tokio::test]
async fn unparseable_reflection_uses_truncated_raw_response() {
    let dir = TempDir::new().expect("tempdir");
    let (store, task) = seeded_store(&dir);
    let raw = "Maybe try running it with the correct spelling next time.";
    let llm = Arc::new(ScriptedLlm::new(&[raw]));
    let reflection = SelfReflection::new(llm, Arc::clone(&store));

    let outcome = reflection.reflect(&task, "boom").await.expect("reflect");

    assert_eq!(outcome.root_cause, "Unable to determine root cause");
    assert_eq!(outcome.new_strategy, raw);
    assert!(!outcome.should_escalate);
    // The raw text became the next strategy.
    assert_eq!(store.get(&task.id).expect("get").command, raw);
}

#[tokio::test]
async fn lesson_is_stored_and_recallable() {
    let dir = TempDir::new().expect("tempdir");
    let (store, task) = seeded_store(&dir);
    let response = r#"{"root_cause": "wrong flag", "new_strategy": "use --all",
        "should_escalate": false, "escalation_reason": ""}"#;
    let llm = Arc::new(ScriptedLlm::new(&[response]));
    let memory: Arc<InMemoryStore> = Arc::new(InMemoryStore::new());
    let reflection = SelfReflection::new(llm, Arc::clone(&store))
        .with_memory(Arc::clone(&memory) as Arc<dyn MemoryStore>);

    reflection.reflect(&task, "bad flag").await.expect("reflect");

    assert_eq!(memory.count().await.expect("count"), 1);
    let lessons = reflection.recall_similar_failures("list the directory").await;
    assert_eq!(lessons.len(), 1);
    assert!(lessons[0].contains("LESSON LEARNED"));
    assert!(lessons[0].contains("wrong flag"));
}

#[tokio::test]
async fn history_summary_counts_escalations() {
    let dir = TempDir::new().expect("tempdir");
    let (store, task) = seeded_store(&dir);
    let llm = Arc::new(ScriptedLlm::new(&[
        r#"{"root_cause": "a", "new_strategy": "b", "should_escalate": false, "escalation_reason": ""}"#,
        r#"{"root_cause": "c", "new_strategy": "", "should_escalate": true, "escalation_reason": "d"}"#,
    ]));
    let reflection = SelfReflection::new(llm, Arc::clone(&store));

    reflection.reflect(&task, "first").await.expect("reflect");
    reflection.reflect(&task, "second").await.expect("reflect");

    let summary = reflection.summary();
    assert_eq!(summary.total_reflections, 2);
    assert_eq!(summary.escalations, 1);
    assert_eq!(summary.recent.len(), 2);
}
