//! Tests for the file handler — structured operations from model output.

use std::sync::Arc;

use tempfile::TempDir;

use volition::config::ExecutorConfig;
use volition::executor::{TaskError, TaskExecutor};
use volition::policy::AutonomyPolicy;
use volition::tasks::{Task, TaskPriority, TaskType};

use crate::mock_llm::ScriptedLlm;

fn file_task(action: &str) -> Task {
    Task::new("test goal", action, TaskType::File, "", TaskPriority::Normal)
}

fn executor(llm: Arc<ScriptedLlm>, policy: AutonomyPolicy) -> TaskExecutor {
    TaskExecutor::new(llm, policy, &ExecutorConfig::default(), "system".to_owned())
        .expect("executor")
}

#[tokio::test]
async fn write_creates_parent_directories() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("nested/deeper/notes.txt");
    let response = format!(
        r#"{{"operation": "write", "path": "{}", "content": "hello file"}}"#,
        path.display()
    );
    let llm = Arc::new(ScriptedLlm::new(&[&response]));
    let exec = executor(llm, AutonomyPolicy::default());

    let result = exec
        .execute(&file_task("write my notes"))
        .await
        .expect("write");

    assert!(result.contains("File written"));
    assert_eq!(
        std::fs::read_to_string(&path).expect("read back"),
        "hello file"
    );
}

#[tokio::test]
async fn read_returns_contents() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("input.txt");
    std::fs::write(&path, "file body").expect("seed");

    let response = format!(r#"{{"operation": "read", "path": "{}"}}"#, path.display());
    let llm = Arc::new(ScriptedLlm::new(&[&response]));
    let exec = executor(llm, AutonomyPolicy::default());

    let result = exec.execute(&file_task("read the input")).await.expect("read");
    assert_eq!(result, "file body");
}

#[tokio::test]
async fn delete_removes_the_file() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("junk.txt");
    std::fs::write(&path, "x").expect("seed");

    let response = format!(r#"{{"operation": "delete", "path": "{}"}}"#, path.display());
    let llm = Arc::new(ScriptedLlm::new(&[&response]));
    let exec = executor(llm, AutonomyPolicy::default());

    exec.execute(&file_task("remove the junk")).await.expect("delete");
    assert!(!path.exists());
}

#[tokio::test]
async fn delete_is_blocked_by_confirmation_trigger() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("precious.txt");
    std::fs::write(&path, "x").expect("seed");

    let response = format!(r#"{{"operation": "delete", "path": "{}"}}"#, path.display());
    let llm = Arc::new(ScriptedLlm::new(&[&response]));
    let policy = AutonomyPolicy {
        // The handler re-checks "rm <path>" against the confirmation list.
        require_confirmation_for: vec!["rm ".to_owned()],
        ..AutonomyPolicy::default()
    };
    let exec = executor(llm, policy);

    let err = exec
        .execute(&file_task("remove the precious file"))
        .await
        .expect_err("should be blocked");

    assert!(matches!(err, TaskError::PermissionDenied(_)));
    assert!(path.exists(), "file must not have been deleted");
}

#[tokio::test]
async fn unknown_operation_is_a_validation_error() {
    let llm = Arc::new(ScriptedLlm::new(&[
        r#"{"operation": "transmogrify", "path": "/tmp/x"}"#,
    ]));
    let exec = executor(llm, AutonomyPolicy::default());

    let err = exec
        .execute(&file_task("do something odd"))
        .await
        .expect_err("should fail");
    assert!(matches!(err, TaskError::Validation(_)));
}

#[tokio::test]
async fn unparseable_operation_is_a_validation_error() {
    let llm = Arc::new(ScriptedLlm::new(&["I would read the file, probably."]));
    let exec = executor(llm, AutonomyPolicy::default());

    let err = exec
        .execute(&file_task("vague request"))
        .await
        .expect_err("should fail");
    assert!(matches!(err, TaskError::Validation(_)));
}
