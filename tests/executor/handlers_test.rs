//! Tests for the api, think, and web handlers.

use std::sync::Arc;

use volition::config::ExecutorConfig;
use volition::executor::{TaskError, TaskExecutor};
use volition::policy::AutonomyPolicy;
use volition::tasks::{Task, TaskPriority, TaskType};

use crate::mock_llm::ScriptedLlm;

fn executor(llm: Arc<ScriptedLlm>) -> TaskExecutor {
    TaskExecutor::new(
        llm,
        AutonomyPolicy::default(),
        &ExecutorConfig::default(),
        "system".to_owned(),
    )
    .expect("executor")
}

#[tokio::test]
async fn think_passes_action_and_context_to_the_model() {
    let llm = Arc::new(ScriptedLlm::new(&["a considered answer"]));
    let exec = executor(Arc::clone(&llm));

    let task = Task::new(
        "goal",
        "weigh the options",
        TaskType::Think,
        "option list",
        TaskPriority::Normal,
    );
    let result = exec.execute(&task).await.expect("think");

    assert_eq!(result, "a considered answer");
    let prompts = llm.prompts();
    assert!(prompts[0].contains("weigh the options"));
    assert!(prompts[0].contains("option list"));
}

#[tokio::test]
async fn api_delegates_action_and_command() {
    let llm = Arc::new(ScriptedLlm::new(&["routed response"]));
    let exec = executor(Arc::clone(&llm));

    let task = Task::new(
        "goal",
        "call the weather service",
        TaskType::Api,
        "Escalated: local model kept failing",
        TaskPriority::Normal,
    );
    let result = exec.execute(&task).await.expect("api");

    assert_eq!(result, "routed response");
    assert!(llm.prompts()[0].contains("call the weather service"));
    assert!(llm.prompts()[0].contains("Escalated"));
}

#[tokio::test]
async fn web_target_that_is_not_a_url_is_a_validation_error() {
    let llm = Arc::new(ScriptedLlm::always("unused"));
    let exec = executor(llm);

    let task = Task::new(
        "goal",
        "fetch something",
        TaskType::Web,
        "definitely not a url",
        TaskPriority::Normal,
    );
    let err = exec.execute(&task).await.expect_err("should fail");
    assert!(matches!(err, TaskError::Validation(_)));
}
