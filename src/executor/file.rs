//! File task handler.
//!
//! The model translates the task into a structured
//! `{operation, path, content}` action. Reads return the file contents;
//! writes create parent directories first; deletes re-check the
//! confirmation list against the equivalent `rm` command.

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::llm::extract_json;
use crate::tasks::Task;

use super::{TaskError, TaskExecutor};

#[derive(Debug, Deserialize)]
struct FileOperation {
    #[serde(default = "default_operation")]
    operation: String,
    #[serde(default)]
    path: String,
    #[serde(default)]
    content: String,
}

fn default_operation() -> String {
    "read".to_owned()
}

/// Execute a file task.
///
/// # Errors
///
/// [`TaskError::Validation`] when the model output cannot be parsed or names
/// an unknown operation; [`TaskError::PermissionDenied`] for deletes that
/// hit a confirmation trigger; [`TaskError::Execution`] on I/O failure.
pub(super) async fn execute_file(exec: &TaskExecutor, task: &Task) -> Result<String, TaskError> {
    let prompt = format!(
        "Analyze this file operation task and provide the exact action to take.\n\
         Task: {}\n\
         Command hint: {}\n\
         \n\
         Respond with JSON: {{\"operation\": \"read|write|create|delete\", \"path\": \"/path/to/file\", \"content\": \"if write/create\"}}",
        task.action, task.command
    );
    let response = exec.llm.generate(&prompt, None, 0.1).await?;

    let op: FileOperation = serde_json::from_str(extract_json(&response)).map_err(|e| {
        let preview: String = response.chars().take(200).collect();
        TaskError::Validation(format!(
            "could not parse file operation from model response: {e}: {preview}"
        ))
    })?;

    match op.operation.as_str() {
        "read" => tokio::fs::read_to_string(&op.path)
            .await
            .map_err(|e| TaskError::Execution(format!("failed to read {}: {e}", op.path))),
        "write" | "create" => {
            if let Some(parent) = Path::new(&op.path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        TaskError::Execution(format!(
                            "failed to create {}: {e}",
                            parent.display()
                        ))
                    })?;
                }
            }
            tokio::fs::write(&op.path, &op.content)
                .await
                .map_err(|e| TaskError::Execution(format!("failed to write {}: {e}", op.path)))?;
            info!(path = %op.path, "file written");
            Ok(format!("File written: {}", op.path))
        }
        "delete" => {
            if exec.policy.requires_confirmation(&format!("rm {}", op.path)) {
                return Err(TaskError::PermissionDenied(format!(
                    "delete requires confirmation: {}",
                    op.path
                )));
            }
            tokio::fs::remove_file(&op.path)
                .await
                .map_err(|e| TaskError::Execution(format!("failed to delete {}: {e}", op.path)))?;
            info!(path = %op.path, "file deleted");
            Ok(format!("File deleted: {}", op.path))
        }
        other => Err(TaskError::Validation(format!(
            "unknown file operation: {other}"
        ))),
    }
}
