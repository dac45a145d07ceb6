//! Shell task handler.
//!
//! Runs the task's command as a subprocess in the current working directory.
//! When the task carries no command, the model synthesizes one from the
//! action description at low temperature. The policy oracle is re-checked on
//! the final command string, not the request that produced it.

use tokio::process::Command;
use tracing::{info, warn};

use crate::policy::{ActionKind, RiskLevel};
use crate::tasks::Task;

use super::{TaskError, TaskExecutor};

/// Result text for a successful command that printed nothing.
pub const NO_OUTPUT_SENTINEL: &str = "(command completed successfully with no output)";

/// Execute a shell task.
///
/// # Errors
///
/// [`TaskError::PermissionDenied`] when the command hits a confirmation
/// trigger or is dangerous while shell autonomy is off;
/// [`TaskError::Timeout`] past the configured budget;
/// [`TaskError::Execution`] on non-zero exit.
pub(super) async fn execute_shell(exec: &TaskExecutor, task: &Task) -> Result<String, TaskError> {
    let mut command = task.command.clone();
    if command.is_empty() {
        let prompt = format!(
            "Generate the exact shell command (bash) to: {}\nRespond with ONLY the command, nothing else.",
            task.action
        );
        let synthesized = exec.llm.generate(&prompt, None, 0.1).await?;
        command = synthesized.trim().trim_matches('`').trim().to_owned();
    }

    if exec.policy.requires_confirmation(&command) {
        warn!(command, "command matches a confirmation trigger, blocking");
        return Err(TaskError::PermissionDenied(format!(
            "command requires confirmation: {command}"
        )));
    }

    let risk = exec.policy.risk_level(&format!("execute shell: {command}"));
    if risk == RiskLevel::Dangerous && !exec.policy.can_auto_execute(ActionKind::Shell) {
        return Err(TaskError::PermissionDenied(
            "shell execution disabled for dangerous commands".to_owned(),
        ));
    }

    info!(command, "executing shell command");
    let timeout_secs = exec.shell_timeout.as_secs();

    // On timeout the task fails but the child is not killed; it may run on
    // in the background up to its natural completion.
    let output = tokio::time::timeout(
        exec.shell_timeout,
        Command::new("sh").arg("-c").arg(&command).output(),
    )
    .await
    .map_err(|_| TaskError::Timeout {
        seconds: timeout_secs,
        detail: command.clone(),
    })?
    .map_err(|e| TaskError::Execution(format!("failed to spawn shell: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
        let code = output.status.code().unwrap_or(-1);
        return Err(TaskError::Execution(format!(
            "command failed (exit {code}): {stderr}"
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_owned();
    if stdout.is_empty() {
        Ok(NO_OUTPUT_SENTINEL.to_owned())
    } else {
        Ok(stdout)
    }
}
