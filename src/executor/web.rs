//! Web task handler.
//!
//! Fetches a URL or, for `search:`-prefixed commands, queries the
//! configured lite search endpoint. Responses are bounded in bytes and
//! truncated to the first lines so a large page cannot flood a task result.

use tracing::info;
use url::Url;

use crate::tasks::Task;

use super::{TaskError, TaskExecutor, WEB_TIMEOUT_SECS};

/// Character cap applied to a response body before line truncation.
const RESPONSE_CHAR_CAP: usize = 64 * 1024;
/// Lines kept from a direct URL fetch.
const FETCH_MAX_LINES: usize = 200;
/// Lines kept from a search response.
const SEARCH_MAX_LINES: usize = 100;

/// Result text for a response with no usable body.
pub const NO_CONTENT_SENTINEL: &str = "(no web content returned)";

/// Execute a web task.
///
/// # Errors
///
/// [`TaskError::Validation`] when the target is neither a URL nor a search;
/// [`TaskError::Timeout`] past the fetch budget; [`TaskError::Transport`]
/// on connection failure.
pub(super) async fn execute_web(exec: &TaskExecutor, task: &Task) -> Result<String, TaskError> {
    let mut target = task.command.clone();
    if target.is_empty() {
        let prompt = format!(
            "Extract the URL or search query from this task: {}\nRespond with ONLY the URL or 'search: query'",
            task.action
        );
        let response = exec.llm.generate(&prompt, None, 0.1).await?;
        target = response.trim().to_owned();
    }

    if let Some(query) = target.strip_prefix("search:") {
        let encoded: String = url::form_urlencoded::byte_serialize(query.trim().as_bytes()).collect();
        let search_url = format!("{}{encoded}", exec.search_endpoint);
        info!(query = query.trim(), "running web search");
        fetch(exec, &search_url, SEARCH_MAX_LINES).await
    } else {
        let parsed = Url::parse(&target)
            .map_err(|e| TaskError::Validation(format!("not a fetchable URL: {target}: {e}")))?;
        info!(url = %parsed, "fetching url");
        fetch(exec, parsed.as_str(), FETCH_MAX_LINES).await
    }
}

async fn fetch(exec: &TaskExecutor, url: &str, max_lines: usize) -> Result<String, TaskError> {
    let response = exec.http.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            TaskError::Timeout {
                seconds: WEB_TIMEOUT_SECS,
                detail: url.to_owned(),
            }
        } else {
            TaskError::Transport(format!("fetch failed for {url}: {e}"))
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(TaskError::Execution(format!(
            "fetch returned status {status} for {url}"
        )));
    }

    let body = response
        .text()
        .await
        .map_err(|e| TaskError::Transport(format!("failed to read body from {url}: {e}")))?;

    Ok(truncate_body(&body, max_lines))
}

/// Bound the body by length, then by line count.
fn truncate_body(body: &str, max_lines: usize) -> String {
    let capped = match body.char_indices().nth(RESPONSE_CHAR_CAP) {
        Some((index, _)) => &body[..index],
        None => body,
    };
    let text = capped
        .lines()
        .take(max_lines)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_owned();
    if text.is_empty() {
        NO_CONTENT_SENTINEL.to_owned()
    } else {
        text
    }
}
