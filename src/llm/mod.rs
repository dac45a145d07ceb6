//! LLM transport layer.
//!
//! Defines the [`LlmClient`] trait consumed by the planner, decision engine,
//! executor, and reflection engine, plus the shared JSON-extraction helper
//! for model output wrapped in markdown code fences.
//!
//! One concrete transport is implemented: [`ollama::OllamaClient`], speaking
//! the Ollama HTTP API (`/api/generate`, `/api/chat`, `/api/embeddings`).

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub mod ollama;

/// Sentinel returned in place of a completion when the model exceeds its
/// time budget. Callers treat it as a degraded-but-usable response.
pub const TIMEOUT_SENTINEL: &str = "[timeout] the model did not respond in time";

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Conversation participant role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// System instruction.
    System,
    /// Human user message.
    User,
    /// Assistant (LLM) message.
    Assistant,
}

/// A single message in a chat completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message author.
    pub role: ChatRole,
    /// Plain text content.
    pub content: String,
}

impl ChatMessage {
    /// Build a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by the LLM transport.
///
/// Timeouts are not an error: they surface as [`TIMEOUT_SENTINEL`] so that
/// a slow model degrades a task instead of aborting it.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// HTTP transport failure (connection refused, DNS, TLS).
    #[error("llm request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Upstream responded with a non-success status.
    #[error("llm returned status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Sanitized response body.
        body: String,
    },
    /// Response body did not match the expected schema.
    #[error("llm response parse error: {0}")]
    Parse(String),
}

/// Check HTTP response status and return the body text or a structured error.
///
/// # Errors
///
/// Returns [`LlmError::Request`] on transport failure reading the body,
/// [`LlmError::HttpStatus`] on non-2xx.
pub async fn check_http_response(response: reqwest::Response) -> Result<String, LlmError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(LlmError::HttpStatus {
            status: status.as_u16(),
            body: sanitize_error_body(&body),
        });
    }
    Ok(body)
}

/// Collapse whitespace, redact credential-shaped substrings, and truncate
/// an upstream error body before it reaches logs or task records.
fn sanitize_error_body(raw: &str) -> String {
    let mut sanitized = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    for pattern in [
        r"sk-[A-Za-z0-9_\-]{20,}",
        r"ghp_[A-Za-z0-9]{20,}",
        r"Bearer [A-Za-z0-9_\-\.]{16,}",
    ] {
        if let Ok(regex) = Regex::new(pattern) {
            sanitized = regex.replace_all(&sanitized, "[REDACTED]").into_owned();
        }
    }

    const MAX_ERROR_BODY_CHARS: usize = 256;
    if sanitized.chars().count() > MAX_ERROR_BODY_CHARS {
        let shortened = sanitized
            .chars()
            .take(MAX_ERROR_BODY_CHARS)
            .collect::<String>();
        return format!("{shortened}...[truncated]");
    }

    sanitized
}

// ---------------------------------------------------------------------------
// Code-fence tolerance
// ---------------------------------------------------------------------------

/// Extract a JSON payload from model output that may be wrapped in a single
/// pair of triple-backtick fences with an optional `json` label.
///
/// This is deliberately not a repair function: invalid JSON inside the
/// fences is returned as-is, and callers fall back to their documented
/// defaults when parsing fails.
pub fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };
    let body = &trimmed[open.saturating_add(3)..];
    let body = match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    };
    let body = body.trim_start();
    let body = body.strip_prefix("json").unwrap_or(body);
    body.trim()
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Text-in/text-out transport to the model backend.
///
/// All implementations must be `Send + Sync`: the trait object is shared
/// across the execution loop, the scheduler, and reflection.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a completion for a single prompt.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] on connection or HTTP failure. A model timeout
    /// is not an error: it yields [`TIMEOUT_SENTINEL`].
    async fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
        temperature: f32,
    ) -> Result<String, LlmError>;

    /// Chat completion over a message history.
    ///
    /// # Errors
    ///
    /// Same contract as [`LlmClient::generate`].
    async fn chat(
        &self,
        messages: &[ChatMessage],
        system: Option<&str>,
        temperature: f32,
    ) -> Result<String, LlmError>;

    /// Embed a text into a vector using the configured embedding model.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] on transport, HTTP, or schema failure.
    async fn embeddings(&self, text: &str) -> Result<Vec<f32>, LlmError>;

    /// Whether the backend is reachable.
    async fn is_available(&self) -> bool;
}
