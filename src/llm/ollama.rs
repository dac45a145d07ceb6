//! Ollama-backed implementation of [`LlmClient`].
//!
//! Talks to a local Ollama daemon over HTTP. Generation timeouts surface as
//! [`TIMEOUT_SENTINEL`] rather than errors so that a slow CPU-bound model
//! degrades gracefully.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use crate::config::LlmConfig;

use super::{check_http_response, ChatMessage, ChatRole, LlmClient, LlmError, TIMEOUT_SENTINEL};

/// Client for a local Ollama daemon.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    host: String,
    model: String,
    embedding_model: String,
    context_length: u32,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl OllamaClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(cfg: &LlmConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            host: cfg.host.trim_end_matches('/').to_owned(),
            model: cfg.model.clone(),
            embedding_model: cfg.embedding_model.clone(),
            context_length: cfg.context_length,
            timeout_secs: cfg.timeout_secs,
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.host)
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, LlmError> {
        let response = self
            .client
            .post(self.endpoint(path))
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await?;
        let payload = check_http_response(response).await?;
        serde_json::from_str(&payload).map_err(|e| LlmError::Parse(e.to_string()))
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
        temperature: f32,
    ) -> Result<String, LlmError> {
        let mut body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": temperature,
                "num_ctx": self.context_length,
                "top_p": 0.9,
                "repeat_penalty": 1.1,
            },
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }

        match self.post_json("/api/generate", &body).await {
            Ok(parsed) => Ok(parsed
                .get("response")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned()),
            Err(LlmError::Request(e)) if e.is_timeout() => {
                warn!(
                    timeout_secs = self.timeout_secs,
                    "llm generation timed out"
                );
                Ok(TIMEOUT_SENTINEL.to_owned())
            }
            Err(e) => Err(e),
        }
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        system: Option<&str>,
        temperature: f32,
    ) -> Result<String, LlmError> {
        let mut chat_messages: Vec<Value> = Vec::new();
        if let Some(system) = system {
            chat_messages.push(json!({"role": "system", "content": system}));
        }
        for message in messages {
            chat_messages.push(json!({
                "role": ollama_role(message.role),
                "content": message.content,
            }));
        }

        let body = json!({
            "model": self.model,
            "messages": chat_messages,
            "stream": false,
            "options": {
                "temperature": temperature,
                "num_ctx": self.context_length,
            },
        });

        match self.post_json("/api/chat", &body).await {
            Ok(parsed) => Ok(parsed
                .get("message")
                .and_then(|message| message.get("content"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned()),
            Err(LlmError::Request(e)) if e.is_timeout() => {
                warn!(timeout_secs = self.timeout_secs, "llm chat timed out");
                Ok(TIMEOUT_SENTINEL.to_owned())
            }
            Err(e) => Err(e),
        }
    }

    async fn embeddings(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let body = json!({
            "model": self.embedding_model,
            "prompt": text,
        });
        let parsed = self.post_json("/api/embeddings", &body).await?;
        let values = parsed
            .get("embedding")
            .and_then(Value::as_array)
            .ok_or_else(|| LlmError::Parse("embeddings response missing 'embedding'".to_owned()))?;

        #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
        let vector = values
            .iter()
            .filter_map(Value::as_f64)
            .map(|v| v as f32)
            .collect();
        Ok(vector)
    }

    async fn is_available(&self) -> bool {
        match self.client.get(self.endpoint("/api/tags")).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

fn ollama_role(role: ChatRole) -> &'static str {
    match role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
    }
}
