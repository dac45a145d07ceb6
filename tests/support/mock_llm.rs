//! Scripted LLM stub shared by integration tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use volition::llm::{ChatMessage, LlmClient, LlmError};

/// Plays back queued responses in order; once exhausted, repeats the
/// fallback. Records every prompt it receives for assertions.
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<String>>,
    fallback: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    /// Queue a fixed sequence of responses.
    pub fn new(responses: &[&str]) -> Self {
        Self {
            responses: Mutex::new(responses.iter().map(|s| (*s).to_owned()).collect()),
            fallback: String::new(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with the same response.
    pub fn always(response: &str) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: response.to_owned(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// How many generate/chat calls have been made.
    pub fn call_count(&self) -> usize {
        self.prompts.lock().expect("prompts lock").len()
    }

    /// The prompts seen so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }

    fn next_response(&self, prompt: &str) -> String {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(prompt.to_owned());
        self.responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn generate(
        &self,
        prompt: &str,
        _system: Option<&str>,
        _temperature: f32,
    ) -> Result<String, LlmError> {
        Ok(self.next_response(prompt))
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        _system: Option<&str>,
        _temperature: f32,
    ) -> Result<String, LlmError> {
        let joined = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Ok(self.next_response(&joined))
    }

    async fn embeddings(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
        Ok(vec![0.0; 8])
    }

    async fn is_available(&self) -> bool {
        true
    }
}
