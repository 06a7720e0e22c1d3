//! Language model capability
//!
//! The pipeline depends only on a text-in/text-out contract: structured
//! prompts go in, free text (sometimes JSON-shaped) comes out.
//! The OpenAI-compatible adapter uses a long-lived reqwest::Client for
//! connection pooling.

use crate::error::PipelineError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

/// Capability interface consumed by every LLM-backed component.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Run one system+user exchange and return the model's text.
    async fn complete(&self, system: &str, user: &str) -> crate::Result<String>;
}

/// Reusable OpenAI-compatible chat client (connection-pooled)
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key,
            model,
            base_url: "https://api.openai.com/v1/chat/completions".to_string(),
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn complete(&self, system: &str, user: &str) -> crate::Result<String> {
        if self.api_key.is_empty() {
            return Err(PipelineError::ConfigError(
                "OPENAI_API_KEY not configured".to_string(),
            ));
        }

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            temperature: 0.0,
        };

        debug!(model = %self.model, "Calling chat completions API");

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Chat completions request failed: {}", e);
                PipelineError::LlmError(format!("Chat API error: {}", e))
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Chat completions error response: {}", error_text);
            return Err(PipelineError::LlmError(format!(
                "Chat API error: {}",
                error_text
            )));
        }

        let chat_response: ChatResponse = response.json().await.map_err(|e| {
            error!("Failed to parse chat response: {}", e);
            PipelineError::LlmError(format!("Chat parse error: {}", e))
        })?;

        let answer = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::LlmError("No choices in chat response".to_string()))?
            .message
            .content;

        Ok(answer.trim().to_string())
    }
}

/// Strip an optional markdown ```json fence so the payload parses cleanly.
pub fn strip_code_fence(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}
