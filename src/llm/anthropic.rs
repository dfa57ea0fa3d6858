//! Anthropic messages client
//!
//! Same contract as the OpenAI client with the provider's wire quirks:
//! system turns travel in a dedicated field, auth uses the x-api-key
//! header, and responses arrive as content blocks.

use super::{ChatMessage, ModelClient, Role};
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";
const API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    client: Client,
    api_key: String,
    api_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key,
            api_url: API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.0,
            max_tokens: 4096,
        }
    }

    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
            PipelineError::LlmError("ANTHROPIC_API_KEY not configured".to_string())
        })?;
        Ok(Self::new(api_key))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(PipelineError::LlmError(
                "ANTHROPIC_API_KEY not configured".to_string(),
            ));
        }

        let mut system = String::new();
        let mut turns = Vec::with_capacity(messages.len());
        for message in messages {
            if message.role == Role::System {
                if !system.is_empty() {
                    system.push_str("\n\n");
                }
                system.push_str(&message.content);
            } else {
                turns.push(WireMessage { role: message.role, content: &message.content });
            }
        }

        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: if system.is_empty() { None } else { Some(&system) },
            messages: &turns,
        };

        debug!(model = %self.model, message_count = turns.len(), "calling Anthropic messages API");

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Anthropic request failed: {}", e);
                PipelineError::LlmError(format!("Anthropic request error: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, "Anthropic error response: {}", error_text);
            return Err(PipelineError::LlmError(format!(
                "Anthropic API error ({}): {}",
                status, error_text
            )));
        }

        let reply: MessagesResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Anthropic response: {}", e);
            PipelineError::LlmError(format!("Anthropic parse error: {}", e))
        })?;

        reply
            .content
            .into_iter()
            .next()
            .map(|block| block.text)
            .ok_or_else(|| {
                PipelineError::LlmError("Empty content in Anthropic response".to_string())
            })
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: &'a [WireMessage<'a>],
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_turns_are_split_out() {
        let turns = vec![WireMessage { role: Role::User, content: "Compute the ratio" }];
        let request = MessagesRequest {
            model: DEFAULT_MODEL,
            max_tokens: 4096,
            temperature: 0.0,
            system: Some("You only speak JSON"),
            messages: &turns,
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains(r#""system":"You only speak JSON""#));
        assert!(json.contains(r#""role":"user""#));
        assert!(!json.contains(r#""role":"system""#));
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{
            "id": "msg_1",
            "content": [{"type": "text", "text": "{\"answer\": \"0.69\"}"}],
            "stop_reason": "end_turn"
        }"#;
        let parsed: MessagesResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.content[0].text, "{\"answer\": \"0.69\"}");
    }
}
