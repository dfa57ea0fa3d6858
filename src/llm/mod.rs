//! Language model transport layer
//!
//! Thin provider clients behind one trait: a message list in, response text
//! out. Everything above this layer (recovery, handlers, the executor)
//! treats the model as an opaque text function, so providers are swappable
//! and tests run against a scripted double.

pub mod anthropic;
pub mod openai;

use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::warn;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One chat turn in provider wire order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Transport to a language model. Implementations perform exactly one
/// call per `generate`; retry policy lives in [`RetryingClient`], never in
/// the callers.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Test and demo double that replays a fixed queue of responses. An
/// exhausted queue produces a transport error, which doubles as the
/// failure stub for degradation paths.
pub struct ScriptedClient {
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedClient {
    pub fn new(responses: Vec<String>) -> Self {
        Self { responses: Mutex::new(responses.into_iter().collect()) }
    }

    /// A client whose every call fails.
    pub fn exhausted() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn generate(&self, _messages: &[ChatMessage]) -> Result<String> {
        let mut queue = self.responses.lock().await;
        queue.pop_front().ok_or_else(|| {
            PipelineError::LlmError("scripted client has no responses left".to_string())
        })
    }
}

/// Retry decorator over any model client: bounded attempts with linear
/// backoff between them. The wrapped client stays single-shot.
pub struct RetryingClient {
    inner: Arc<dyn ModelClient>,
    max_attempts: u32,
    backoff: Duration,
}

impl RetryingClient {
    pub fn new(inner: Arc<dyn ModelClient>, max_attempts: u32) -> Self {
        Self { inner, max_attempts, backoff: Duration::from_millis(500) }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

#[async_trait]
impl ModelClient for RetryingClient {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.inner.generate(messages).await {
                Ok(text) => return Ok(text),
                Err(error) if attempt < self.max_attempts => {
                    warn!(attempt, max_attempts = self.max_attempts, %error, "model call failed, retrying");
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails a fixed number of times before succeeding.
    struct FlakyClient {
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    impl FlakyClient {
        fn new(failures: u32) -> Self {
            Self { failures_left: AtomicU32::new(failures), calls: AtomicU32::new(0) }
        }
    }

    #[async_trait]
    impl ModelClient for FlakyClient {
        async fn generate(&self, _messages: &[ChatMessage]) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures_left.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
                Err(PipelineError::LlmError("transient failure".to_string()))
            } else {
                Ok("recovered".to_string())
            }
        }
    }

    #[tokio::test]
    async fn scripted_client_replays_in_order() {
        let client = ScriptedClient::new(vec!["first".to_string(), "second".to_string()]);
        let messages = [ChatMessage::user("hi")];
        assert_eq!(client.generate(&messages).await.unwrap(), "first");
        assert_eq!(client.generate(&messages).await.unwrap(), "second");
        assert!(client.generate(&messages).await.is_err());
    }

    #[tokio::test]
    async fn retry_succeeds_after_transient_failures() {
        let flaky = Arc::new(FlakyClient::new(2));
        let client = RetryingClient::new(flaky.clone(), 3).with_backoff(Duration::from_millis(1));
        let text = client.generate(&[ChatMessage::user("hi")]).await.unwrap();
        assert_eq!(text, "recovered");
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_gives_up_after_max_attempts() {
        let flaky = Arc::new(FlakyClient::new(10));
        let client = RetryingClient::new(flaky.clone(), 2).with_backoff(Duration::from_millis(1));
        assert!(client.generate(&[ChatMessage::user("hi")]).await.is_err());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn roles_serialize_lowercase() {
        let message = ChatMessage::system("be precise");
        let json = serde_json::to_string(&message).unwrap();
        assert_eq!(json, r#"{"role":"system","content":"be precise"}"#);
    }
}
