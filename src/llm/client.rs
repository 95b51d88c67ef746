//! Language-generation capability: trait, errors, and a scripted client

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use super::types::{CompletionRequest, CompletionResponse};

/// Stateless LLM client - each call is independent (fresh context)
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Single completion request
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Model identifier, for logging and score provenance
    fn model(&self) -> &str;
}

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Missing API key: environment variable {env_var} not set")]
    MissingApiKey { env_var: String },

    #[error("Capability unavailable: {0}")]
    Unavailable(String),
}

impl LlmError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. })
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } => true,
            LlmError::ApiError { status, .. } => *status >= 500,
            LlmError::Network(_) => true,
            LlmError::Unavailable(_) => true,
            LlmError::InvalidResponse(_) => false,
            LlmError::MissingApiKey { .. } => false,
        }
    }
}

/// Pull the first JSON object or array out of model text.
///
/// Models wrap JSON in prose or code fences often enough that a strict parse
/// of the whole response is not usable.
pub fn extract_json(text: &str) -> Result<serde_json::Value, LlmError> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(text.trim()) {
        return Ok(value);
    }

    let start = text.find(['{', '[']);
    let end = text.rfind(['}', ']']);
    match (start, end) {
        (Some(s), Some(e)) if e > s => serde_json::from_str(&text[s..=e])
            .map_err(|err| LlmError::InvalidResponse(format!("unparseable JSON in response: {}", err))),
        _ => Err(LlmError::InvalidResponse("no JSON found in response".to_string())),
    }
}

/// Scripted LLM client. Pops one queued reply per call; an empty queue
/// yields `Unavailable`.
pub struct MockLlmClient {
    replies: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl MockLlmClient {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Ok).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a failure as the next reply
    pub fn push_failure(&self, message: impl Into<String>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(Err(message.into()));
        }
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(Ok(reply.into()));
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request);
        }
        let next = self.replies.lock().ok().and_then(|mut r| r.pop_front());
        match next {
            Some(Ok(text)) => Ok(CompletionResponse::text(text)),
            Some(Err(message)) => Err(LlmError::Unavailable(message)),
            None => Err(LlmError::Unavailable("no scripted reply".to_string())),
        }
    }

    fn model(&self) -> &str {
        "mock-model"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_error_is_retryable() {
        assert!(
            LlmError::RateLimited {
                retry_after: Duration::from_secs(60)
            }
            .is_retryable()
        );
        assert!(
            LlmError::ApiError {
                status: 503,
                message: "overloaded".to_string()
            }
            .is_retryable()
        );
        assert!(
            !LlmError::ApiError {
                status: 400,
                message: "Bad request".to_string()
            }
            .is_retryable()
        );
        assert!(!LlmError::InvalidResponse("bad".to_string()).is_retryable());
    }

    #[test]
    fn test_extract_json_plain() {
        let value = extract_json(r#"{"score": 80}"#).unwrap();
        assert_eq!(value["score"], 80);
    }

    #[test]
    fn test_extract_json_wrapped_in_prose() {
        let text = "Sure! Here it is:\n```json\n{\"queries\": [\"a\", \"b\"]}\n```\nGood luck.";
        let value = extract_json(text).unwrap();
        assert_eq!(value["queries"][1], "b");
    }

    #[test]
    fn test_extract_json_missing() {
        assert!(matches!(extract_json("no json here"), Err(LlmError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_mock_client_replies_in_order() {
        let mock = MockLlmClient::new(vec!["first".to_string()]);
        mock.push_failure("down");

        let first = mock.complete(CompletionRequest::new("s")).await.unwrap();
        assert_eq!(first.content, "first");
        assert!(mock.complete(CompletionRequest::new("s")).await.is_err());
        assert!(mock.complete(CompletionRequest::new("s")).await.is_err());
        assert_eq!(mock.call_count(), 3);
        assert_eq!(mock.model(), "mock-model");
    }
}
