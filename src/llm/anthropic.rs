//! Anthropic messages API client

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use crate::llm::client::{LlmClient, LlmError};
use crate::llm::types::{CompletionRequest, CompletionResponse, FinishReason, Role, Usage};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Configuration for the Anthropic client
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: Duration::from_secs(120),
        }
    }
}

impl AnthropicConfig {
    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }
}

/// Anthropic API client
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    config: AnthropicConfig,
    usage: Arc<Mutex<Usage>>,
}

impl AnthropicClient {
    /// Create a client, reading the key from `ANTHROPIC_API_KEY`
    pub fn new(config: AnthropicConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var(API_KEY_ENV).map_err(|_| LlmError::MissingApiKey {
            env_var: API_KEY_ENV.to_string(),
        })?;
        Self::with_api_key(api_key, config)
    }

    pub fn with_api_key(api_key: String, config: AnthropicConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Network(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            config,
            usage: Arc::new(Mutex::new(Usage::default())),
        })
    }

    fn build_request(&self, request: &CompletionRequest) -> Value {
        let model = request.model.as_ref().unwrap_or(&self.config.model).clone();
        let max_tokens = request.max_tokens.unwrap_or(self.config.max_tokens);

        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| {
                json!({
                    "role": match m.role {
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    },
                    "content": m.content
                })
            })
            .collect();

        let mut body = json!({
            "model": model,
            "max_tokens": max_tokens,
            "messages": messages
        });

        if !request.system.is_empty() {
            body["system"] = json!(request.system);
        }

        body
    }

    fn parse_response(&self, body: Value) -> Result<CompletionResponse, LlmError> {
        let finish_reason = match body["stop_reason"].as_str() {
            Some("max_tokens") => FinishReason::MaxTokens,
            Some("stop_sequence") => FinishReason::StopSequence,
            _ => FinishReason::EndTurn,
        };

        let usage = match body.get("usage") {
            Some(u) => Usage::new(
                u["input_tokens"].as_u64().unwrap_or(0),
                u["output_tokens"].as_u64().unwrap_or(0),
            ),
            None => Usage::default(),
        };

        if let Ok(mut total) = self.usage.lock() {
            total.add(&usage);
        }

        let blocks = body["content"]
            .as_array()
            .ok_or_else(|| LlmError::InvalidResponse("response has no content array".to_string()))?;

        let content = blocks
            .iter()
            .filter(|b| b["type"].as_str() == Some("text"))
            .filter_map(|b| b["text"].as_str())
            .collect::<Vec<_>>()
            .join("\n");

        Ok(CompletionResponse {
            content,
            finish_reason,
            usage,
        })
    }

    async fn send_request(&self, body: Value) -> Result<Value, LlmError> {
        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(LlmError::RateLimited {
                retry_after: Duration::from_secs(retry_after),
            });
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("failed to parse response: {}", e)))
    }

    /// Cumulative token usage across all calls
    pub fn total_usage(&self) -> Usage {
        self.usage.lock().map(|u| *u).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.build_request(&request);
        let response = self.send_request(body).await?;
        self.parse_response(response)
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("model", &self.config.model)
            .field("max_tokens", &self.config.max_tokens)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> AnthropicClient {
        AnthropicClient::with_api_key("test-key".to_string(), AnthropicConfig::default()).unwrap()
    }

    #[test]
    fn test_config_with_model() {
        let config = AnthropicConfig::with_model("claude-3-haiku-20240307");
        assert_eq!(config.model, "claude-3-haiku-20240307");
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn test_build_request_basic() {
        let request = CompletionRequest::new("Extract a profile").with_user_message("resume text");
        let body = client().build_request(&request);

        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(body["system"], "Extract a profile");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "resume text");
    }

    #[test]
    fn test_build_request_overrides() {
        let mut request = CompletionRequest::new("").with_user_message("hi").with_max_tokens(64);
        request.model = Some("claude-3-haiku-20240307".to_string());
        let body = client().build_request(&request);

        assert_eq!(body["model"], "claude-3-haiku-20240307");
        assert_eq!(body["max_tokens"], 64);
        assert!(body.get("system").is_none());
    }

    #[test]
    fn test_parse_response_joins_text_blocks() {
        let response = client()
            .parse_response(json!({
                "content": [
                    { "type": "text", "text": "{\"score\":" },
                    { "type": "text", "text": "72}" }
                ],
                "stop_reason": "end_turn",
                "usage": { "input_tokens": 10, "output_tokens": 5 }
            }))
            .unwrap();

        assert_eq!(response.content, "{\"score\":\n72}");
        assert_eq!(response.finish_reason, FinishReason::EndTurn);
        assert_eq!(response.usage, Usage::new(10, 5));
    }

    #[test]
    fn test_parse_response_without_content_is_invalid() {
        let err = client().parse_response(json!({ "stop_reason": "end_turn" })).unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
    }

    #[test]
    fn test_total_usage_accumulation() {
        let client = client();
        for (i, o) in [(100, 50), (200, 100)] {
            let _ = client.parse_response(json!({
                "content": [],
                "stop_reason": "max_tokens",
                "usage": { "input_tokens": i, "output_tokens": o }
            }));
        }
        assert_eq!(client.total_usage(), Usage::new(300, 150));
    }

    #[test]
    fn test_debug_hides_api_key() {
        let debug_str = format!("{:?}", client());
        assert!(debug_str.contains("AnthropicClient"));
        assert!(!debug_str.contains("test-key"));
    }

    #[test]
    fn test_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AnthropicClient>();
    }
}
