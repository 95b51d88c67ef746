//! Language-generation capability
//!
//! - `LlmClient` trait and `LlmError`
//! - `AnthropicClient` implementation
//! - `MockLlmClient` scripted double
//! - `extract_json` for pulling structured output out of model text
//! - `PromptRenderer` for filling prompt templates

pub mod anthropic;
pub mod client;
pub mod prompt;
pub mod types;

pub use anthropic::{AnthropicClient, AnthropicConfig};
pub use client::{LlmClient, LlmError, MockLlmClient, extract_json};
pub use prompt::PromptRenderer;
pub use types::{CompletionRequest, CompletionResponse, FinishReason, Message, Role, Usage};
