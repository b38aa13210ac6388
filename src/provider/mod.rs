//! # Model Provider Layer
//!
//! The engine's only view of a generative model: one `generate` call per task.
//!
//! - [`ModelProvider`] - async trait implemented by every backend
//! - [`GeminiProvider`] - Google Gemini REST API (reqwest)
//! - [`MockProvider`] - queued responses, request recording, failure simulation
//!
//! Authentication, transport timeouts and retries belong to the backend;
//! the engine treats every call as an opaque, possibly-failing remote call.

mod gemini;
mod mock;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use gemini::GeminiProvider;
pub use mock::MockProvider;

use crate::config::LlmConfig;
use crate::error::{Result, RqlError};

// ============================================================================
// Message Types
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => f.write_str("system"),
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

// ============================================================================
// Request / Response
// ============================================================================

/// Decoding parameters sent with every call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecodeConfig {
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub candidate_count: u32,
    pub max_output_tokens: u32,
    #[serde(default)]
    pub json_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_schema: Option<Value>,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            top_p: 0.0,
            top_k: 1,
            candidate_count: 1,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            json_mode: false,
            json_schema: None,
        }
    }
}

pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 2048;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GenerateRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub decode: DecodeConfig,
}

/// Token usage statistics for a request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Rough estimate from character counts (about 4 chars per token)
    pub fn estimate(prompt_chars: usize, completion_chars: usize) -> Self {
        let tokens = |chars: usize| u32::try_from(chars.div_ceil(4)).unwrap_or(u32::MAX);
        Self::new(tokens(prompt_chars), tokens(completion_chars))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelResponse {
    pub content: String,
    pub model: String,
    pub usage: TokenUsage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

impl ModelResponse {
    /// Provider stopped because the output-token budget ran out
    pub fn is_truncated(&self) -> bool {
        self.finish_reason.as_deref().is_some_and(is_truncation)
    }
}

/// Finish reasons that mean "cut off at the token limit" across providers
pub fn is_truncation(finish_reason: &str) -> bool {
    ["MAX_TOKENS", "length", "FinishReason.MAX_TOKENS"]
        .iter()
        .any(|r| finish_reason.eq_ignore_ascii_case(r))
}

// ============================================================================
// Provider trait
// ============================================================================

#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name (e.g. "gemini", "mock")
    fn name(&self) -> &str;

    /// Issue exactly one generation call
    async fn generate(&self, request: &GenerateRequest) -> Result<ModelResponse>;
}

/// Create a provider from config (`gemini` or `mock`)
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn ModelProvider>> {
    let name = config.provider.as_str();
    if name.eq_ignore_ascii_case("gemini") || name.eq_ignore_ascii_case("google-genai") {
        Ok(Arc::new(GeminiProvider::from_config(config)?))
    } else if name.eq_ignore_ascii_case("mock") {
        Ok(Arc::new(MockProvider::new()))
    } else {
        Err(RqlError::Config {
            reason: format!("Unknown provider: '{}'. Available: gemini, mock", name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_reasons() {
        assert!(is_truncation("MAX_TOKENS"));
        assert!(is_truncation("max_tokens"));
        assert!(is_truncation("length"));
        assert!(!is_truncation("STOP"));
    }

    #[test]
    fn usage_estimate_totals() {
        let usage = TokenUsage::estimate(100, 10);
        assert_eq!(usage.prompt_tokens, 25);
        assert_eq!(usage.completion_tokens, 3);
        assert_eq!(usage.total_tokens, 28);
    }

    #[test]
    fn create_known_and_unknown_providers() {
        let mock = LlmConfig {
            provider: "mock".into(),
            ..LlmConfig::default()
        };
        assert_eq!(create_provider(&mock).unwrap().name(), "mock");

        let unknown = LlmConfig {
            provider: "nope".into(),
            ..LlmConfig::default()
        };
        assert!(matches!(
            create_provider(&unknown),
            Err(RqlError::Config { .. })
        ));
    }

    #[test]
    fn default_decode_is_greedy() {
        let decode = DecodeConfig::default();
        assert_eq!(decode.temperature, 0.0);
        assert_eq!(decode.top_k, 1);
        assert_eq!(decode.max_output_tokens, 2048);
        assert!(!decode.json_mode);
    }
}
