//! Gemini provider using the Generative Language REST API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{GenerateRequest, ModelProvider, ModelResponse, Role, TokenUsage};
use crate::config::LlmConfig;
use crate::error::{Result, RqlError};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const INFER_TIMEOUT: Duration = Duration::from_secs(120);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct GeminiProvider {
    /// Missing keys fail on first call, so non-SELECT statements still run
    api_key: Option<String>,
    api_key_env: String,
    base_url: String,
    client: Client,
}

impl GeminiProvider {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(INFER_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("rql-cli/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RqlError::Provider(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_key: config.resolve_api_key(),
            api_key_env: config.api_key_env.clone(),
            base_url: API_BASE.to_string(),
            client,
        })
    }

    /// Point at another endpoint (proxies, test servers)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            RqlError::Provider(format!(
                "API key not found in config or environment variable: {}",
                self.api_key_env
            ))
        })
    }
}

/// Request body: messages flattened into one user turn, system text prefixed
pub(crate) fn build_body(request: &GenerateRequest) -> Value {
    let text = request
        .messages
        .iter()
        .map(|m| match m.role {
            Role::System => format!("System: {}", m.content),
            Role::Assistant => format!("Assistant: {}", m.content),
            Role::User => m.content.clone(),
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let decode = &request.decode;
    let mut generation = json!({
        "temperature": decode.temperature,
        "topP": decode.top_p,
        "topK": decode.top_k,
        "candidateCount": decode.candidate_count,
        "maxOutputTokens": decode.max_output_tokens,
    });
    if decode.json_mode {
        generation["responseMimeType"] = json!("application/json");
        if let Some(schema) = &decode.json_schema {
            generation["responseSchema"] = schema.clone();
        }
    }

    json!({
        "contents": [{ "role": "user", "parts": [{ "text": text }] }],
        "generationConfig": generation,
    })
}

/// Pull text, usage and finish reason out of a generateContent response
pub(crate) fn parse_response(json: &Value, model: &str) -> Result<ModelResponse> {
    let candidate = json["candidates"]
        .get(0)
        .ok_or_else(|| RqlError::Provider(format!("Response has no candidates: {}", json)))?;

    let content = candidate["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    let usage_meta = &json["usageMetadata"];
    let count = |key: &str| {
        usage_meta[key]
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0)
    };
    let usage = TokenUsage {
        prompt_tokens: count("promptTokenCount"),
        completion_tokens: count("candidatesTokenCount"),
        total_tokens: count("totalTokenCount"),
    };

    Ok(ModelResponse {
        content,
        model: json["modelVersion"].as_str().unwrap_or(model).to_string(),
        usage,
        finish_reason: candidate["finishReason"].as_str().map(String::from),
    })
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<ModelResponse> {
        let api_key = self.api_key()?;
        let url = format!("{}/models/{}:generateContent", self.base_url, request.model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&build_body(request))
            .send()
            .await
            .map_err(|e| RqlError::Provider(format!("Failed to send request to Gemini API: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, model = %request.model, "llm.generate_content.failed");
            return Err(RqlError::Provider(format!(
                "Gemini API error {}: {}",
                status, body
            )));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| RqlError::Provider(format!("Invalid response body: {}", e)))?;
        parse_response(&json, &request.model)
    }
}
