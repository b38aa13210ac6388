//! Mock provider for testing
//!
//! Returns configurable responses without making real API calls.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{GenerateRequest, ModelProvider, ModelResponse, TokenUsage};
use crate::error::{Result, RqlError};

#[derive(Debug, Clone)]
enum Reply {
    Text {
        content: String,
        finish_reason: Option<String>,
    },
    Fail(String),
}

/// Mock provider that returns predefined responses
///
/// Clones share the queue and the request log, so a test can keep a handle
/// after giving the provider to the engine.
#[derive(Clone)]
pub struct MockProvider {
    /// Queue of replies to return (FIFO)
    replies: Arc<Mutex<VecDeque<Reply>>>,
    /// Default response when queue is empty
    default_response: String,
    /// Track all requests made (for assertions)
    requests: Arc<Mutex<Vec<GenerateRequest>>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::new())),
            default_response: "Mock response".to_string(),
            requests: Arc::new(Mutex::new(vec![])),
        }
    }

    /// Create with a queue of responses
    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let provider = Self::new();
        for response in responses {
            provider.queue_response(response);
        }
        provider
    }

    pub fn queue_response(&self, content: impl Into<String>) {
        self.replies.lock().push_back(Reply::Text {
            content: content.into(),
            finish_reason: Some("STOP".to_string()),
        });
    }

    /// Queue a response with a specific finish reason (e.g. "MAX_TOKENS")
    pub fn queue_finish(&self, content: impl Into<String>, finish_reason: impl Into<String>) {
        self.replies.lock().push_back(Reply::Text {
            content: content.into(),
            finish_reason: Some(finish_reason.into()),
        });
    }

    /// Queue a failing call
    pub fn queue_failure(&self, message: impl Into<String>) {
        self.replies.lock().push_back(Reply::Fail(message.into()));
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> Option<GenerateRequest> {
        self.requests.lock().last().cloned()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<ModelResponse> {
        self.requests.lock().push(request.clone());

        let reply = self.replies.lock().pop_front();
        let (content, finish_reason) = match reply {
            Some(Reply::Text {
                content,
                finish_reason,
            }) => (content, finish_reason),
            Some(Reply::Fail(message)) => return Err(RqlError::Provider(message)),
            None => (self.default_response.clone(), Some("STOP".to_string())),
        };

        let prompt_chars = request.messages.iter().map(|m| m.content.len()).sum();
        Ok(ModelResponse {
            usage: TokenUsage::estimate(prompt_chars, content.len()),
            content,
            model: request.model.clone(),
            finish_reason,
        })
    }
}
