//! Mock workflow client: canned payloads keyed by webhook

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use super::WorkflowClient;
use crate::error::{Result, RqlError};

/// One recorded call: the webhook it targeted and the args it sent
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowCall {
    pub webhook: Option<String>,
    pub args: Map<String, Value>,
}

#[derive(Clone, Default)]
pub struct MockWorkflow {
    payloads: Arc<Mutex<HashMap<String, Value>>>,
    fallback: Option<Value>,
    calls: Arc<Mutex<Vec<WorkflowCall>>>,
}

impl MockWorkflow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payload returned for any webhook without a specific entry
    pub fn with_fallback(mut self, payload: Value) -> Self {
        self.fallback = Some(payload);
        self
    }

    /// Payload returned for one webhook URL
    pub fn with_payload(self, webhook: impl Into<String>, payload: Value) -> Self {
        self.payloads.lock().insert(webhook.into(), payload);
        self
    }

    pub fn calls(&self) -> Vec<WorkflowCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl WorkflowClient for MockWorkflow {
    async fn invoke(
        &self,
        endpoint_config: &Map<String, Value>,
        args: &Map<String, Value>,
    ) -> Result<Value> {
        let webhook = endpoint_config
            .get("webhook")
            .and_then(Value::as_str)
            .map(String::from);
        self.calls.lock().push(WorkflowCall {
            webhook: webhook.clone(),
            args: args.clone(),
        });

        let specific = webhook
            .as_deref()
            .and_then(|w| self.payloads.lock().get(w).cloned());
        specific.or_else(|| self.fallback.clone()).ok_or_else(|| {
            RqlError::Workflow(format!(
                "no mock payload for webhook {}",
                webhook.as_deref().unwrap_or("<none>")
            ))
        })
    }
}
