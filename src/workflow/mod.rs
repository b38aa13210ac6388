//! Workflow Collaborator - evidence fetch for REF() calls
//!
//! - [`WorkflowClient`]: async boundary `invoke(endpoint_config, args) -> raw JSON`
//! - [`WebhookClient`]: POSTs args to the source's `webhook` URL (reqwest)
//! - [`MockWorkflow`]: canned payloads per webhook, call recording
//! - [`normalize_records`]: raw payload shapes to a flat record list

mod mock;
mod webhook;

use async_trait::async_trait;
use serde_json::{Map, Value};

pub use mock::MockWorkflow;
pub use webhook::WebhookClient;

use crate::error::Result;

#[async_trait]
pub trait WorkflowClient: Send + Sync {
    /// Invoke the workflow described by a source's USING config
    async fn invoke(
        &self,
        endpoint_config: &Map<String, Value>,
        args: &Map<String, Value>,
    ) -> Result<Value>;
}

/// Normalize a raw workflow payload to a list of records
///
/// Accepts `{"evidence": [...]}`, a bare list, a single object or scalar,
/// and null/empty values (no records).
pub fn normalize_records(raw: Value) -> Vec<Value> {
    match raw {
        Value::Object(mut map) if map.contains_key("evidence") => {
            match map.remove("evidence").unwrap_or(Value::Null) {
                Value::Array(items) => items,
                Value::Null => vec![],
                single => vec![single],
            }
        }
        Value::Array(items) => items,
        Value::Null => vec![],
        Value::Object(map) if map.is_empty() => vec![],
        Value::String(s) if s.is_empty() => vec![],
        single => vec![single],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn evidence_envelope() {
        let records = normalize_records(json!({"evidence": [{"id": "a"}, {"id": "b"}]}));
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn bare_list_and_single_object() {
        assert_eq!(normalize_records(json!([1, 2, 3])).len(), 3);
        assert_eq!(
            normalize_records(json!({"text": "only"})),
            vec![json!({"text": "only"})]
        );
    }

    #[test]
    fn empty_shapes() {
        assert!(normalize_records(Value::Null).is_empty());
        assert!(normalize_records(json!({})).is_empty());
        assert!(normalize_records(json!("")).is_empty());
        assert!(normalize_records(json!({"evidence": null})).is_empty());
    }
}
