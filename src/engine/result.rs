//! Execution results - the uniform return value of every statement

use serde::Serialize;
use serde_json::{Map, Value};

use crate::ast::Determinism;
use crate::error::{FixSuggestion, RqlError};
use crate::evidence::EvidenceItem;

/// Auditable summary of one SELECT execution
///
/// `output_hash` is only present on the strong path, where the output is
/// canonical JSON and the hash is reproducible byte for byte.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReasoningContract {
    pub task: String,
    pub determinism_level: Determinism,
    pub evidence_hash: Option<String>,
    pub output_hash: Option<String>,
}

/// States of the task-execution state machine, recorded in result metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    SpecLoaded,
    ParamsValidated,
    EvidenceResolved,
    ProviderPath,
    StrongPath,
    Completed,
    Failed,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SpecLoaded => "spec_loaded",
            Self::ParamsValidated => "params_validated",
            Self::EvidenceResolved => "evidence_resolved",
            Self::ProviderPath => "provider_path",
            Self::StrongPath => "strong_path",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// One-line fix hint for `error`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Vec<EvidenceItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_contract: Option<ReasoningContract>,
}

impl ExecResult {
    /// Success without output (SET/DEFINE in quiet mode)
    pub fn ok() -> Self {
        Self {
            success: true,
            output: None,
            error: None,
            hint: None,
            metadata: Map::new(),
            confidence: None,
            evidence: None,
            reasoning_contract: None,
        }
    }

    pub fn with_output(output: impl Into<String>) -> Self {
        Self {
            output: Some(output.into()),
            ..Self::ok()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::ok()
        }
    }

    /// Failure carrying the error's message and fix suggestion
    pub fn from_error(err: &RqlError) -> Self {
        Self {
            hint: err.fix_suggestion().map(String::from),
            ..Self::failure(err.to_string())
        }
    }

    pub fn insert_metadata(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn has_output(&self) -> bool {
        self.output.as_deref().is_some_and(|o| !o.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failure_from_error_carries_hint() {
        let result = ExecResult::from_error(&RqlError::PolicyNotFound { name: "p".into() });
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().starts_with("RQL-012"));
        assert!(result.hint.is_some());
        assert!(!result.has_output());
    }

    #[test]
    fn serializes_without_empty_fields() {
        let value = serde_json::to_value(ExecResult::with_output("hi")).unwrap();
        assert_eq!(value, json!({"success": true, "output": "hi"}));
    }

    #[test]
    fn contract_serializes_determinism_lowercase() {
        let contract = ReasoningContract {
            task: "ANSWER".into(),
            determinism_level: Determinism::Strong,
            evidence_hash: None,
            output_hash: Some("abc".into()),
        };
        assert_eq!(
            serde_json::to_value(&contract).unwrap(),
            json!({"task": "ANSWER", "determinism_level": "strong", "evidence_hash": null, "output_hash": "abc"})
        );
        assert_eq!(serde_json::to_value(TaskState::SpecLoaded).unwrap(), json!("spec_loaded"));
    }
}
