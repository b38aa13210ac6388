//! Statement types - closed set, dispatched exhaustively by the planner

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::task::TaskInvocation;

/// A parsed statement
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Statement {
    Set(SetStmt),
    DefineSource(DefineSource),
    DefinePolicy(DefinePolicy),
    Select(SelectStmt),
    Describe(DescribeStmt),
}

impl Statement {
    /// Stable kind label (trace records, logs)
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Set(_) => "SET",
            Self::DefineSource(_) => "DEFINE_SOURCE",
            Self::DefinePolicy(_) => "DEFINE_POLICY",
            Self::Select(_) => "SELECT",
            Self::Describe(_) => "DESCRIBE",
        }
    }
}

/// `SET key = literal;`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetStmt {
    pub key: String,
    pub value: Value,
}

/// `DEFINE SOURCE name TYPE type USING {config} [AS alias];`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefineSource {
    pub name: String,
    pub source_type: String,
    pub config: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl DefineSource {
    pub fn is_workflow(&self) -> bool {
        self.source_type.eq_ignore_ascii_case("WORKFLOW")
    }
}

/// `DEFINE POLICY name AS {config};`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinePolicy {
    pub name: String,
    pub config: Map<String, Value>,
}

/// `DESCRIBE SOURCES|POLICIES;`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DescribeStmt {
    pub target: DescribeTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DescribeTarget {
    Sources,
    Policies,
}

/// Items a SELECT may request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum SelectItem {
    #[serde(rename = "OUTPUT")]
    Output,
    #[serde(rename = "EVIDENCE")]
    Evidence,
    #[serde(rename = "CONFIDENCE")]
    Confidence,
    #[serde(rename = "*")]
    Star,
}

/// Determinism level requested by `REQUIRE DETERMINISM`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Determinism {
    /// Best-effort low-temperature decoding (default)
    #[default]
    Provider,
    /// Schema-constrained JSON, hash-verifiable output
    Strong,
}

impl fmt::Display for Determinism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provider => f.write_str("provider"),
            Self::Strong => f.write_str("strong"),
        }
    }
}

/// `RETURN JSON|TEXT|MARKDOWN`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReturnFormat {
    Json,
    #[default]
    Text,
    Markdown,
}

/// The POLICY clause: a registered name or an inline config
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyRef {
    Named(String),
    Inline(Map<String, Value>),
}

/// `SELECT <items> FROM TASK <NAME>(<args>) [clauses...];`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectStmt {
    pub select_items: BTreeSet<SelectItem>,
    pub task: TaskInvocation,
    /// WITH parameters; dotted keys stay flat (`decode.top_p`)
    pub with_params: BTreeMap<String, Value>,
    pub policy: Option<PolicyRef>,
    pub determinism: Determinism,
    pub return_format: ReturnFormat,
    pub into_var: Option<String>,
}

impl SelectStmt {
    pub fn new(task: TaskInvocation) -> Self {
        Self {
            select_items: BTreeSet::from([SelectItem::Output]),
            task,
            with_params: BTreeMap::new(),
            policy: None,
            determinism: Determinism::default(),
            return_format: ReturnFormat::default(),
            into_var: None,
        }
    }

    fn selects(&self, item: SelectItem) -> bool {
        self.select_items.contains(&item) || self.select_items.contains(&SelectItem::Star)
    }

    pub fn has_output(&self) -> bool {
        self.selects(SelectItem::Output)
    }

    pub fn has_evidence(&self) -> bool {
        self.selects(SelectItem::Evidence)
    }

    pub fn has_confidence(&self) -> bool {
        self.selects(SelectItem::Confidence)
    }

    pub fn returns_json(&self) -> bool {
        self.return_format == ReturnFormat::Json
    }

    /// Name of the named policy, if any
    pub fn policy_name(&self) -> Option<&str> {
        match &self.policy {
            Some(PolicyRef::Named(name)) => Some(name),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TaskName;

    #[test]
    fn star_selects_everything() {
        let mut stmt = SelectStmt::new(TaskInvocation::new(TaskName::Answer));
        assert!(stmt.has_output());
        assert!(!stmt.has_evidence());

        stmt.select_items = BTreeSet::from([SelectItem::Star]);
        assert!(stmt.has_output());
        assert!(stmt.has_evidence());
        assert!(stmt.has_confidence());
    }

    #[test]
    fn defaults_are_provider_and_text() {
        let stmt = SelectStmt::new(TaskInvocation::new(TaskName::Summarize));
        assert_eq!(stmt.determinism, Determinism::Provider);
        assert_eq!(stmt.return_format, ReturnFormat::Text);
        assert!(stmt.policy_name().is_none());
    }

    #[test]
    fn workflow_type_is_case_insensitive() {
        let source = DefineSource {
            name: "kb".into(),
            source_type: "workflow".into(),
            config: Map::new(),
            alias: None,
        };
        assert!(source.is_workflow());
    }

    #[test]
    fn statement_kind_labels() {
        let stmt = Statement::Describe(DescribeStmt {
            target: DescribeTarget::Sources,
        });
        assert_eq!(stmt.kind(), "DESCRIBE");
    }
}
