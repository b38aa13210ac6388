//! Policy Enforcer - input/output governance for SELECT
//!
//! Only the policy named (or inlined) by the statement's POLICY clause
//! applies; there is no global default layer. Violations are collected,
//! never individually fatal; [`PolicyEnforcer::should_block`] turns the
//! aggregate into a block decision.

pub mod pii;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ast::{PolicyRef, SelectStmt};
use crate::error::{Result, RqlError};
use crate::runtime::Session;

/// Name reported for `POLICY {...}` inline configs
pub const INLINE_POLICY_NAME: &str = "<inline>";

static CITATION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\[\d+\]",
        r"(?i)\(\d+\)",
        r"(?i)Source:",
        r"(?i)Reference:",
        r"(?i)According to",
    ]
    .into_iter()
    .map(|p| Regex::new(p).expect("static citation pattern"))
    .collect()
});

/// Whether the text carries at least one citation marker
pub fn has_citation(text: &str) -> bool {
    CITATION_PATTERNS.iter().any(|re| re.is_match(text))
}

// ═══════════════════════════════════════════
// POLICY CONFIG (typed view of DEFINE POLICY ... AS {...})
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub input: InputRules,
    pub output: OutputRules,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct InputRules {
    pub forbid_pii: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputRules {
    pub require_citations: bool,
    pub forbid_pii_output: bool,
    pub hallucination_mode: HallucinationMode,
}

/// What to do with output violations
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HallucinationMode {
    /// Any violation blocks
    #[default]
    Block,
    /// Same as `Block`: there is no interactive prompt to ask through
    BlockOrAsk,
    /// Any other mode: block only on error-severity violations
    #[serde(other)]
    Lenient,
}

impl HallucinationMode {
    pub fn blocks_any_violation(&self) -> bool {
        matches!(self, Self::Block | Self::BlockOrAsk)
    }
}

impl PolicyConfig {
    /// Typed view of a raw config; unknown keys are ignored, wrongly typed known keys fall back to defaults
    pub fn from_map(config: &Map<String, Value>) -> Self {
        let section = |key: &str| config.get(key).cloned().unwrap_or(Value::Null);
        Self {
            input: serde_json::from_value(section("input")).unwrap_or_default(),
            output: serde_json::from_value(section("output")).unwrap_or_default(),
        }
    }
}

// ═══════════════════════════════════════════
// VIOLATIONS
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    InputPii,
    MissingCitations,
    OutputPii,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub policy_name: String,
    pub kind: ViolationKind,
    pub message: String,
    pub severity: Severity,
}

/// Join violation messages the way blocked results report them
pub fn join_messages(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

// ═══════════════════════════════════════════
// ENFORCER
// ═══════════════════════════════════════════

/// The policies applicable to one SELECT
#[derive(Debug, Clone, Default)]
pub struct PolicyEnforcer {
    policies: Vec<(String, PolicyConfig)>,
}

impl PolicyEnforcer {
    /// Resolve the statement's POLICY clause (unknown names are a registry error)
    pub fn for_statement(stmt: &SelectStmt, session: &Session) -> Result<Self> {
        let policies = match &stmt.policy {
            None => vec![],
            Some(PolicyRef::Named(name)) => {
                let policy = session
                    .registry
                    .get_policy(name)
                    .ok_or_else(|| RqlError::PolicyNotFound { name: name.clone() })?;
                vec![(policy.name.clone(), PolicyConfig::from_map(&policy.config))]
            }
            Some(PolicyRef::Inline(config)) => {
                vec![(INLINE_POLICY_NAME.to_string(), PolicyConfig::from_map(config))]
            }
        };
        Ok(Self { policies })
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Scan string-valued task arguments when `input.forbid_pii` is set
    pub fn validate_input(&self, stmt: &SelectStmt) -> Vec<Violation> {
        let mut violations = Vec::new();
        for (name, config) in &self.policies {
            if !config.input.forbid_pii {
                continue;
            }
            for (arg, text) in stmt.task.string_args() {
                for finding in pii::detect(text) {
                    violations.push(Violation {
                        policy_name: name.clone(),
                        kind: ViolationKind::InputPii,
                        message: format!(
                            "PII detected in input: {} in argument '{}'",
                            finding.pii_type, arg
                        ),
                        severity: Severity::Error,
                    });
                }
            }
        }
        violations
    }

    /// Check citation and PII rules against the stringified output
    pub fn validate_output(&self, output: &str) -> Vec<Violation> {
        let mut violations = Vec::new();
        for (name, config) in &self.policies {
            if config.output.require_citations && !has_citation(output) {
                violations.push(Violation {
                    policy_name: name.clone(),
                    kind: ViolationKind::MissingCitations,
                    message: "Output does not contain required citations".to_string(),
                    severity: Severity::Error,
                });
            }
            if config.output.forbid_pii_output {
                for finding in pii::detect(output) {
                    violations.push(Violation {
                        policy_name: name.clone(),
                        kind: ViolationKind::OutputPii,
                        message: format!(
                            "PII detected in output: {} at {}..{}",
                            finding.pii_type, finding.start, finding.end
                        ),
                        severity: Severity::Error,
                    });
                }
            }
        }
        violations
    }

    /// Block when a policy's hallucination mode blocks everything, else on any error
    pub fn should_block(&self, violations: &[Violation]) -> bool {
        if violations.is_empty() {
            return false;
        }
        if self
            .policies
            .iter()
            .any(|(_, c)| c.output.hallucination_mode.blocks_any_violation())
        {
            return true;
        }
        violations.iter().any(|v| v.severity == Severity::Error)
    }
}
