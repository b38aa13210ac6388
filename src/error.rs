//! Error types with fix suggestions

use thiserror::Error;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, RqlError>;

#[derive(Error, Debug)]
pub enum RqlError {
    // ─────────────────────────────────────────────────────────────
    // Parse errors (RQL-001)
    // ─────────────────────────────────────────────────────────────
    #[error("RQL-001: Parse error at line {line}, column {column}: {message}")]
    Parse {
        message: String,
        line: usize,
        column: usize,
    },

    // ─────────────────────────────────────────────────────────────
    // Registry errors (RQL-010 to RQL-012)
    // ─────────────────────────────────────────────────────────────
    #[error("RQL-010: REF source '{name}' is not registered")]
    SourceNotFound { name: String },

    #[error("RQL-011: REF source '{name}' is of type {source_type}, expected WORKFLOW")]
    SourceNotWorkflow { name: String, source_type: String },

    #[error("RQL-012: Policy '{name}' is not registered")]
    PolicyNotFound { name: String },

    // ─────────────────────────────────────────────────────────────
    // Task spec errors (RQL-020 to RQL-021)
    // ─────────────────────────────────────────────────────────────
    #[error("RQL-020: Task spec not found: {name}@{version}")]
    SpecNotFound { name: String, version: String },

    #[error("RQL-021: Invalid task spec '{name}': {reason}")]
    SpecInvalid { name: String, reason: String },

    // ─────────────────────────────────────────────────────────────
    // Schema errors (RQL-030 to RQL-032)
    // ─────────────────────────────────────────────────────────────
    #[error("RQL-030: Strong determinism requires RETURN JSON for task {task}")]
    StrongRequiresJson { task: String },

    #[error("RQL-031: Strong determinism requires JSON schema for task {task}")]
    SchemaMissing { task: String },

    #[error("RQL-032: {}", format_schema_violations(.violations))]
    Schema { violations: Vec<String> },

    // ─────────────────────────────────────────────────────────────
    // Provider errors (RQL-040 to RQL-041)
    // ─────────────────────────────────────────────────────────────
    #[error("RQL-040: Provider error: {0}")]
    Provider(String),

    #[error("RQL-041: Response was truncated due to token limit ({finish_reason}). Increase max_output_tokens or simplify the request.")]
    ResponseTruncated { finish_reason: String },

    // ─────────────────────────────────────────────────────────────
    // Output canonicalization (RQL-050)
    // ─────────────────────────────────────────────────────────────
    #[error("RQL-050: JSON validation failed: {details}")]
    Canonicalization { details: String },

    // ─────────────────────────────────────────────────────────────
    // Workflow errors (RQL-060 to RQL-061)
    // ─────────────────────────────────────────────────────────────
    #[error("RQL-060: REF call failed: {0}")]
    Workflow(String),

    #[error("RQL-061: Invalid webhook for source: {reason}")]
    InvalidWebhook { reason: String },

    // ─────────────────────────────────────────────────────────────
    // Config errors (RQL-070)
    // ─────────────────────────────────────────────────────────────
    #[error("RQL-070: Config error: {reason}")]
    Config { reason: String },

    // ─────────────────────────────────────────────────────────────
    // Policy blocks (RQL-080 to RQL-081)
    // ─────────────────────────────────────────────────────────────
    #[error("RQL-080: Policy violations in input: {messages}")]
    InputBlocked { messages: String },

    #[error("RQL-081: Policy violations in output: {messages}")]
    OutputBlocked { messages: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl RqlError {
    /// Build a parse error at a 1-based position
    pub fn parse(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self::Parse {
            message: message.into(),
            line,
            column,
        }
    }

    /// Position of a parse error, if this is one
    pub fn position(&self) -> Option<(usize, usize)> {
        match self {
            Self::Parse { line, column, .. } => Some((*line, *column)),
            _ => None,
        }
    }
}

fn format_schema_violations(violations: &[String]) -> String {
    let mut msg = String::from("Schema is not compatible with the model provider:\n");
    for violation in violations {
        msg.push_str("- ");
        msg.push_str(violation);
        msg.push('\n');
    }
    msg.push_str("\nSupported schemas: a root object with string/number/integer/boolean properties, ");
    msg.push_str("no arrays, no nested objects, no composition keywords.\n");
    msg.push_str(r#"Example: {"type": "object", "properties": {"name": {"type": "string"}}}"#);
    msg
}

impl FixSuggestion for RqlError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            RqlError::Parse { .. } => {
                Some("Check statement syntax: every statement ends with ';' and strings use double quotes")
            }
            RqlError::SourceNotFound { .. } => {
                Some("Register the source first: DEFINE SOURCE name TYPE WORKFLOW USING {webhook: \"...\"};")
            }
            RqlError::SourceNotWorkflow { .. } => Some("REF() only accepts sources of TYPE WORKFLOW"),
            RqlError::PolicyNotFound { .. } => {
                Some("Register the policy first: DEFINE POLICY name AS {...};")
            }
            RqlError::SpecNotFound { .. } => Some("Use one of the canonical tasks: ANSWER, SUMMARIZE, EXTRACT"),
            RqlError::SpecInvalid { .. } => Some("Check the task spec YAML fields and types"),
            RqlError::StrongRequiresJson { .. } => {
                Some("Add RETURN JSON or drop REQUIRE DETERMINISM strong")
            }
            RqlError::SchemaMissing { .. } => Some("Pass a schema: {...} task argument"),
            RqlError::Schema { .. } => Some("Flatten the schema to a single object of scalar properties"),
            RqlError::Provider(_) => Some("Check the API key env var (GEMINI_API_KEY) and model name"),
            RqlError::ResponseTruncated { .. } => {
                Some("Raise the budget: WITH decode.max_output_tokens = 4096")
            }
            RqlError::Canonicalization { .. } => {
                Some("The model did not return valid JSON; simplify the schema or the request")
            }
            RqlError::Workflow(_) => Some("Check the workflow webhook is reachable and returns JSON"),
            RqlError::InvalidWebhook { .. } => {
                Some("Set USING {webhook: \"https://...\"} on the WORKFLOW source")
            }
            RqlError::Config { .. } => Some("Check ~/.rql/config.toml and ./rql.toml syntax"),
            RqlError::InputBlocked { .. } => Some("Remove personal data from task arguments"),
            RqlError::OutputBlocked { .. } => {
                Some("Adjust the request or the policy's output rules")
            }
            RqlError::Io(_) => Some("Check file path and permissions"),
            RqlError::Json(_) => Some("Ensure the payload is valid JSON"),
            RqlError::Yaml(_) => Some("Check YAML syntax: indentation and quoting"),
        }
    }
}
