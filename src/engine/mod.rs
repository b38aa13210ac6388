//! Task Execution Engine - the determinism state machine
//!
//! `SpecLoaded -> ParamsValidated -> EvidenceResolved -> {ProviderPath | StrongPath}
//! -> Completed | Failed`
//!
//! - Provider path: one model call under the decode floor, raw text out,
//!   fixed confidence, contract without an output hash.
//! - Strong path: RETURN JSON gate (EXTRACT exempt), schema selection,
//!   sanitization and shape check, one JSON-mode call, canonical JSON out,
//!   `output_hash = sha256(canonical output)`.
//!
//! The engine only reads the session. Every failure is converted to an
//! `ExecResult { success: false }` at this boundary.

pub mod decode;
pub mod output;
pub mod prompt;
pub mod result;
pub mod schema;

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::ast::{Determinism, SelectStmt, TaskInvocation, TaskName};
use crate::config::RqlConfig;
use crate::error::{Result, RqlError};
use crate::evidence::{EvidenceItem, RefResolver};
use crate::provider::{create_provider, ChatMessage, DecodeConfig, GenerateRequest, ModelProvider, ModelResponse};
use crate::runtime::Session;
use crate::spec::{SpecRegistry, TaskSpec, CURRENT_VERSION};
use crate::util::sha256_hex;
use crate::workflow::{WebhookClient, WorkflowClient};

pub use decode::build_decode_config;
pub use output::canonicalize_output;
pub use result::{ExecResult, ReasoningContract, TaskState};
use schema::SchemaSource;

/// Placeholder confidence for the provider path (not calibrated)
pub const PROVIDER_CONFIDENCE: f64 = 0.8;
/// Strong determinism is full confidence by definition
pub const STRONG_CONFIDENCE: f64 = 1.0;

/// How a strong-path call is structured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    SinglePass,
    TwoPass,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SinglePass => "single_pass",
            Self::TwoPass => "two_pass",
        }
    }
}

/// Evidence gathered for one task invocation
#[derive(Debug, Default)]
struct TaskEvidence {
    items: Vec<EvidenceItem>,
    hash: Option<String>,
    /// Source the evidence was fetched from
    source: Option<String>,
    /// REF arguments after the first, which are not resolved
    ignored_refs: Vec<String>,
}

/// Canonical strong-path output with the response it came from
struct Rendered {
    canonical: String,
    response: ModelResponse,
}

pub struct TaskEngine {
    provider: Arc<dyn ModelProvider>,
    workflow: Arc<dyn WorkflowClient>,
    specs: SpecRegistry,
}

impl TaskEngine {
    pub fn new(provider: Arc<dyn ModelProvider>, workflow: Arc<dyn WorkflowClient>) -> Self {
        Self {
            provider,
            workflow,
            specs: SpecRegistry::new(),
        }
    }

    /// Provider and webhook client built from config
    pub fn from_config(config: &RqlConfig) -> Result<Self> {
        let provider = create_provider(&config.llm)?;
        let workflow: Arc<dyn WorkflowClient> = Arc::new(WebhookClient::new(&config.workflow)?);
        Ok(Self::new(provider, workflow))
    }

    /// Replace the spec registry (e.g. one reading an on-disk spec directory)
    pub fn with_spec_registry(mut self, specs: SpecRegistry) -> Self {
        self.specs = specs;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn specs(&self) -> &SpecRegistry {
        &self.specs
    }

    /// Execute one SELECT statement
    #[instrument(name = "task", skip_all, fields(task = %stmt.task.name, determinism = %stmt.determinism))]
    pub async fn execute(&self, stmt: &SelectStmt, session: &Session) -> ExecResult {
        let mut states = Vec::new();
        let mut result = match self.run(stmt, session, &mut states).await {
            Ok(result) => {
                states.push(TaskState::Completed);
                result
            }
            Err(err) => {
                warn!(error = %err, "task.execute.failed");
                states.push(TaskState::Failed);
                ExecResult::from_error(&err)
            }
        };
        result.insert_metadata(
            "states",
            Value::Array(states.iter().map(|s| Value::from(s.as_str())).collect()),
        );
        result
    }

    async fn run(
        &self,
        stmt: &SelectStmt,
        session: &Session,
        states: &mut Vec<TaskState>,
    ) -> Result<ExecResult> {
        let spec = self.specs.load(stmt.task.name.spec_name(), CURRENT_VERSION)?;
        states.push(TaskState::SpecLoaded);
        debug!(spec_id = %spec.spec_id, spec_hash = %spec.spec_hash, "task.spec.loaded");

        // Arguments are accepted as given; specs do not declare parameters yet
        states.push(TaskState::ParamsValidated);

        let evidence = self.resolve_evidence(&stmt.task, session).await?;
        states.push(TaskState::EvidenceResolved);
        debug!(
            evidence_count = evidence.items.len(),
            has_evidence = !evidence.items.is_empty(),
            "task.evidence.resolved"
        );

        let mut result = match stmt.determinism {
            Determinism::Provider => {
                states.push(TaskState::ProviderPath);
                self.execute_provider(stmt, &spec, &evidence, session).await?
            }
            Determinism::Strong => {
                states.push(TaskState::StrongPath);
                self.execute_strong(stmt, &spec, &evidence, session).await?
            }
        };

        result.insert_metadata("spec_id", spec.spec_id.clone());
        result.insert_metadata("spec_hash", spec.spec_hash.clone());
        result.insert_metadata("evidence_count", evidence.items.len());
        if let Some(source) = &evidence.source {
            result.insert_metadata("ref_source", source.clone());
        }
        if !evidence.ignored_refs.is_empty() {
            result.insert_metadata("ignored_refs", evidence.ignored_refs.clone());
        }
        Ok(result)
    }

    /// Resolve the first REF argument; later ones are reported, not fetched
    async fn resolve_evidence(&self, task: &TaskInvocation, session: &Session) -> Result<TaskEvidence> {
        let refs = task.ref_calls();
        let Some((arg, call)) = refs.first() else {
            return Ok(TaskEvidence::default());
        };

        let ignored_refs: Vec<String> = refs[1..].iter().map(|(k, _)| k.to_string()).collect();
        if !ignored_refs.is_empty() {
            warn!(
                resolved = %arg,
                ignored = ?ignored_refs,
                "only the first REF argument is resolved"
            );
        }

        let resolved = RefResolver::new(self.workflow.as_ref()).resolve(call, session).await?;
        Ok(TaskEvidence {
            items: resolved.evidence,
            hash: Some(resolved.evidence_hash),
            source: Some(resolved.source),
            ignored_refs,
        })
    }

    // ═══════════════════════════════════════════
    // PROVIDER PATH
    // ═══════════════════════════════════════════

    async fn execute_provider(
        &self,
        stmt: &SelectStmt,
        spec: &TaskSpec,
        evidence: &TaskEvidence,
        session: &Session,
    ) -> Result<ExecResult> {
        let schema = stmt.task.value("schema").filter(|v| !v.is_null());
        let messages = prompt::build_messages(
            spec,
            &stmt.task,
            &evidence.items,
            schema,
            Determinism::Provider,
        );
        let decode = build_decode_config(spec, &stmt.with_params, session.max_tokens());
        let response = self.call_model(messages, decode, session).await?;

        // Provider-path output is passed through unvalidated
        let mut result = ExecResult {
            output: Some(response.content.clone()),
            confidence: Some(PROVIDER_CONFIDENCE),
            evidence: Some(evidence.items.clone()),
            reasoning_contract: Some(ReasoningContract {
                task: stmt.task.name.as_str().to_string(),
                determinism_level: Determinism::Provider,
                evidence_hash: evidence.hash.clone(),
                output_hash: None,
            }),
            ..ExecResult::ok()
        };
        record_response(&mut result, &response);
        Ok(result)
    }

    // ═══════════════════════════════════════════
    // STRONG PATH
    // ═══════════════════════════════════════════

    async fn execute_strong(
        &self,
        stmt: &SelectStmt,
        spec: &TaskSpec,
        evidence: &TaskEvidence,
        session: &Session,
    ) -> Result<ExecResult> {
        let task = stmt.task.name;
        if !stmt.returns_json() && task != TaskName::Extract {
            return Err(RqlError::StrongRequiresJson {
                task: task.as_str().to_string(),
            });
        }

        let (raw_schema, source) = select_schema(stmt, spec)?;
        let json_schema = schema::sanitize(&raw_schema);
        debug!(
            schema_source = source.as_str(),
            removed_unsupported = json_schema != raw_schema,
            "task.schema.processed"
        );
        schema::validate_shape(&json_schema)?;
        schema::check_well_formed(&json_schema)?;

        let mode = if evidence.items.is_empty() {
            ExecutionMode::SinglePass
        } else {
            ExecutionMode::TwoPass
        };
        info!(
            execution_mode = mode.as_str(),
            evidence_count = evidence.items.len(),
            "task.strong.mode"
        );

        let rendered = self
            .render_json(stmt, spec, evidence, session, &json_schema, mode)
            .await?;

        let output_hash = sha256_hex(&rendered.canonical);
        let schema_valid = serde_json::from_str::<Value>(&rendered.canonical)
            .map(|value| schema::conforms(&json_schema, &value))
            .unwrap_or(false);
        if !schema_valid {
            warn!(task = %task, "strong output does not conform to its schema");
        }

        let mut result = ExecResult {
            output: Some(rendered.canonical),
            confidence: Some(STRONG_CONFIDENCE),
            evidence: Some(evidence.items.clone()),
            reasoning_contract: Some(ReasoningContract {
                task: task.as_str().to_string(),
                determinism_level: Determinism::Strong,
                evidence_hash: evidence.hash.clone(),
                output_hash: Some(output_hash),
            }),
            ..ExecResult::ok()
        };
        record_response(&mut result, &rendered.response);
        result.insert_metadata("execution_mode", mode.as_str());
        result.insert_metadata("schema_source", source.as_str());
        result.insert_metadata("schema_valid", schema_valid);
        Ok(result)
    }

    /// One JSON-mode call; both modes share it, evidence only shapes the prompt
    async fn render_json(
        &self,
        stmt: &SelectStmt,
        spec: &TaskSpec,
        evidence: &TaskEvidence,
        session: &Session,
        json_schema: &Value,
        mode: ExecutionMode,
    ) -> Result<Rendered> {
        let messages = prompt::build_messages(
            spec,
            &stmt.task,
            &evidence.items,
            Some(json_schema),
            Determinism::Strong,
        );
        let decode = json_decode(spec, stmt, session, json_schema);
        debug!(execution_mode = mode.as_str(), "task.strong.render");
        let response = self.call_model(messages, decode, session).await?;
        let canonical = canonicalize_output(&response.content)?;
        Ok(Rendered { canonical, response })
    }

    // ═══════════════════════════════════════════
    // MODEL CALL
    // ═══════════════════════════════════════════

    /// Exactly one provider call; truncation is fatal on every path
    async fn call_model(
        &self,
        messages: Vec<ChatMessage>,
        decode: DecodeConfig,
        session: &Session,
    ) -> Result<ModelResponse> {
        let request = GenerateRequest {
            model: session.model(),
            messages,
            decode,
        };
        debug!(
            provider = self.provider.name(),
            model = %request.model,
            json_mode = request.decode.json_mode,
            max_output_tokens = request.decode.max_output_tokens,
            "llm.request"
        );

        let response = self.provider.generate(&request).await?;
        if response.is_truncated() {
            return Err(RqlError::ResponseTruncated {
                finish_reason: response.finish_reason.clone().unwrap_or_default(),
            });
        }
        Ok(response)
    }
}

fn json_decode(spec: &TaskSpec, stmt: &SelectStmt, session: &Session, json_schema: &Value) -> DecodeConfig {
    DecodeConfig {
        json_mode: true,
        json_schema: Some(json_schema.clone()),
        ..build_decode_config(spec, &stmt.with_params, session.max_tokens())
    }
}

/// Schema argument, then the spec's render schema, then (ANSWER only) the default
fn select_schema(stmt: &SelectStmt, spec: &TaskSpec) -> Result<(Value, SchemaSource)> {
    if let Some(arg) = stmt.task.value("schema") {
        if let Some(schema) = schema::schema_from_arg(arg)? {
            return Ok((schema, SchemaSource::TaskArgs));
        }
    }
    if let Some(schema) = spec
        .render
        .json_schema
        .as_ref()
        .filter(|s| s.as_object().is_some_and(|m| !m.is_empty()))
    {
        return Ok((schema.clone(), SchemaSource::SpecDefault));
    }
    if stmt.task.name == TaskName::Answer {
        return Ok((schema::answer_default_schema(), SchemaSource::AnswerDefault));
    }
    Err(RqlError::SchemaMissing {
        task: stmt.task.name.as_str().to_string(),
    })
}

fn record_response(result: &mut ExecResult, response: &ModelResponse) {
    result.insert_metadata("model", response.model.clone());
    result.insert_metadata(
        "usage",
        json!({
            "prompt_tokens": response.usage.prompt_tokens,
            "completion_tokens": response.usage.completion_tokens,
            "total_tokens": response.usage.total_tokens,
        }),
    );
    if let Some(reason) = &response.finish_reason {
        result.insert_metadata("finish_reason", reason.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{DefineSource, RefCall, ReturnFormat, TaskArg};
    use crate::provider::MockProvider;
    use crate::workflow::MockWorkflow;

    fn engine(provider: &MockProvider, workflow: &MockWorkflow) -> TaskEngine {
        TaskEngine::new(Arc::new(provider.clone()), Arc::new(workflow.clone()))
    }

    fn answer(determinism: Determinism, format: ReturnFormat) -> SelectStmt {
        let mut task = TaskInvocation::new(TaskName::Answer);
        task.set_arg("question", TaskArg::Value(json!("What is RQL?")));
        let mut stmt = SelectStmt::new(task);
        stmt.determinism = determinism;
        stmt.return_format = format;
        stmt
    }

    fn states(result: &ExecResult) -> Vec<String> {
        result.metadata["states"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s.as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn provider_path_passes_text_through() {
        let provider = MockProvider::with_responses(["RQL is a query language [1]."]);
        let workflow = MockWorkflow::new();
        let result = engine(&provider, &workflow)
            .execute(&answer(Determinism::Provider, ReturnFormat::Text), &Session::default())
            .await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.output.as_deref(), Some("RQL is a query language [1]."));
        assert_eq!(result.confidence, Some(PROVIDER_CONFIDENCE));
        let contract = result.reasoning_contract.as_ref().unwrap();
        assert_eq!(contract.output_hash, None);
        assert_eq!(contract.evidence_hash, None);
        assert_eq!(
            states(&result),
            ["spec_loaded", "params_validated", "evidence_resolved", "provider_path", "completed"]
        );
        assert_eq!(result.metadata["spec_id"], json!("rql.task.answer.v1"));

        let request = provider.last_request().unwrap();
        assert!(!request.decode.json_mode);
        assert_eq!(request.messages.len(), 2);
    }

    #[tokio::test]
    async fn strong_answer_uses_default_schema() {
        let provider = MockProvider::with_responses([r#"{"answer": "A DSL"}"#]);
        let result = engine(&provider, &MockWorkflow::new())
            .execute(&answer(Determinism::Strong, ReturnFormat::Json), &Session::default())
            .await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.output.as_deref(), Some(r#"{"answer":"A DSL"}"#));
        assert_eq!(result.confidence, Some(STRONG_CONFIDENCE));
        assert_eq!(result.metadata["schema_source"], json!("answer_default"));
        assert_eq!(result.metadata["execution_mode"], json!("single_pass"));
        assert_eq!(result.metadata["schema_valid"], json!(true));
        assert_eq!(
            result.reasoning_contract.unwrap().output_hash,
            Some(sha256_hex(r#"{"answer":"A DSL"}"#))
        );

        let request = provider.last_request().unwrap();
        assert!(request.decode.json_mode);
        assert_eq!(request.decode.json_schema, Some(schema::answer_default_schema()));
    }

    #[tokio::test]
    async fn strong_text_fails_before_model_call() {
        let provider = MockProvider::new();
        let result = engine(&provider, &MockWorkflow::new())
            .execute(&answer(Determinism::Strong, ReturnFormat::Text), &Session::default())
            .await;

        assert!(!result.success);
        assert!(result.error.as_ref().unwrap().contains("requires RETURN JSON for task ANSWER"));
        assert_eq!(provider.call_count(), 0);
        assert_eq!(states(&result).last().map(String::as_str), Some("failed"));
    }

    #[tokio::test]
    async fn extract_is_exempt_from_json_gate_but_needs_schema() {
        let provider = MockProvider::with_responses([r#"{"name":"Alice"}"#]);
        let mut stmt = SelectStmt::new(TaskInvocation::new(TaskName::Extract));
        stmt.determinism = Determinism::Strong;

        let result = engine(&provider, &MockWorkflow::new())
            .execute(&stmt, &Session::default())
            .await;
        assert!(result.error.unwrap().starts_with("RQL-031"));

        stmt.task.set_arg(
            "schema",
            TaskArg::Value(json!({"type": "object", "properties": {"name": {"type": "string"}}})),
        );
        let result = engine(&provider, &MockWorkflow::new())
            .execute(&stmt, &Session::default())
            .await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.metadata["schema_source"], json!("task_args"));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn truncation_is_fatal_on_provider_path() {
        let provider = MockProvider::new();
        provider.queue_finish("partial", "MAX_TOKENS");
        let result = engine(&provider, &MockWorkflow::new())
            .execute(&answer(Determinism::Provider, ReturnFormat::Text), &Session::default())
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Increase max_output_tokens"));
        assert!(result.output.is_none());
    }

    #[tokio::test]
    async fn truncation_is_fatal_on_strong_path() {
        let provider = MockProvider::new();
        provider.queue_finish(r#"{"answer": "cut"#, "MAX_TOKENS");
        let result = engine(&provider, &MockWorkflow::new())
            .execute(&answer(Determinism::Strong, ReturnFormat::Json), &Session::default())
            .await;

        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().starts_with("RQL-041"));
        assert!(result.output.is_none());
        assert!(result.reasoning_contract.is_none());
        assert_eq!(provider.call_count(), 1);
        assert_eq!(
            states(&result),
            ["spec_loaded", "params_validated", "evidence_resolved", "strong_path", "failed"]
        );
    }

    #[tokio::test]
    async fn only_first_ref_is_resolved() {
        let provider = MockProvider::with_responses(["ok"]);
        let workflow = MockWorkflow::new().with_fallback(json!({"evidence": [{"id": "x", "text": "t"}]}));
        let mut session = Session::default();
        session.registry.register_source(DefineSource {
            name: "kb".into(),
            source_type: "WORKFLOW".into(),
            config: json!({"webhook": "https://kb.test"}).as_object().cloned().unwrap(),
            alias: None,
        });

        let mut stmt = answer(Determinism::Provider, ReturnFormat::Text);
        for (arg, q) in [("context", "one"), ("more", "two")] {
            stmt.task.set_arg(
                arg,
                TaskArg::Ref(RefCall {
                    source: "kb".into(),
                    args: json!({"q": q}).as_object().cloned().unwrap(),
                }),
            );
        }

        let result = engine(&provider, &workflow).execute(&stmt, &session).await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(workflow.call_count(), 1);
        assert_eq!(workflow.calls()[0].args["q"], json!("one"));
        assert_eq!(result.metadata["ignored_refs"], json!(["more"]));
        assert_eq!(result.evidence.as_ref().map(Vec::len), Some(1));
        assert!(result.reasoning_contract.unwrap().evidence_hash.is_some());
    }
}
