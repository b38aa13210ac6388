//! Planner - sequential statement execution with stop-on-first-failure
//!
//! Statements run strictly in order. After each one a [`TraceRecord`] is
//! appended; the first failed result ends the run and is the last result
//! returned. Side effects of earlier statements (SET/DEFINE) are kept.
//!
//! The planner is the only writer of session state.

pub mod trace;

use std::path::PathBuf;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::ast::{DescribeStmt, DescribeTarget, SelectStmt, SetStmt, Statement};
use crate::engine::{ExecResult, TaskEngine};
use crate::error::RqlError;
use crate::policy::{join_messages, PolicyEnforcer};
use crate::runtime::Session;

pub use trace::{CostEstimate, RunSummary, TraceRecord, Tracer};

/// Results of one run together with its trace
pub struct RunReport {
    pub results: Vec<ExecResult>,
    pub tracer: Tracer,
    /// Journal path when tracing is enabled and the write succeeded
    pub journal: Option<PathBuf>,
}

impl RunReport {
    /// True when every statement ran and succeeded
    pub fn succeeded(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }

    pub fn first_failure(&self) -> Option<&ExecResult> {
        self.results.iter().find(|r| !r.success)
    }
}

pub struct Planner {
    engine: TaskEngine,
}

impl Planner {
    pub fn new(engine: TaskEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &TaskEngine {
        &self.engine
    }

    /// Execute statements in order, stopping at the first failure
    pub async fn run(&self, statements: &[Statement], session: &mut Session) -> Vec<ExecResult> {
        self.run_traced(statements, session).await.results
    }

    /// Like [`Planner::run`], also returning the trace and journal location
    pub async fn run_traced(&self, statements: &[Statement], session: &mut Session) -> RunReport {
        let mut tracer = Tracer::new(session);
        let mut results = Vec::with_capacity(statements.len());
        info!(run_id = %tracer.run_id(), statements = statements.len(), "run.start");

        for (index, stmt) in statements.iter().enumerate() {
            let started = Instant::now();
            let result = self.execute_statement(stmt, session).await;
            tracer.record(stmt, index, &result, started.elapsed());
            debug!(index, kind = stmt.kind(), success = result.success, "statement.done");

            let failed = !result.success;
            results.push(result);
            if failed {
                info!(index, "run.stopped at first failure");
                break;
            }
        }

        let journal = if session.config.tracing.enabled {
            let dir = session.config.tracing.trace_path();
            match tracer.write_journal(&dir) {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!(error = %e, dir = %dir.display(), "failed to write trace journal");
                    None
                }
            }
        } else {
            None
        };

        RunReport {
            results,
            tracer,
            journal,
        }
    }

    /// Dispatch one statement by kind
    pub async fn execute_statement(&self, stmt: &Statement, session: &mut Session) -> ExecResult {
        match stmt {
            Statement::Set(set) => execute_set(set, session),
            Statement::DefineSource(source) => {
                let output = format!(
                    "Defined source '{}' (type: {}){}",
                    source.name,
                    source.source_type,
                    source
                        .alias
                        .as_ref()
                        .map(|a| format!(" AS \"{}\"", a))
                        .unwrap_or_default()
                );
                session.registry.register_source(source.clone());
                verbose_result(session, output)
            }
            Statement::DefinePolicy(policy) => {
                let output = format!("Defined policy '{}'", policy.name);
                session.registry.register_policy(policy.clone());
                verbose_result(session, output)
            }
            Statement::Describe(describe) => execute_describe(describe, session),
            Statement::Select(select) => self.execute_select(select, session).await,
        }
    }

    /// Input policy, engine, output policy, INTO binding
    async fn execute_select(&self, stmt: &SelectStmt, session: &mut Session) -> ExecResult {
        let enforcer = match PolicyEnforcer::for_statement(stmt, session) {
            Ok(enforcer) => enforcer,
            Err(err) => return ExecResult::from_error(&err),
        };

        let input_violations = enforcer.validate_input(stmt);
        if !input_violations.is_empty() {
            warn!(violations = input_violations.len(), "policy.input.blocked");
            return ExecResult::from_error(&RqlError::InputBlocked {
                messages: join_messages(&input_violations),
            });
        }

        let mut result = self.engine.execute(stmt, session).await;

        if let (true, Some(output)) = (result.success, result.output.as_deref()) {
            let violations = enforcer.validate_output(output);
            if enforcer.should_block(&violations) {
                warn!(violations = violations.len(), "policy.output.blocked");
                return ExecResult::from_error(&RqlError::OutputBlocked {
                    messages: join_messages(&violations),
                });
            }
            if !violations.is_empty() {
                result.insert_metadata(
                    "policy_warnings",
                    violations.iter().map(|v| v.message.clone()).collect::<Vec<_>>(),
                );
            }
        }

        if let Some(var) = &stmt.into_var {
            if result.success && result.has_output() {
                let output = result.output.clone().unwrap_or_default();
                session.set_variable(var.clone(), Value::String(output.clone()));
                if session.is_verbose() {
                    result.output = Some(format!("Result stored in variable '{}': {}", var, output));
                }
            }
        }

        result
    }
}

fn execute_set(stmt: &SetStmt, session: &mut Session) -> ExecResult {
    session.set_setting(stmt.key.clone(), stmt.value.clone());
    let shown = match &stmt.value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    verbose_result(session, format!("Set {} = {}", stmt.key, shown))
}

fn execute_describe(stmt: &DescribeStmt, session: &Session) -> ExecResult {
    let listing = match stmt.target {
        DescribeTarget::Sources => session.registry.describe_sources(),
        DescribeTarget::Policies => session.registry.describe_policies(),
    };
    ExecResult::with_output(listing)
}

/// Confirmation text only in verbose mode
fn verbose_result(session: &Session, output: String) -> ExecResult {
    if session.is_verbose() {
        ExecResult::with_output(output)
    } else {
        ExecResult::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::provider::MockProvider;
    use crate::workflow::MockWorkflow;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn planner(provider: &MockProvider) -> Planner {
        Planner::new(TaskEngine::new(
            Arc::new(provider.clone()),
            Arc::new(MockWorkflow::new()),
        ))
    }

    #[tokio::test]
    async fn set_and_define_mutate_session() {
        let statements = parse(
            r#"SET model = "gemini-2.0-pro";
               DEFINE SOURCE kb TYPE WORKFLOW USING {webhook: "https://kb.test"} AS "Knowledge";
               DEFINE POLICY strict AS {input: {forbid_pii: true}};
               DESCRIBE SOURCES;"#,
        )
        .unwrap();
        let mut session = Session::default();
        let results = planner(&MockProvider::new()).run(&statements, &mut session).await;

        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.success));
        assert_eq!(results[0].output, None);
        assert_eq!(session.model(), "gemini-2.0-pro");
        assert!(session.registry.has_policy("strict"));
        assert_eq!(
            results[3].output.as_deref(),
            Some("Registered Sources:\n  - kb: WORKFLOW (alias: \"Knowledge\")")
        );
    }

    #[tokio::test]
    async fn verbose_confirmations() {
        let statements = parse(
            r#"SET verbose = true;
               DEFINE SOURCE kb TYPE WORKFLOW USING {webhook: "https://kb.test"} AS "KB";
               DEFINE POLICY p AS {};"#,
        )
        .unwrap();
        let mut session = Session::default();
        let results = planner(&MockProvider::new()).run(&statements, &mut session).await;

        assert_eq!(results[0].output.as_deref(), Some("Set verbose = true"));
        assert_eq!(
            results[1].output.as_deref(),
            Some("Defined source 'kb' (type: WORKFLOW) AS \"KB\"")
        );
        assert_eq!(results[2].output.as_deref(), Some("Defined policy 'p'"));
    }

    #[tokio::test]
    async fn stops_at_first_failure() {
        let statements = parse(
            r#"SET a = 1;
               SELECT OUTPUT FROM TASK ANSWER(question: "q") POLICY missing;
               SET b = 2;"#,
        )
        .unwrap();
        let mut session = Session::default();
        let report = planner(&MockProvider::new())
            .run_traced(&statements, &mut session)
            .await;

        assert_eq!(report.results.len(), 2);
        assert_eq!(report.tracer.records().len(), 2);
        assert!(report.results[1].error.as_deref().unwrap().starts_with("RQL-012"));
        assert_eq!(session.setting("a"), Some(&json!(1)));
        assert_eq!(session.setting("b"), None);
        assert!(report.journal.is_none());
    }

    #[tokio::test]
    async fn input_pii_blocks_before_model_call() {
        let statements = parse(
            r#"SELECT OUTPUT FROM TASK ANSWER(question: "mail me at jane@example.com")
               POLICY {input: {forbid_pii: true}};"#,
        )
        .unwrap();
        let provider = MockProvider::new();
        let results = planner(&provider).run(&statements, &mut Session::default()).await;

        let error = results[0].error.as_deref().unwrap();
        assert!(error.contains("Policy violations in input: PII detected in input: email"));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn blocked_output_is_discarded() {
        let statements = parse(
            r#"SELECT OUTPUT FROM TASK ANSWER(question: "q")
               POLICY {output: {require_citations: true}} INTO answer;"#,
        )
        .unwrap();
        let provider = MockProvider::with_responses(["No citations here."]);
        let mut session = Session::default();
        let results = planner(&provider).run(&statements, &mut session).await;

        assert!(!results[0].success);
        assert!(results[0].output.is_none());
        assert!(results[0]
            .error
            .as_deref()
            .unwrap()
            .contains("Output does not contain required citations"));
        assert!(!session.has_variable("answer"));
    }

    #[tokio::test]
    async fn into_binds_output() {
        let statements = parse(
            r#"SET verbose = true;
               SELECT OUTPUT FROM TASK ANSWER(question: "q") INTO answer;"#,
        )
        .unwrap();
        let provider = MockProvider::with_responses(["The answer is X [1]."]);
        let mut session = Session::default();
        let results = planner(&provider).run(&statements, &mut session).await;

        assert_eq!(session.variable("answer"), Some(&json!("The answer is X [1].")));
        assert_eq!(
            results[1].output.as_deref(),
            Some("Result stored in variable 'answer': The answer is X [1].")
        );
    }
}
