//! Run Tracer - one record per executed statement, flushed as a JSONL journal
//!
//! Records are appended in execution order and never changed afterwards.
//! The journal is written once at the end of a run:
//! `<trace_dir>/rql_trace_<YYYYmmdd_HHMMSS>_<run_id[..8]>.jsonl`.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::ast::Statement;
use crate::engine::ExecResult;
use crate::error::Result;
use crate::runtime::Session;

/// Rough blended price per token used for cost estimates
const COST_PER_TOKEN_USD: f64 = 0.00001;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub trace_id: String,
    pub run_id: String,
    pub session_id: String,
    pub timestamp: String,
    pub statement_index: usize,
    pub statement_type: String,
    pub execution_time_ms: f64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub session_id: String,
    pub total_statements: usize,
    pub successful_statements: usize,
    pub failed_statements: usize,
    pub total_time_seconds: f64,
    pub total_execution_time_ms: f64,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostEstimate {
    pub llm_calls: usize,
    pub workflow_calls: usize,
    pub estimated_tokens: u64,
    pub estimated_cost_usd: f64,
}

pub struct Tracer {
    run_id: String,
    session_id: String,
    include_costs: bool,
    started_at: DateTime<Local>,
    started: Instant,
    records: Vec<TraceRecord>,
}

impl Tracer {
    pub fn new(session: &Session) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            session_id: session.session_id.clone(),
            include_costs: session.config.tracing.include_costs,
            started_at: Local::now(),
            started: Instant::now(),
            records: Vec::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn records(&self) -> &[TraceRecord] {
        &self.records
    }

    /// Append the record for one executed statement
    pub fn record(
        &mut self,
        stmt: &Statement,
        index: usize,
        result: &ExecResult,
        elapsed: Duration,
    ) -> &TraceRecord {
        self.records.push(TraceRecord {
            trace_id: Uuid::new_v4().to_string(),
            run_id: self.run_id.clone(),
            session_id: self.session_id.clone(),
            timestamp: Utc::now().to_rfc3339(),
            statement_index: index,
            statement_type: stmt.kind().to_string(),
            execution_time_ms: elapsed.as_secs_f64() * 1000.0,
            success: result.success,
            output: result.output.clone(),
            error: result.error.clone(),
            metadata: result.metadata.clone(),
        });
        &self.records[self.records.len() - 1]
    }

    /// Journal file name for this run inside `dir`
    pub fn journal_path(&self, dir: &Path) -> PathBuf {
        let stamp = self.started_at.format("%Y%m%d_%H%M%S");
        let short_id: String = self.run_id.chars().take(8).collect();
        dir.join(format!("rql_trace_{}_{}.jsonl", stamp, short_id))
    }

    /// Write every record as one JSON object per line
    pub fn write_journal(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = self.journal_path(dir);
        let mut writer = BufWriter::new(File::create(&path)?);
        for record in &self.records {
            let line = serde_json::to_string(record)?;
            writeln!(writer, "{}", line)?;
        }
        writer.flush()?;

        tracing::info!(path = %path.display(), records = self.records.len(), "trace journal written");
        Ok(path)
    }

    pub fn summary(&self) -> RunSummary {
        let successful = self.records.iter().filter(|r| r.success).count();
        RunSummary {
            run_id: self.run_id.clone(),
            session_id: self.session_id.clone(),
            total_statements: self.records.len(),
            successful_statements: successful,
            failed_statements: self.records.len() - successful,
            total_time_seconds: self.started.elapsed().as_secs_f64(),
            total_execution_time_ms: self.records.iter().map(|r| r.execution_time_ms).sum(),
            start_time: self.started_at.to_rfc3339(),
            end_time: Local::now().to_rfc3339(),
        }
    }

    /// Call counts and token totals from SELECT metadata (None unless `include_costs`)
    pub fn estimate_costs(&self) -> Option<CostEstimate> {
        if !self.include_costs {
            return None;
        }

        let selects = self
            .records
            .iter()
            .filter(|r| r.statement_type == "SELECT");

        let mut estimate = CostEstimate {
            llm_calls: 0,
            workflow_calls: 0,
            estimated_tokens: 0,
            estimated_cost_usd: 0.0,
        };
        for record in selects {
            if record.metadata.contains_key("model") {
                estimate.llm_calls += 1;
                estimate.estimated_tokens += record
                    .metadata
                    .get("usage")
                    .and_then(|u| u.get("total_tokens"))
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
            }
            if record.metadata.contains_key("ref_source") {
                estimate.workflow_calls += 1;
            }
        }

        let cost = estimate.estimated_tokens as f64 * COST_PER_TOKEN_USD;
        estimate.estimated_cost_usd = (cost * 1e6).round() / 1e6;
        Some(estimate)
    }
}
