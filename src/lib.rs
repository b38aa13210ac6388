//! RQL - a query language for reproducible, policy-governed LLM tasks
//!
//! Statements are parsed into a typed model, then executed in order by the
//! [`Planner`]. SELECT statements run one canonical task (ANSWER, SUMMARIZE,
//! EXTRACT) through the [`TaskEngine`] at provider or strong determinism,
//! with named policies gating input and output.
//!
//! ```text
//! text ─▶ parser ─▶ [Statement] ─▶ Planner ─┬─▶ Registry (DEFINE) / settings (SET)
//!                                           └─▶ policy(in) ─▶ TaskEngine ─▶ policy(out)
//!                                                              ├─▶ RefResolver ─▶ WorkflowClient
//!                                                              └─▶ ModelProvider
//! ```

pub mod ast;
pub mod config;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod parser;
pub mod planner;
pub mod policy;
pub mod provider;
pub mod runtime;
pub mod spec;
pub mod util;
pub mod workflow;

pub use ast::{SelectStmt, Statement, TaskInvocation, TaskName};
pub use config::RqlConfig;
pub use engine::{ExecResult, ReasoningContract, TaskEngine};
pub use error::{FixSuggestion, Result, RqlError};
pub use parser::{parse, parse_file};
pub use planner::{Planner, RunReport, TraceRecord, Tracer};
pub use policy::PolicyEnforcer;
pub use provider::{MockProvider, ModelProvider};
pub use runtime::{Registry, Session};
pub use spec::{SpecRegistry, TaskSpec};
pub use workflow::{MockWorkflow, WorkflowClient};
