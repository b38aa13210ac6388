//! AST Module - typed statement model
//!
//! Contains the Rust types produced by the parser:
//! - `statement`: Statement, SetStmt, DefineSource, DefinePolicy, DescribeStmt, SelectStmt
//! - `task`: TaskInvocation, TaskName, TaskArg, RefCall
//!
//! These types represent the "what" - static structure parsed from statement text.
//! For execution, see the `planner` and `engine` modules.

mod statement;
mod task;

// Re-export all public types
pub use statement::{
    DefinePolicy, DefineSource, DescribeStmt, DescribeTarget, Determinism, PolicyRef,
    ReturnFormat, SelectItem, SelectStmt, SetStmt, Statement,
};
pub use task::{RefCall, TaskArg, TaskInvocation, TaskName};
