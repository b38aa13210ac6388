//! Task invocation types
//!
//! A task is one of three canonical verbs. Arguments are named values or
//! `REF(source, {...})` calls; free-text prompts are not representable.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The canonical tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskName {
    Answer,
    Summarize,
    Extract,
}

impl TaskName {
    /// Parse a task keyword (case-insensitive)
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "ANSWER" => Some(Self::Answer),
            "SUMMARIZE" => Some(Self::Summarize),
            "EXTRACT" => Some(Self::Extract),
            _ => None,
        }
    }

    /// Upper-case name as written in statements and contracts
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Answer => "ANSWER",
            Self::Summarize => "SUMMARIZE",
            Self::Extract => "EXTRACT",
        }
    }

    /// Lower-case name used to key task specs
    pub fn spec_name(&self) -> &'static str {
        match self {
            Self::Answer => "answer",
            Self::Summarize => "summarize",
            Self::Extract => "extract",
        }
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `REF(source, {args})` - defers to a WORKFLOW source for evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefCall {
    /// Name of a registered WORKFLOW source
    pub source: String,
    /// Arguments posted to the workflow
    #[serde(default)]
    pub args: Map<String, Value>,
}

/// A task argument value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskArg {
    Ref(RefCall),
    Value(Value),
}

impl TaskArg {
    pub fn as_ref_call(&self) -> Option<&RefCall> {
        match self {
            Self::Ref(call) => Some(call),
            Self::Value(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            Self::Ref(_) => None,
        }
    }
}

/// Invocation of a canonical task
///
/// Arguments keep source order: "first REF" means first as written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInvocation {
    pub name: TaskName,
    pub args: Vec<(String, TaskArg)>,
}

impl TaskInvocation {
    pub fn new(name: TaskName) -> Self {
        Self { name, args: vec![] }
    }

    /// Insert or replace an argument (replacement keeps the original position)
    pub fn set_arg(&mut self, key: impl Into<String>, value: TaskArg) {
        let key = key.into();
        match self.args.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.args.push((key, value)),
        }
    }

    pub fn arg(&self, key: &str) -> Option<&TaskArg> {
        self.args.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Plain value of an argument (None for REF arguments)
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.arg(key).and_then(TaskArg::as_value)
    }

    /// All REF arguments in source order
    pub fn ref_calls(&self) -> Vec<(&str, &RefCall)> {
        self.args
            .iter()
            .filter_map(|(k, v)| v.as_ref_call().map(|r| (k.as_str(), r)))
            .collect()
    }

    pub fn has_ref_calls(&self) -> bool {
        self.args.iter().any(|(_, v)| v.as_ref_call().is_some())
    }

    /// String-valued arguments (input policy scanning)
    pub fn string_args(&self) -> impl Iterator<Item = (&str, &str)> {
        self.args.iter().filter_map(|(k, v)| match v {
            TaskArg::Value(Value::String(s)) => Some((k.as_str(), s.as_str())),
            _ => None,
        })
    }

    /// Plain arguments as a JSON object, REF arguments replaced by a marker
    pub fn args_json(&self) -> Map<String, Value> {
        self.args
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    TaskArg::Value(value) => value.clone(),
                    TaskArg::Ref(call) => Value::String(format!("REF({})", call.source)),
                };
                (k.clone(), value)
            })
            .collect()
    }
}
