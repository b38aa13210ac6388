//! Task Spec Registry - per-task rules, decode defaults and render contract
//!
//! Built-in specs for `answer`, `summarize` and `extract` at 1.0.0 are
//! compiled in. A registry may also point at a directory laid out as
//! `<dir>/<name>/<version>.yaml`; files there take precedence.
//!
//! `spec_hash` is the SHA-256 of the canonical JSON of every other field,
//! recomputed on load and never taken from the file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, RqlError};
use crate::util::{canonical_json, sha256_hex};

/// Version every canonical task currently runs at
pub const CURRENT_VERSION: &str = "1.0.0";

const BUILTIN_SPECS: &[(&str, &str)] = &[
    ("answer", include_str!("../../specs/answer/1.0.0.yaml")),
    ("summarize", include_str!("../../specs/summarize/1.0.0.yaml")),
    ("extract", include_str!("../../specs/extract/1.0.0.yaml")),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderContract {
    pub output_mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_schema: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    pub version: String,
    pub spec_id: String,
    pub description: String,
    pub system_rules: Vec<String>,
    #[serde(default)]
    pub decode_defaults: Map<String, Value>,
    pub render: RenderContract,
    #[serde(default)]
    pub spec_hash: String,
}

impl TaskSpec {
    /// Parse a YAML spec and stamp its content hash
    pub fn from_yaml(name: &str, yaml: &str) -> Result<Self> {
        let mut data: Value = serde_yaml::from_str(yaml).map_err(|e| RqlError::SpecInvalid {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        let fields = data.as_object_mut().ok_or_else(|| RqlError::SpecInvalid {
            name: name.to_string(),
            reason: "spec must be a mapping".to_string(),
        })?;

        fields.remove("spec_hash");
        let hash = sha256_hex(canonical_json(&data));

        let mut spec: TaskSpec =
            serde_json::from_value(data).map_err(|e| RqlError::SpecInvalid {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        spec.spec_hash = hash;
        spec.check_render_schema()?;
        Ok(spec)
    }

    /// The default render schema must itself be a well-formed JSON Schema
    fn check_render_schema(&self) -> Result<()> {
        if let Some(schema) = &self.render.json_schema {
            jsonschema::validator_for(schema).map_err(|e| RqlError::SpecInvalid {
                name: self.name.clone(),
                reason: format!("render.json_schema is not a valid JSON Schema: {}", e),
            })?;
        }
        Ok(())
    }

}

fn spec_key(name: &str, version: &str) -> String {
    format!("{}@{}", name.to_lowercase(), version)
}

/// Loads and caches task specs for the lifetime of the registry
#[derive(Debug, Default)]
pub struct SpecRegistry {
    spec_dir: Option<PathBuf>,
    cache: DashMap<String, Arc<TaskSpec>>,
}

impl SpecRegistry {
    /// Built-in specs only
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefer specs under `dir` over the built-in ones
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            spec_dir: Some(dir.into()),
            cache: DashMap::new(),
        }
    }

    /// Load (or fetch from cache) the spec for a task name and version
    pub fn load(&self, name: &str, version: &str) -> Result<Arc<TaskSpec>> {
        let key = spec_key(name, version);
        if let Some(spec) = self.cache.get(&key) {
            return Ok(Arc::clone(spec.value()));
        }

        let lower = name.to_lowercase();
        let yaml = match self.read_from_dir(&lower, version)? {
            Some(yaml) => yaml,
            None => builtin(&lower, version)
                .ok_or_else(|| RqlError::SpecNotFound {
                    name: lower.clone(),
                    version: version.to_string(),
                })?
                .to_string(),
        };

        let spec = Arc::new(TaskSpec::from_yaml(&lower, &yaml)?);
        tracing::debug!(spec = %key, hash = %spec.spec_hash, "task spec loaded");
        self.cache.insert(key, Arc::clone(&spec));
        Ok(spec)
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    fn read_from_dir(&self, name: &str, version: &str) -> Result<Option<String>> {
        let Some(dir) = &self.spec_dir else {
            return Ok(None);
        };
        let path = spec_path(dir, name, version);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(path)?))
    }
}

fn spec_path(dir: &Path, name: &str, version: &str) -> PathBuf {
    dir.join(name).join(format!("{}.yaml", version))
}

fn builtin(name: &str, version: &str) -> Option<&'static str> {
    if version != CURRENT_VERSION {
        return None;
    }
    BUILTIN_SPECS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, yaml)| *yaml)
}
