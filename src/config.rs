//! RQL Configuration Module
//!
//! Config is read from two TOML files and the environment.
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. Environment variables (`RQL_TRACE_DIR`)
//! 2. Local project config (`./rql.toml`), whole top-level tables replace global ones
//! 3. Global config (`~/.rql/config.toml`)
//! 4. Defaults

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RqlError};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const TRACE_DIR_ENV: &str = "RQL_TRACE_DIR";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RqlConfig {
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub workflow: WorkflowConfig,

    #[serde(default)]
    pub tracing: TracingConfig,

    /// Session default for result rendering (json, text)
    #[serde(default = "default_output_format")]
    pub output_format: String,

    #[serde(default)]
    pub verbose: bool,
}

impl Default for RqlConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            workflow: WorkflowConfig::default(),
            tracing: TracingConfig::default(),
            output_format: default_output_format(),
            verbose: false,
        }
    }
}

fn default_output_format() -> String {
    "json".to_string()
}

/// Model provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider backend (gemini, mock)
    pub provider: String,
    pub model: String,
    /// Session default; decoding still forces 0 on every task call
    pub temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Inline API key (takes precedence over `api_key_env`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub api_key_env: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: None,
            api_key: None,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
        }
    }
}

impl LlmConfig {
    /// Inline key, else the configured env var
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(&self.api_key_env).ok().filter(|k| !k.is_empty()))
    }
}

/// Workflow (webhook) client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkflowConfig {
    pub default_timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 30,
            max_retries: 3,
        }
    }
}

/// Run journal configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TracingConfig {
    /// Off unless configured; `rql init` writes a config with it on
    pub enabled: bool,
    pub trace_dir: String,
    pub include_costs: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            trace_dir: "~/.rql/runs".to_string(),
            include_costs: true,
        }
    }
}

impl TracingConfig {
    /// Trace directory with a leading `~` expanded
    pub fn trace_path(&self) -> PathBuf {
        expand_home(&self.trace_dir)
    }
}

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => return PathBuf::from(path),
    };
    match dirs::home_dir() {
        Some(home) if rest.is_empty() => home,
        Some(home) => home.join(rest),
        None => PathBuf::from(path),
    }
}

impl RqlConfig {
    /// `~/.rql/`
    pub fn config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".rql")
    }

    /// `~/.rql/config.toml`
    pub fn global_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// `./rql.toml`
    pub fn local_path() -> PathBuf {
        PathBuf::from("rql.toml")
    }

    /// Load global + local config files, then apply environment overrides
    pub fn load() -> Result<Self> {
        Ok(Self::load_from(&Self::global_path(), &Self::local_path())?.with_env())
    }

    /// Load and merge two config files (missing files are skipped)
    ///
    /// Returns error if a file exists but is malformed.
    pub fn load_from(global: &Path, local: &Path) -> Result<Self> {
        let mut merged = toml::Table::new();
        for path in [global, local] {
            if let Some(table) = read_table(path)? {
                merged.extend(table);
            }
        }

        toml::Value::Table(merged)
            .try_into()
            .map_err(|e: toml::de::Error| RqlError::Config {
                reason: format!("Invalid config values: {}", e),
            })
    }

    /// Merge with environment variables
    ///
    /// Environment variables take precedence over config file values.
    pub fn with_env(mut self) -> Self {
        if let Ok(dir) = std::env::var(TRACE_DIR_ENV) {
            if !dir.is_empty() {
                self.tracing.trace_dir = dir;
            }
        }
        self
    }

    /// Config written by `rql init`
    pub fn starter() -> Self {
        let mut config = Self::default();
        config.tracing.enabled = true;
        config
    }

    /// Save configuration to a file, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| RqlError::Config {
                reason: format!("Failed to create config directory: {}", e),
            })?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| RqlError::Config {
            reason: format!("Failed to serialize config: {}", e),
        })?;

        fs::write(path, content).map_err(|e| RqlError::Config {
            reason: format!("Failed to write config file: {}", e),
        })
    }

    /// Write the starter config and create the runs directory
    ///
    /// Returns `false` when a config already exists (left untouched).
    pub fn init_at(path: &Path) -> Result<bool> {
        if path.exists() {
            return Ok(false);
        }
        let config = Self::starter();
        config.save_to(path)?;
        fs::create_dir_all(config.tracing.trace_path())?;
        tracing::info!(path = %path.display(), "wrote default config");
        Ok(true)
    }
}

fn read_table(path: &Path) -> Result<Option<toml::Table>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path).map_err(|e| RqlError::Config {
        reason: format!("Failed to read {}: {}", path.display(), e),
    })?;

    let table = content.parse::<toml::Table>().map_err(|e| RqlError::Config {
        reason: format!("Failed to parse {}: {}", path.display(), e),
    })?;
    Ok(Some(table))
}
