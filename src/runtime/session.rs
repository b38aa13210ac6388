//! Session - settings, INTO variables and the registry for one run
//!
//! Owned by the caller and passed by reference. The planner is the only
//! writer; the engine, resolver and policy enforcer only read it.

use std::collections::BTreeMap;

use serde_json::Value;
use uuid::Uuid;

use super::registry::Registry;
use crate::config::RqlConfig;

#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub config: RqlConfig,
    pub registry: Registry,
    settings: BTreeMap<String, Value>,
    variables: BTreeMap<String, Value>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(RqlConfig::default())
    }
}

impl Session {
    pub fn new(config: RqlConfig) -> Self {
        let settings = seed_settings(&config);
        Self {
            session_id: Uuid::new_v4().to_string(),
            config,
            registry: Registry::new(),
            settings,
            variables: BTreeMap::new(),
        }
    }

    // ═══════════════════════════════════════════
    // SETTINGS (SET statements)
    // ═══════════════════════════════════════════

    pub fn set_setting(&mut self, key: impl Into<String>, value: Value) {
        self.settings.insert(key.into(), value);
    }

    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    pub fn settings(&self) -> &BTreeMap<String, Value> {
        &self.settings
    }

    pub fn model(&self) -> String {
        self.setting("model")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| self.config.llm.model.clone())
    }

    /// Session token budget (`SET max_tokens = ...`), if any
    pub fn max_tokens(&self) -> Option<u32> {
        self.setting("max_tokens")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .or(self.config.llm.max_tokens)
    }

    pub fn output_format(&self) -> String {
        self.setting("output_format")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| self.config.output_format.clone())
    }

    pub fn is_verbose(&self) -> bool {
        self.setting("verbose")
            .and_then(Value::as_bool)
            .unwrap_or(self.config.verbose)
    }

    // ═══════════════════════════════════════════
    // VARIABLES (INTO bindings)
    // ═══════════════════════════════════════════

    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn variables(&self) -> &BTreeMap<String, Value> {
        &self.variables
    }

    pub fn clear_variables(&mut self) {
        self.variables.clear();
    }

    /// Back to the initial state: empty registry and variables, settings from config
    pub fn reset(&mut self) {
        self.clear_variables();
        self.registry.clear();
        self.settings = seed_settings(&self.config);
    }
}

fn seed_settings(config: &RqlConfig) -> BTreeMap<String, Value> {
    BTreeMap::from([
        ("model".to_string(), Value::from(config.llm.model.clone())),
        ("temperature".to_string(), Value::from(config.llm.temperature)),
        (
            "max_tokens".to_string(),
            config.llm.max_tokens.map(Value::from).unwrap_or(Value::Null),
        ),
        (
            "output_format".to_string(),
            Value::from(config.output_format.clone()),
        ),
        ("verbose".to_string(), Value::from(config.verbose)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::DefineSource;
    use serde_json::{json, Map};

    #[test]
    fn settings_seeded_from_config() {
        let session = Session::default();
        assert_eq!(session.model(), "gemini-2.5-flash");
        assert_eq!(session.setting("verbose"), Some(&json!(false)));
        assert_eq!(session.setting("max_tokens"), Some(&Value::Null));
        assert_eq!(session.max_tokens(), None);
        assert_eq!(session.output_format(), "json");
    }

    #[test]
    fn set_overrides_and_adds() {
        let mut session = Session::default();
        session.set_setting("model", json!("gemini-2.5-pro"));
        session.set_setting("max_tokens", json!(512));
        session.set_setting("custom.flag", json!(true));
        assert_eq!(session.model(), "gemini-2.5-pro");
        assert_eq!(session.max_tokens(), Some(512));
        assert_eq!(session.setting("custom.flag"), Some(&json!(true)));
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut session = Session::default();
        session.set_setting("model", json!("other"));
        session.set_variable("answer", json!("42"));
        session.registry.register_source(DefineSource {
            name: "kb".into(),
            source_type: "WORKFLOW".into(),
            config: Map::new(),
            alias: None,
        });

        session.reset();
        assert_eq!(session.model(), "gemini-2.5-flash");
        assert!(!session.has_variable("answer"));
        assert_eq!(session.registry.source_count(), 0);
    }

    #[test]
    fn clear_variables_keeps_settings_and_registry() {
        let mut session = Session::default();
        session.set_setting("model", json!("other"));
        session.set_variable("a", json!(1));
        session.set_variable("b", json!("two"));
        session.registry.register_source(DefineSource {
            name: "kb".into(),
            source_type: "WORKFLOW".into(),
            config: Map::new(),
            alias: None,
        });

        session.clear_variables();
        assert!(session.variables().is_empty());
        assert_eq!(session.model(), "other");
        assert!(session.registry.has_source("kb"));
    }

    #[test]
    fn sessions_get_distinct_ids() {
        assert_ne!(Session::default().session_id, Session::default().session_id);
    }
}
