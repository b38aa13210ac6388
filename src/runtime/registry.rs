//! Registry - named sources and policies
//!
//! Written only by DEFINE statements; re-registering a name overwrites it.
//! Ordered maps keep DESCRIBE listings stable.

use std::collections::BTreeMap;

use crate::ast::{DefinePolicy, DefineSource};

#[derive(Debug, Clone, Default)]
pub struct Registry {
    sources: BTreeMap<String, DefineSource>,
    policies: BTreeMap<String, DefinePolicy>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_source(&mut self, source: DefineSource) {
        self.sources.insert(source.name.clone(), source);
    }

    pub fn register_policy(&mut self, policy: DefinePolicy) {
        self.policies.insert(policy.name.clone(), policy);
    }

    pub fn get_source(&self, name: &str) -> Option<&DefineSource> {
        self.sources.get(name)
    }

    pub fn get_policy(&self, name: &str) -> Option<&DefinePolicy> {
        self.policies.get(name)
    }

    pub fn has_source(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    pub fn has_policy(&self, name: &str) -> bool {
        self.policies.contains_key(name)
    }

    /// Sources ordered by name
    pub fn list_sources(&self) -> impl Iterator<Item = &DefineSource> {
        self.sources.values()
    }

    /// Policies ordered by name
    pub fn list_policies(&self) -> impl Iterator<Item = &DefinePolicy> {
        self.policies.values()
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn policy_count(&self) -> usize {
        self.policies.len()
    }

    pub fn clear(&mut self) {
        self.sources.clear();
        self.policies.clear();
    }

    /// `DESCRIBE SOURCES` listing
    pub fn describe_sources(&self) -> String {
        if self.sources.is_empty() {
            return "No sources registered".to_string();
        }
        let mut lines = vec!["Registered Sources:".to_string()];
        for source in self.list_sources() {
            let mut line = format!("  - {}: {}", source.name, source.source_type);
            if let Some(alias) = &source.alias {
                line.push_str(&format!(" (alias: \"{}\")", alias));
            }
            lines.push(line);
        }
        lines.join("\n")
    }

    /// `DESCRIBE POLICIES` listing
    pub fn describe_policies(&self) -> String {
        if self.policies.is_empty() {
            return "No policies registered".to_string();
        }
        let mut lines = vec!["Registered Policies:".to_string()];
        lines.extend(self.list_policies().map(|policy| format!("  - {}", policy.name)));
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Map};

    fn source(name: &str, alias: Option<&str>) -> DefineSource {
        DefineSource {
            name: name.into(),
            source_type: "WORKFLOW".into(),
            config: Map::new(),
            alias: alias.map(String::from),
        }
    }

    #[test]
    fn re_registering_overwrites() {
        let mut registry = Registry::new();
        registry.register_source(source("kb", None));
        registry.register_source(source("kb", Some("docs")));
        assert_eq!(registry.source_count(), 1);
        assert_eq!(
            registry.get_source("kb").unwrap().alias.as_deref(),
            Some("docs")
        );
    }

    #[test]
    fn describe_lists_sorted_with_alias() {
        let mut registry = Registry::new();
        registry.register_source(source("zeta", None));
        registry.register_source(source("alpha", Some("a")));
        assert_eq!(
            registry.describe_sources(),
            "Registered Sources:\n  - alpha: WORKFLOW (alias: \"a\")\n  - zeta: WORKFLOW"
        );
    }

    #[test]
    fn describe_empty_registry() {
        let registry = Registry::new();
        assert_eq!(registry.describe_sources(), "No sources registered");
        assert_eq!(registry.describe_policies(), "No policies registered");
    }

    #[test]
    fn clear_removes_everything() {
        let mut registry = Registry::new();
        registry.register_source(source("kb", None));
        registry.register_policy(DefinePolicy {
            name: "strict".into(),
            config: json!({"input": {"forbid_pii": true}})
                .as_object()
                .cloned()
                .unwrap(),
        });
        assert!(registry.has_policy("strict"));
        assert_eq!(registry.describe_policies(), "Registered Policies:\n  - strict");

        registry.clear();
        assert_eq!(registry.source_count() + registry.policy_count(), 0);
        assert!(!registry.has_source("kb"));
    }
}
