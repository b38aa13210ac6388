//! Decode parameter assembly
//!
//! Spec defaults, then `decode.*` WITH overrides, then the determinism floor
//! (`temperature=0, top_p=0, top_k=1, candidate_count=1`) which no override
//! can lift.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::provider::{DecodeConfig, DEFAULT_MAX_OUTPUT_TOKENS};
use crate::spec::TaskSpec;

const DECODE_PREFIX: &str = "decode.";
const FLOOR_KEYS: [&str; 4] = ["temperature", "top_p", "top_k", "candidate_count"];

/// Resolved decode parameters for one model call
///
/// Output budget precedence: `decode.max_output_tokens` (or
/// `decode.max_tokens`) from WITH, the session budget, the spec default.
pub fn build_decode_config(
    spec: &TaskSpec,
    with_params: &BTreeMap<String, Value>,
    session_max_tokens: Option<u32>,
) -> DecodeConfig {
    let overrides: Map<String, Value> = with_params
        .iter()
        .filter_map(|(k, v)| k.strip_prefix(DECODE_PREFIX).map(|name| (name.to_string(), v.clone())))
        .collect();

    for key in FLOOR_KEYS {
        if let Some(value) = overrides.get(key) {
            tracing::debug!(key, %value, "decode override ignored, determinism floor applies");
        }
    }

    let budget = |map: &Map<String, Value>| {
        ["max_output_tokens", "max_tokens"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_u64))
            .and_then(|n| u32::try_from(n).ok())
    };

    let max_output_tokens = budget(&overrides)
        .or(session_max_tokens)
        .or_else(|| budget(&spec.decode_defaults))
        .unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS);

    DecodeConfig {
        temperature: 0.0,
        top_p: 0.0,
        top_k: 1,
        candidate_count: 1,
        max_output_tokens,
        json_mode: false,
        json_schema: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{SpecRegistry, CURRENT_VERSION};
    use serde_json::json;

    fn params(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn floor_survives_any_override() {
        let spec = SpecRegistry::new().load("answer", CURRENT_VERSION).unwrap();
        let with = params(&[
            ("decode.temperature", json!(1.5)),
            ("decode.top_p", json!(0.9)),
            ("decode.top_k", json!(40)),
            ("decode.candidate_count", json!(4)),
        ]);
        let config = build_decode_config(&spec, &with, None);
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.top_p, 0.0);
        assert_eq!(config.top_k, 1);
        assert_eq!(config.candidate_count, 1);
    }

    #[test]
    fn output_budget_precedence() {
        let spec = SpecRegistry::new().load("summarize", CURRENT_VERSION).unwrap();
        assert_eq!(build_decode_config(&spec, &BTreeMap::new(), None).max_output_tokens, 1024);
        assert_eq!(build_decode_config(&spec, &BTreeMap::new(), Some(512)).max_output_tokens, 512);

        let with = params(&[("decode.max_tokens", json!(4096))]);
        assert_eq!(build_decode_config(&spec, &with, Some(512)).max_output_tokens, 4096);
    }

    #[test]
    fn non_decode_params_are_ignored() {
        let spec = SpecRegistry::new().load("answer", CURRENT_VERSION).unwrap();
        let with = params(&[("max_output_tokens", json!(7)), ("style", json!("terse"))]);
        let config = build_decode_config(&spec, &with, None);
        assert_eq!(config.max_output_tokens, DEFAULT_MAX_OUTPUT_TOKENS);
        assert!(!config.json_mode);
    }
}
