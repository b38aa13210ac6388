//! Evidence canonicalization
//!
//! Raw workflow records become `{id, uri, title, text, score, meta}` with
//! absent/null fields dropped, text cut at a fixed character budget, and a
//! total order of (score desc, missing = 0; id asc). The hash is taken over
//! the canonical JSON of that ordered list.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::util::{canonical_json, sha256_hex};

/// Character budget for evidence text (characters, not tokens)
pub const MAX_TEXT_CHARS: usize = 2000;
const ELLIPSIS: &str = "...";

/// Canonical evidence record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// Always a string: a non-string id is rendered as its JSON text (`7` -> `"7"`),
    /// so ids compare as strings in the canonical order
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Kept as the JSON number given (`7` stays `7`); numeric strings are parsed
    pub score: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl EvidenceItem {
    /// Score used for ordering (missing counts as 0)
    pub fn sort_score(&self) -> f64 {
        self.score.as_ref().and_then(Number::as_f64).unwrap_or(0.0)
    }

    fn from_record(index: usize, record: Value) -> Self {
        let mut fields = match record {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            Value::String(text) => Map::from_iter([("text".to_string(), Value::String(text))]),
            other => Map::from_iter([("text".to_string(), Value::String(other.to_string()))]),
        };
        let mut take = |key: &str| fields.remove(key).filter(|v| !v.is_null());

        let id = match take("id") {
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => format!("evidence_{}", index),
        };
        let text = take("text").map(|v| match v {
            Value::String(s) => truncate_text(&s),
            other => truncate_text(&other.to_string()),
        });
        let score = take("score").and_then(|v| match v {
            Value::Number(n) => Some(n),
            Value::String(s) => s.trim().parse::<Number>().ok(),
            _ => None,
        });

        Self {
            id,
            uri: take("uri"),
            title: take("title"),
            text,
            score,
            meta: take("meta"),
        }
    }
}

/// Truncate by character count, appending an ellipsis when cut
pub fn truncate_text(text: &str) -> String {
    match text.char_indices().nth(MAX_TEXT_CHARS) {
        Some((cut, _)) => format!("{}{}", &text[..cut], ELLIPSIS),
        None => text.to_string(),
    }
}

/// Score descending, then id ascending
fn canonical_order(a: &EvidenceItem, b: &EvidenceItem) -> Ordering {
    b.sort_score()
        .total_cmp(&a.sort_score())
        .then_with(|| a.id.cmp(&b.id))
}

/// Canonicalize raw records (ids default to `evidence_<index>` by input position)
pub fn canonicalize(raw: Vec<Value>) -> Vec<EvidenceItem> {
    let mut items: Vec<EvidenceItem> = raw
        .into_iter()
        .enumerate()
        .map(|(i, record)| EvidenceItem::from_record(i, record))
        .collect();
    items.sort_by(canonical_order);
    items
}

/// Evidence list as JSON (the form hashed and shown in prompts)
pub fn evidence_json(items: &[EvidenceItem]) -> Value {
    serde_json::to_value(items).unwrap_or(Value::Array(vec![]))
}

/// SHA-256 over the canonical JSON of an evidence list
pub fn evidence_hash(items: &[EvidenceItem]) -> String {
    sha256_hex(canonical_json(&evidence_json(items)))
}
