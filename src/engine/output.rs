//! Output canonicalization for the strong path
//!
//! Parse the raw model text as JSON; if that fails and the text is fenced
//! in triple backticks, drop exactly the first and last line and try once
//! more. Success re-serializes with sorted keys and compact separators.

use serde_json::Value;

use crate::error::{Result, RqlError};
use crate::util::canonical_json;

const FENCE: &str = "```";

/// Canonical JSON text for a model response
pub fn canonicalize_output(raw: &str) -> Result<String> {
    let text = raw.trim();
    match serde_json::from_str::<Value>(text) {
        Ok(value) => {
            tracing::debug!(method = "direct_parse", "json.canonicalize.success");
            Ok(canonical_json(&value))
        }
        Err(err) => {
            tracing::debug!(error = %err, "json.canonicalize.failed_direct");
            if let Some(inner) = strip_fence(text) {
                if let Ok(value) = serde_json::from_str::<Value>(&inner) {
                    tracing::debug!(method = "fence_removal", "json.canonicalize.success");
                    return Ok(canonical_json(&value));
                }
                tracing::debug!("json.canonicalize.cleanup_failed");
            }
            tracing::warn!(error = %err, "json.canonicalize.failed");
            Err(RqlError::Canonicalization {
                details: err.to_string(),
            })
        }
    }
}

/// Inner lines of a ```-fenced block with at least one body line
fn strip_fence(text: &str) -> Option<String> {
    if !(text.starts_with(FENCE) && text.ends_with(FENCE)) {
        return None;
    }
    let lines: Vec<&str> = text.split('\n').collect();
    if lines.len() <= 2 {
        return None;
    }
    Some(lines[1..lines.len() - 1].join("\n"))
}
