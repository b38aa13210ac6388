//! Canonical JSON serialization
//!
//! Every hash the engine publishes (spec, evidence, output) is computed over the
//! same byte form: object keys sorted, no whitespace, standard JSON escaping.
//!
//! Keys are sorted while writing rather than relying on the map type, so the
//! output does not change if some dependency turns on `serde_json/preserve_order`.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Render a JSON value with sorted keys and compact separators
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

/// Hex-encoded SHA-256 of raw bytes
pub fn sha256_hex(bytes: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes.as_ref());
    hex::encode(hasher.finalize())
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_value(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::String(s) => write_string(s, out),
        // null, bool and numbers have a single compact form
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_string(s: &str, out: &mut String) {
    // serde_json string escaping is already canonical
    out.push_str(&Value::String(s.to_owned()).to_string());
}
