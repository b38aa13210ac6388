//! JSON schema handling for strong determinism
//!
//! The model provider only honors flat object schemas: a root
//! `{type: object, properties: {...}}` of string/number/integer/boolean
//! properties. Keywords it cannot honor are stripped first, then the shape
//! is checked and every violation is reported at once.

use serde_json::{json, Value};

use crate::error::{Result, RqlError};

/// Keywords removed before the schema is sent to the provider
pub const STRIPPED_KEYWORDS: [&str; 16] = [
    "additionalProperties",
    "$schema",
    "$id",
    "$ref",
    "definitions",
    "allOf",
    "anyOf",
    "oneOf",
    "not",
    "if",
    "then",
    "else",
    "const",
    "enum",
    "pattern",
    "format",
];

const SCALAR_TYPES: [&str; 4] = ["string", "number", "integer", "boolean"];

/// Where the schema used for a strong-path call came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaSource {
    TaskArgs,
    SpecDefault,
    AnswerDefault,
}

impl SchemaSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskArgs => "task_args",
            Self::SpecDefault => "spec_default",
            Self::AnswerDefault => "answer_default",
        }
    }
}

/// Minimal schema used by ANSWER when nothing else is given
pub fn answer_default_schema() -> Value {
    json!({
        "type": "object",
        "properties": {"answer": {"type": "string"}},
        "required": ["answer"]
    })
}

/// Recursively drop every keyword in [`STRIPPED_KEYWORDS`]
pub fn sanitize(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !STRIPPED_KEYWORDS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), sanitize(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(sanitize).collect()),
        other => other.clone(),
    }
}

/// Check provider compatibility, collecting every violation
pub fn validate_shape(schema: &Value) -> Result<()> {
    let mut violations = Vec::new();

    let root_ok = schema.get("type").and_then(Value::as_str) == Some("object")
        && schema.get("properties").is_some_and(Value::is_object);
    if !root_ok {
        violations.push(
            "Schema root must be a simple object with 'type': 'object' and 'properties'".to_string(),
        );
    }
    check_node(schema, "root", &mut violations);

    if violations.is_empty() {
        Ok(())
    } else {
        Err(RqlError::Schema { violations })
    }
}

fn check_node(node: &Value, path: &str, violations: &mut Vec<String>) {
    let Some(map) = node.as_object() else {
        return;
    };
    let node_type = map.get("type");

    match node_type.and_then(Value::as_str) {
        Some("array") => {
            violations.push(format!(
                "Arrays not supported at {} - use simple object properties instead",
                path
            ));
            return;
        }
        Some("object") if map.contains_key("properties") => {
            if path != "root" {
                violations.push(format!(
                    "Nested objects not supported at {} - flatten to root level properties",
                    path
                ));
            }
            if let Some(properties) = map.get("properties").and_then(Value::as_object) {
                for (name, child) in properties {
                    let child_path = if path == "root" {
                        name.clone()
                    } else {
                        format!("{}.{}", path, name)
                    };
                    check_node(child, &child_path, violations);
                }
            }
        }
        Some(t) if SCALAR_TYPES.contains(&t) => {}
        None if node_type.is_none() => {}
        _ => {
            let shown = node_type.map(type_label).unwrap_or_default();
            violations.push(format!(
                "Unsupported type '{}' at {} - use string, number, integer, or boolean",
                shown, path
            ));
        }
    }

    for keyword in STRIPPED_KEYWORDS.iter().copied().chain(["items"]) {
        if map.contains_key(keyword) {
            violations.push(format!("Unsupported keyword '{}' at {}", keyword, path));
        }
    }
}

fn type_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The schema must also compile as a JSON Schema
pub fn check_well_formed(schema: &Value) -> Result<()> {
    jsonschema::validator_for(schema)
        .map(|_| ())
        .map_err(|e| RqlError::Schema {
            violations: vec![format!("Invalid JSON Schema: {}", e)],
        })
}

/// Whether `instance` conforms to `schema` (audit only, never fatal)
pub fn conforms(schema: &Value, instance: &Value) -> bool {
    jsonschema::validator_for(schema)
        .map(|validator| validator.is_valid(instance))
        .unwrap_or(false)
}

/// Interpret a `schema` task argument: an object, or a JSON string holding one
///
/// Null and empty objects count as absent.
pub fn schema_from_arg(arg: &Value) -> Result<Option<Value>> {
    let value = match arg {
        Value::Null => return Ok(None),
        Value::String(text) => serde_json::from_str::<Value>(text).map_err(|e| RqlError::Schema {
            violations: vec![format!("schema argument is not valid JSON: {}", e)],
        })?,
        other => other.clone(),
    };
    match value {
        Value::Object(map) if map.is_empty() => Ok(None),
        Value::Object(map) => Ok(Some(Value::Object(map))),
        other => Ok(Some(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn violations(schema: Value) -> Vec<String> {
        match validate_shape(&schema) {
            Err(RqlError::Schema { violations }) => violations,
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn flat_object_is_accepted() {
        let schema = json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "age": {"type": "integer"},
                "score": {"type": "number"},
                "ok": {"type": "boolean"},
                "any": {"description": "untyped"}
            },
            "required": ["name"]
        });
        assert!(validate_shape(&schema).is_ok());
        assert!(check_well_formed(&schema).is_ok());
    }

    #[test]
    fn top_level_array_is_rejected() {
        let found = violations(json!({"type": "array", "items": {"type": "string"}}));
        assert_eq!(
            found,
            vec![
                "Schema root must be a simple object with 'type': 'object' and 'properties'".to_string(),
                "Arrays not supported at root - use simple object properties instead".to_string(),
            ]
        );
    }

    #[test]
    fn nested_object_cites_property_path() {
        let found = violations(json!({
            "type": "object",
            "properties": {
                "person": {
                    "type": "object",
                    "properties": {"name": {"type": "string"}, "tags": {"type": "array"}}
                }
            }
        }));
        assert_eq!(
            found,
            vec![
                "Nested objects not supported at person - flatten to root level properties".to_string(),
                "Arrays not supported at person.tags - use simple object properties instead".to_string(),
            ]
        );
    }

    #[test]
    fn unsupported_types_and_items_are_reported() {
        let found = violations(json!({
            "type": "object",
            "properties": {"x": {"type": "null"}, "y": {"type": "string", "items": {}}}
        }));
        assert!(found.contains(&"Unsupported type 'null' at x - use string, number, integer, or boolean".to_string()));
        assert!(found.contains(&"Unsupported keyword 'items' at y".to_string()));
    }

    #[test]
    fn sanitize_strips_recursively() {
        let schema = json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "kind": {"type": "string", "enum": ["a", "b"], "format": "x"},
                "n": {"anyOf": [{"type": "integer"}]}
            }
        });
        let clean = sanitize(&schema);
        assert_eq!(
            clean,
            json!({
                "type": "object",
                "properties": {"kind": {"type": "string"}, "n": {}}
            })
        );
        assert!(validate_shape(&clean).is_ok());
    }

    #[test]
    fn schema_argument_forms() {
        assert_eq!(schema_from_arg(&Value::Null).unwrap(), None);
        assert_eq!(schema_from_arg(&json!({})).unwrap(), None);
        assert_eq!(
            schema_from_arg(&json!(r#"{"type":"object","properties":{}}"#)).unwrap(),
            Some(json!({"type": "object", "properties": {}}))
        );
        assert!(schema_from_arg(&json!("{not json")).is_err());
    }

    #[test]
    fn conformance_is_checked_against_schema() {
        let schema = answer_default_schema();
        assert!(conforms(&schema, &json!({"answer": "x"})));
        assert!(!conforms(&schema, &json!({"other": 1})));
    }
}
