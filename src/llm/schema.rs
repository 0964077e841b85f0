//! Normalization of the JSON-Schema subset used to constrain model output.
//!
//! The subset: `type` in {object, array, string, number, boolean, null},
//! optional `properties`, `required`, `items` (schema or list of schemas),
//! `description`. Normalization is pure and idempotent.

use serde_json::{Map, Value, json};

/// Traversal depth guard against maliciously nested schemas.
pub const MAX_SCHEMA_DEPTH: usize = 32;

/// A schema prepared for the model plus the instruction needed to undo the
/// array wrapping after extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSchema {
    pub schema: Value,
    /// Set when a top-level array schema was wrapped as
    /// `{items: [...]}` and the result must be unwrapped.
    pub unwrap_items: bool,
}

/// Normalize a user schema:
/// - top-level arrays are wrapped into an object with a single required
///   `items` property (unwrapped after extraction),
/// - bare property maps (no `type`) are promoted to object schemas with all
///   keys required,
/// - `default` values are stripped recursively,
/// - `additionalProperties: false` is pinned on promoted/wrapped objects.
#[must_use]
pub fn normalize(schema: &Value) -> NormalizedSchema {
    let cleaned = strip_defaults(schema, 0);

    let schema_type = cleaned.get("type").and_then(Value::as_str);

    match schema_type {
        Some("array") => NormalizedSchema {
            schema: json!({
                "type": "object",
                "properties": { "items": cleaned },
                "required": ["items"],
                "additionalProperties": false,
            }),
            unwrap_items: true,
        },
        Some(_) => NormalizedSchema { schema: cleaned, unwrap_items: false },
        None => {
            // No `type`. Either an object schema missing its tag, or a bare
            // property map where every value is itself a schema.
            let obj = match cleaned.as_object() {
                Some(obj) => obj,
                None => return NormalizedSchema { schema: cleaned, unwrap_items: false },
            };

            if obj.contains_key("properties") {
                let mut promoted = obj.clone();
                promoted.insert("type".into(), json!("object"));
                promoted
                    .entry("additionalProperties")
                    .or_insert(json!(false));
                return NormalizedSchema { schema: Value::Object(promoted), unwrap_items: false };
            }

            let required: Vec<Value> =
                obj.keys().map(|k| Value::String(k.clone())).collect();
            NormalizedSchema {
                schema: json!({
                    "type": "object",
                    "properties": cleaned,
                    "required": required,
                    "additionalProperties": false,
                }),
                unwrap_items: false,
            }
        }
    }
}

/// Undo the top-level array wrapping applied by [`normalize`].
#[must_use]
pub fn unwrap_items(data: Value) -> Value {
    match data {
        Value::Object(mut obj) => obj.remove("items").unwrap_or(Value::Array(Vec::new())),
        other => other,
    }
}

fn strip_defaults(value: &Value, depth: usize) -> Value {
    if depth >= MAX_SCHEMA_DEPTH {
        return value.clone();
    }

    match value {
        Value::Object(obj) => {
            let mut out = Map::with_capacity(obj.len());
            for (key, val) in obj {
                if key == "default" {
                    continue;
                }
                out.insert(key.clone(), strip_defaults(val, depth + 1));
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| strip_defaults(v, depth + 1)).collect())
        }
        other => other.clone(),
    }
}

/// Drop object keys outside `schema.properties`, recursively, so the agent
/// honors `additionalProperties: false` even when the model does not.
#[must_use]
pub fn prune_to_schema(data: Value, schema: &Value, depth: usize) -> Value {
    if depth >= MAX_SCHEMA_DEPTH {
        return data;
    }

    match (data, schema.get("type").and_then(Value::as_str)) {
        (Value::Object(obj), Some("object")) => {
            let props = schema.get("properties").and_then(Value::as_object);
            let mut out = Map::new();
            for (key, val) in obj {
                if let Some(props) = props {
                    if let Some(field_schema) = props.get(&key) {
                        out.insert(key, prune_to_schema(val, field_schema, depth + 1));
                    }
                } else {
                    out.insert(key, val);
                }
            }
            Value::Object(out)
        }
        (Value::Array(items), Some("array")) => {
            let item_schema = schema.get("items");
            Value::Array(
                items
                    .into_iter()
                    .map(|item| match item_schema {
                        Some(Value::Object(_)) => {
                            prune_to_schema(item, item_schema.unwrap_or(&Value::Null), depth + 1)
                        }
                        _ => item,
                    })
                    .collect(),
            )
        }
        (data, _) => data,
    }
}
