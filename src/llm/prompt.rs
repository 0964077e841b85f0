//! Prompt construction for schema-driven extraction.
//!
//! The field list is a nested, indented rendering of the normalized schema
//! with type hints and descriptions, bounded by the schema depth limit.

use serde_json::Value;

use super::schema::MAX_SCHEMA_DEPTH;

/// Render the field list for the system prompt.
#[must_use]
pub fn build_field_prompt(schema: &Value) -> String {
    let mut out = String::new();
    let props = schema.get("properties").and_then(Value::as_object);
    if let Some(props) = props {
        for (name, field) in props {
            render_field(&mut out, name, field, 0);
        }
    }
    out
}

fn render_field(out: &mut String, name: &str, field: &Value, depth: usize) {
    if depth >= MAX_SCHEMA_DEPTH {
        return;
    }

    let indent = "  ".repeat(depth);
    let hint = type_hint(field);
    out.push_str(&indent);
    out.push_str("- ");
    out.push_str(name);
    if !hint.is_empty() {
        out.push_str(" (");
        out.push_str(&hint);
        out.push(')');
    }
    if let Some(desc) = field.get("description").and_then(Value::as_str) {
        out.push_str(": ");
        out.push_str(desc);
    }
    out.push('\n');

    match field.get("type").and_then(Value::as_str) {
        Some("object") => {
            if let Some(props) = field.get("properties").and_then(Value::as_object) {
                for (child_name, child) in props {
                    render_field(out, child_name, child, depth + 1);
                }
            }
        }
        Some("array") => {
            if let Some(items) = field.get("items")
                && items.get("type").and_then(Value::as_str) == Some("object")
                && let Some(props) = items.get("properties").and_then(Value::as_object)
            {
                for (child_name, child) in props {
                    render_field(out, child_name, child, depth + 1);
                }
            }
        }
        _ => {}
    }
}

fn type_hint(field: &Value) -> String {
    match field.get("type").and_then(Value::as_str) {
        Some("array") => {
            let inner = field
                .get("items")
                .and_then(|i| i.get("type"))
                .and_then(Value::as_str)
                .unwrap_or("any");
            format!("array of {inner}")
        }
        Some("object") => "object".to_string(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// Full system prompt for an extraction call.
#[must_use]
pub fn build_system_prompt(
    schema: &Value,
    schema_name: Option<&str>,
    user_prompt: Option<&str>,
) -> String {
    let name = schema_name.unwrap_or("the requested structure");
    let fields = build_field_prompt(schema);
    let mut prompt = format!(
        "You are a data extraction engine. Extract {name} from the provided \
         page content.\n\nFields to extract:\n{fields}\n\
         Respond with a single JSON object matching the fields above. Use null \
         for fields that are not present in the content. Do not invent values \
         and do not add keys that are not listed."
    );
    if let Some(extra) = user_prompt {
        prompt.push_str("\n\nAdditional instructions: ");
        prompt.push_str(extra);
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_nested_fields_with_hints() {
        let schema = json!({
            "type": "object",
            "properties": {
                "company": {"type": "string", "description": "Legal name"},
                "services": {"type": "array", "items": {"type": "string"}},
                "address": {
                    "type": "object",
                    "properties": {
                        "city": {"type": "string"}
                    }
                }
            }
        });
        let prompt = build_field_prompt(&schema);
        assert!(prompt.contains("- company (string): Legal name"));
        assert!(prompt.contains("- services (array of string)"));
        assert!(prompt.contains("- address (object)"));
        assert!(prompt.contains("  - city (string)"));
    }

    #[test]
    fn array_of_objects_recurses_into_items() {
        let schema = json!({
            "type": "object",
            "properties": {
                "people": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {"name": {"type": "string"}}
                    }
                }
            }
        });
        let prompt = build_field_prompt(&schema);
        assert!(prompt.contains("- people (array of object)"));
        assert!(prompt.contains("  - name (string)"));
    }

    #[test]
    fn system_prompt_includes_user_instructions() {
        let schema = json!({"type": "object", "properties": {"a": {"type": "string"}}});
        let prompt = build_system_prompt(&schema, Some("Company profile"), Some("Prefer English"));
        assert!(prompt.contains("Company profile"));
        assert!(prompt.contains("Prefer English"));
    }
}
