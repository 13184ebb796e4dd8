//! The `Tool` contract and the registry that validates arguments
//! against schemas and routes execution.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::secrets::SecretsRegistry;

/// A minimal, read-only view handed to a tool executor at call time
/// (not at construction) so tools don't need a cyclic reference back
/// into the conversation that owns them.
pub struct ConversationHandle<'a> {
    pub conversation_id: &'a str,
    pub secrets: &'a SecretsRegistry,
}

#[derive(Debug, Clone, Default)]
pub struct ToolAnnotations {
    /// Consulted to decide whether an LLM-predicted security risk is
    /// required for this tool's calls.
    pub read_only_hint: bool,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    fn output_schema(&self) -> Value {
        serde_json::json!({"type": "object"})
    }
    fn annotations(&self) -> ToolAnnotations {
        ToolAnnotations::default()
    }

    async fn execute(&self, action: Value, conv: ConversationHandle<'_>) -> Result<Value, String>;
}

/// Name -> tool instance map. Owns no conversation state.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn is_read_only(&self, name: &str) -> bool {
        self.tools.get(name).map(|t| t.annotations().read_only_hint).unwrap_or(false)
    }

    /// Tool definitions for the LLM, each carrying a `security_risk`
    /// schema property on non-read-only tools regardless of whether a
    /// security analyzer is actually configured — keeping the schema
    /// stable avoids churn if an analyzer is added or removed later.
    pub fn to_tool_definitions(&self) -> Vec<ac_domain::tool::ToolDefinition> {
        let mut defs: Vec<_> = self
            .tools
            .values()
            .map(|tool| {
                let mut schema = tool.input_schema();
                if !tool.annotations().read_only_hint {
                    inject_security_risk_property(&mut schema);
                }
                ac_domain::tool::ToolDefinition {
                    name: tool.name().to_string(),
                    description: tool.description().to_string(),
                    parameters: schema,
                }
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }
}

fn inject_security_risk_property(schema: &mut Value) {
    let Some(obj) = schema.as_object_mut() else { return };
    let properties = obj
        .entry("properties")
        .or_insert_with(|| serde_json::json!({}))
        .as_object_mut();
    if let Some(properties) = properties {
        properties.insert(
            "security_risk".to_string(),
            serde_json::json!({
                "type": "string",
                "enum": ["UNKNOWN", "LOW", "MEDIUM", "HIGH"],
                "description": "Your assessment of how risky this action is to execute.",
            }),
        );
    }
    let required = obj.entry("required").or_insert_with(|| serde_json::json!([]));
    if let Some(arr) = required.as_array_mut() {
        if !arr.iter().any(|v| v == "security_risk") {
            arr.push(serde_json::json!("security_risk"));
        }
    }
}

/// Tolerates common LLM argument mistakes against a JSON Schema:
/// - a field whose schema type is `array`/`object` but whose value was
///   sent as a JSON-encoded string gets parsed,
/// - a field whose schema type is `number`/`integer`/`boolean` but
///   whose value was sent as a string gets coerced if parseable.
///
/// Anything that still doesn't fit after coercion is left as-is for
/// the caller's own schema validation (coercion is a best-effort
/// repair, not a validator).
pub fn coerce_arguments(schema: &Value, mut args: Value) -> Value {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return args;
    };
    let Some(args_obj) = args.as_object_mut() else {
        return args;
    };

    for (key, prop_schema) in properties {
        let Some(declared_type) = prop_schema.get("type").and_then(Value::as_str) else {
            continue;
        };
        let Some(current) = args_obj.get(key) else { continue };

        if let Value::String(s) = current {
            match declared_type {
                "array" | "object" => {
                    if let Ok(parsed) = serde_json::from_str::<Value>(s) {
                        args_obj.insert(key.clone(), parsed);
                    }
                }
                "integer" => {
                    if let Ok(n) = s.trim().parse::<i64>() {
                        args_obj.insert(key.clone(), serde_json::json!(n));
                    }
                }
                "number" => {
                    if let Ok(n) = s.trim().parse::<f64>() {
                        args_obj.insert(key.clone(), serde_json::json!(n));
                    }
                }
                "boolean" => {
                    if let Ok(b) = s.trim().parse::<bool>() {
                        args_obj.insert(key.clone(), serde_json::json!(b));
                    }
                }
                _ => {}
            }
        }
    }

    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerce_parses_json_encoded_array_field() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": { "items": { "type": "array" } }
        });
        let args = serde_json::json!({ "items": "[1,2,3]" });
        let coerced = coerce_arguments(&schema, args);
        assert_eq!(coerced["items"], serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn coerce_parses_numeric_string() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": { "count": { "type": "integer" } }
        });
        let args = serde_json::json!({ "count": "42" });
        let coerced = coerce_arguments(&schema, args);
        assert_eq!(coerced["count"], serde_json::json!(42));
    }

    #[test]
    fn coerce_leaves_unrecognized_fields_alone() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": { "name": { "type": "string" } }
        });
        let args = serde_json::json!({ "name": "hi", "extra": "kept" });
        let coerced = coerce_arguments(&schema, args);
        assert_eq!(coerced["extra"], serde_json::json!("kept"));
    }

    #[test]
    fn inject_security_risk_adds_required_property() {
        let mut schema = serde_json::json!({"type": "object", "properties": {}});
        inject_security_risk_property(&mut schema);
        assert!(schema["properties"]["security_risk"].is_object());
        assert_eq!(schema["required"], serde_json::json!(["security_risk"]));
    }
}
