//! Wraps one MCP-discovered tool as an `ac_conversation::tool::Tool` so
//! the step engine can dispatch to it exactly like a built-in tool,
//! going through the same `coerce_arguments` argument repair every
//! other tool gets.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use ac_conversation::tool::{ConversationHandle, Tool, ToolAnnotations};

use crate::manager::McpManager;
use crate::protocol::McpToolDef;

/// Join a server id and an MCP tool name into the flat name the LLM
/// sees and the step engine routes on.
pub fn bridged_name(server_id: &str, tool_name: &str) -> String {
    format!("mcp__{server_id}__{tool_name}")
}

pub struct McpBridgeTool {
    server_id: String,
    def: McpToolDef,
    manager: Arc<McpManager>,
    bridged_name: String,
}

impl McpBridgeTool {
    pub fn new(server_id: String, def: McpToolDef, manager: Arc<McpManager>) -> Self {
        let bridged_name = bridged_name(&server_id, &def.name);
        Self { server_id, def, manager, bridged_name }
    }

    /// One [`Tool`] per tool currently advertised by `manager`, ready to
    /// register into a `ToolRegistry`.
    pub fn discover(manager: Arc<McpManager>) -> Vec<Arc<dyn Tool>> {
        manager
            .list_tools()
            .into_iter()
            .map(|(server_id, def)| Arc::new(Self::new(server_id.to_string(), def.clone(), manager.clone())) as Arc<dyn Tool>)
            .collect()
    }
}

#[async_trait]
impl Tool for McpBridgeTool {
    fn name(&self) -> &str {
        &self.bridged_name
    }

    fn description(&self) -> &str {
        &self.def.description
    }

    fn input_schema(&self) -> Value {
        self.def.input_schema.clone()
    }

    fn annotations(&self) -> ToolAnnotations {
        ToolAnnotations { read_only_hint: false }
    }

    async fn execute(&self, action: Value, _conv: ConversationHandle<'_>) -> Result<Value, String> {
        let result = self
            .manager
            .call_tool(&self.server_id, &self.def.name, action)
            .await
            .map_err(|e| e.to_string())?;

        let text: String = result.content.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join("\n");

        if result.is_error {
            return Err(text);
        }
        Ok(serde_json::json!({"content": text}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bridged_name_joins_server_and_tool() {
        assert_eq!(bridged_name("filesystem", "read_file"), "mcp__filesystem__read_file");
    }
}
