//! `think`: a scratchpad tool with no side effects. Lets the agent
//! externalize reasoning as a tool call (useful when a provider charges
//! for/limits free-form assistant text more than tool calls) without
//! the call ever reaching a confirmation gate.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use ac_conversation::tool::{ConversationHandle, Tool, ToolAnnotations};

#[derive(Debug, Clone, Deserialize)]
struct ThinkArgs {
    thought: String,
}

#[derive(Default)]
pub struct ThinkTool;

#[async_trait]
impl Tool for ThinkTool {
    fn name(&self) -> &str {
        "think"
    }

    fn description(&self) -> &str {
        "Record a reasoning step without taking any action."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {"thought": {"type": "string"}},
            "required": ["thought"],
        })
    }

    fn annotations(&self) -> ToolAnnotations {
        ToolAnnotations { read_only_hint: true }
    }

    async fn execute(&self, action: Value, _conv: ConversationHandle<'_>) -> Result<Value, String> {
        let args: ThinkArgs = serde_json::from_value(action).map_err(|e| format!("invalid think arguments: {e}"))?;
        Ok(serde_json::json!({"acknowledged": args.thought}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ac_conversation::secrets::SecretsRegistry;

    #[tokio::test]
    async fn acknowledges_the_thought() {
        let secrets = SecretsRegistry::default();
        let tool = ThinkTool;
        let result = tool
            .execute(
                serde_json::json!({"thought": "let me reconsider"}),
                ConversationHandle { conversation_id: "c1", secrets: &secrets },
            )
            .await
            .unwrap();
        assert_eq!(result["acknowledged"], serde_json::json!("let me reconsider"));
    }
}
