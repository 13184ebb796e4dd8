//! `finish`: the terminal tool. Calling it is the agent's signal that
//! the task is complete; the step engine transitions the conversation
//! to `FINISHED` whenever this tool's observation isn't an error,
//! regardless of what `message` it was called with.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use ac_conversation::tool::{ConversationHandle, Tool, ToolAnnotations};

#[derive(Debug, Clone, Deserialize)]
struct FinishArgs {
    message: String,
}

#[derive(Default)]
pub struct FinishTool;

#[async_trait]
impl Tool for FinishTool {
    fn name(&self) -> &str {
        "finish"
    }

    fn description(&self) -> &str {
        "Signal that the task is complete, with a final summary for the user."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {"message": {"type": "string"}},
            "required": ["message"],
        })
    }

    fn annotations(&self) -> ToolAnnotations {
        ToolAnnotations { read_only_hint: true }
    }

    async fn execute(&self, action: Value, _conv: ConversationHandle<'_>) -> Result<Value, String> {
        let args: FinishArgs = serde_json::from_value(action).map_err(|e| format!("invalid finish arguments: {e}"))?;
        Ok(serde_json::json!({"message": args.message}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ac_conversation::secrets::SecretsRegistry;

    #[tokio::test]
    async fn echoes_the_final_message() {
        let secrets = SecretsRegistry::default();
        let tool = FinishTool;
        let result = tool
            .execute(
                serde_json::json!({"message": "done"}),
                ConversationHandle { conversation_id: "c1", secrets: &secrets },
            )
            .await
            .unwrap();
        assert_eq!(result["message"], serde_json::json!("done"));
    }
}
