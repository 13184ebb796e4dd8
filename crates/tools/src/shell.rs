//! `shell`: run a command to completion and return its combined
//! stdout/stderr plus exit code. Foreground-only — no background
//! session management, since concrete tool implementations exist here
//! only to exercise the `Tool` contract end to end, not as a sandboxed
//! process host.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;

use ac_conversation::tool::{ConversationHandle, Tool, ToolAnnotations};

#[derive(Debug, Clone, Deserialize)]
struct ShellArgs {
    command: String,
    #[serde(default)]
    timeout_sec: Option<u64>,
}

pub struct ShellTool {
    pub default_timeout_sec: u64,
}

impl Default for ShellTool {
    fn default() -> Self {
        Self { default_timeout_sec: 30 }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Run a shell command and return its combined stdout/stderr and exit code."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "description": "the command to run via `sh -c`"},
                "timeout_sec": {"type": "integer", "description": "override the default timeout"},
            },
            "required": ["command"],
        })
    }

    fn annotations(&self) -> ToolAnnotations {
        ToolAnnotations { read_only_hint: false }
    }

    async fn execute(&self, action: Value, _conv: ConversationHandle<'_>) -> Result<Value, String> {
        let args: ShellArgs = serde_json::from_value(action).map_err(|e| format!("invalid shell arguments: {e}"))?;

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&args.command);
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        let timeout = Duration::from_secs(args.timeout_sec.unwrap_or(self.default_timeout_sec));

        let child = cmd.spawn().map_err(|e| format!("failed to spawn '{}': {e}", args.command))?;
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(format!("command failed: {e}")),
            Err(_) => return Err(format!("command timed out after {}s", timeout.as_secs())),
        };

        let combined = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );

        Ok(serde_json::json!({
            "exit_code": output.status.code(),
            "output": combined,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ac_conversation::secrets::SecretsRegistry;

    fn handle<'a>(secrets: &'a SecretsRegistry) -> ConversationHandle<'a> {
        ConversationHandle { conversation_id: "c1", secrets }
    }

    #[tokio::test]
    async fn runs_a_command_and_captures_output() {
        let secrets = SecretsRegistry::default();
        let tool = ShellTool::default();
        let result = tool
            .execute(serde_json::json!({"command": "echo hi"}), handle(&secrets))
            .await
            .unwrap();
        assert_eq!(result["exit_code"], serde_json::json!(0));
        assert!(result["output"].as_str().unwrap().contains("hi"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_not_an_error() {
        let secrets = SecretsRegistry::default();
        let tool = ShellTool::default();
        let result = tool
            .execute(serde_json::json!({"command": "exit 7"}), handle(&secrets))
            .await
            .unwrap();
        assert_eq!(result["exit_code"], serde_json::json!(7));
    }

    #[tokio::test]
    async fn timeout_is_reported_as_an_error() {
        let secrets = SecretsRegistry::default();
        let tool = ShellTool::default();
        let result = tool
            .execute(serde_json::json!({"command": "sleep 5", "timeout_sec": 0}), handle(&secrets))
            .await;
        assert!(result.is_err());
    }
}
