//! A real `LlmClient` talking to an OpenAI-compatible chat-completions
//! endpoint over `reqwest`. This is one concrete transport the core's
//! `LlmClient` interface was deliberately left open for — not the only
//! one an embedding program could choose.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use ac_conversation::error::ConversationError;
use ac_conversation::llm::{LlmClient, LlmResponse, LlmResponseMessage, LlmToolCallResponse};
use ac_domain::tool::{ContentPart, Message, MessageContent, Role, ToolDefinition};

pub struct HttpLlmClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpLlmClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into(), model: model.into(), api_key }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ChatTool>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ChatToolCall>>,
}

#[derive(Serialize)]
struct ChatTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: ChatFunction,
}

#[derive(Serialize)]
struct ChatFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Serialize, Deserialize)]
struct ChatToolCall {
    id: String,
    #[serde(rename = "type", default = "default_function")]
    kind: String,
    function: ChatToolCallFunction,
}

fn default_function() -> String {
    "function".into()
}

#[derive(Serialize, Deserialize)]
struct ChatToolCallFunction {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct ChatCompletion {
    id: String,
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ChatToolCall>,
}

fn to_chat_message(message: &Message) -> ChatMessage {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };

    match &message.content {
        MessageContent::Text(text) => {
            ChatMessage { role, content: Some(text.clone()), tool_call_id: None, tool_calls: None }
        }
        MessageContent::Parts(parts) => {
            let mut tool_call_id = None;
            let mut tool_calls = Vec::new();
            let mut text = String::new();
            for part in parts {
                match part {
                    ContentPart::Text { text: t } => {
                        if !text.is_empty() {
                            text.push('\n');
                        }
                        text.push_str(t);
                    }
                    ContentPart::ToolResult { tool_use_id, content, .. } => {
                        tool_call_id = Some(tool_use_id.clone());
                        text = content.clone();
                    }
                    ContentPart::ToolUse { id, name, input } => {
                        tool_calls.push(ChatToolCall {
                            id: id.clone(),
                            kind: default_function(),
                            function: ChatToolCallFunction { name: name.clone(), arguments: input.to_string() },
                        });
                    }
                    ContentPart::Image { .. } => {}
                }
            }
            ChatMessage {
                role,
                content: if text.is_empty() && !tool_calls.is_empty() { None } else { Some(text) },
                tool_call_id,
                tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
            }
        }
    }
}

fn to_chat_tool(def: &ToolDefinition) -> ChatTool {
    ChatTool {
        kind: "function",
        function: ChatFunction { name: def.name.clone(), description: def.description.clone(), parameters: def.parameters.clone() },
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<LlmResponse, ConversationError> {
        let request = ChatRequest {
            model: &self.model,
            messages: messages.iter().map(to_chat_message).collect(),
            tools: tools.iter().map(to_chat_tool).collect(),
        };

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let mut req = self.http.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| ConversationError::Other(format!("llm request failed: {e}")))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| ConversationError::Other(format!("reading llm response: {e}")))?;

        if status == reqwest::StatusCode::BAD_REQUEST && body.to_lowercase().contains("context") {
            return Err(ConversationError::ContextWindowExceeded);
        }
        if !status.is_success() {
            return Err(ConversationError::Other(format!("llm returned {status}: {body}")));
        }

        let completion: ChatCompletion =
            serde_json::from_str(&body).map_err(|e| ConversationError::Other(format!("parsing llm response: {e} (body: {body})")))?;
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ConversationError::Other("llm response had no choices".into()))?;

        // Argument JSON is deliberately not parsed here: a malformed
        // call is a per-call concern for the step engine to record and
        // report back to the model, not a reason to fail the whole turn.
        let tool_calls: Vec<LlmToolCallResponse> = choice
            .message
            .tool_calls
            .into_iter()
            .map(|call| LlmToolCallResponse {
                call_id: call.id,
                tool_name: call.function.name,
                raw_arguments: call.function.arguments,
            })
            .collect();

        Ok(LlmResponse {
            message: LlmResponseMessage {
                content: choice.message.content.into_iter().collect(),
                tool_calls,
                reasoning_content: None,
                thinking_blocks: vec![],
            },
            id: completion.id,
            prompt_token_ids: vec![],
            response_token_ids: vec![],
        })
    }

    fn config_snapshot(&self) -> Value {
        serde_json::json!({
            "base_url": self.base_url,
            "model": self.model,
            "api_key": self.api_key.as_ref().map(|_| "<provided>").unwrap_or("<unset>"),
        })
    }
}
