//! The `LlmClient` interface consumed by the step engine. Concrete
//! transport (HTTP calls to a provider, token accounting, retries) is
//! out of scope for the core and lives in whatever crate the embedding
//! program brings; this module only specifies the boundary.

use async_trait::async_trait;

use ac_domain::tool::{Message, ToolDefinition};

use crate::error::ConversationError;

#[derive(Debug, Clone, Default)]
pub struct LlmToolCallResponse {
    pub call_id: String,
    pub tool_name: String,
    /// The provider's raw, unparsed function-call argument text.
    /// Deliberately not pre-parsed here: a model can and does emit
    /// invalid JSON for a single call without the rest of the turn
    /// being garbage, and the step engine needs to record that failure
    /// against this one call (a null-payload `Action` plus a paired
    /// `AgentError`) rather than aborting the whole LLM response.
    pub raw_arguments: String,
}

#[derive(Debug, Clone, Default)]
pub struct LlmResponseMessage {
    pub content: Vec<String>,
    pub tool_calls: Vec<LlmToolCallResponse>,
    pub reasoning_content: Option<String>,
    pub thinking_blocks: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub message: LlmResponseMessage,
    pub id: String,
    pub prompt_token_ids: Vec<String>,
    pub response_token_ids: Vec<String>,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete one turn. Implementations should map provider-specific
    /// "context window exceeded" and "the provider rejected the tool
    /// schema" failures to [`ConversationError::ContextWindowExceeded`]
    /// and [`ConversationError::FunctionCallValidationError`]
    /// respectively so the step engine can react to those cases instead
    /// of treating every failure as fatal.
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse, ConversationError>;

    /// A reconciliation snapshot of this client's own config (model,
    /// base URL, credential presence), folded into [`crate::agent::Agent::snapshot`]
    /// under the `llm` key. Secret-bearing fields should be replaced
    /// with a fixed placeholder rather than the real value before
    /// returning, since this snapshot is what gets written to disk —
    /// reconciliation always takes the runtime's value for those keys
    /// regardless of what the placeholder says. Clients with nothing
    /// worth reconciling (like [`ScriptedLlmClient`]) can leave this at
    /// its default of `Null`, which `Agent::snapshot` omits entirely.
    fn config_snapshot(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}

/// An `LlmClient` driven entirely by a pre-programmed sequence of
/// responses, for use in engine tests where no real model is reachable.
pub struct ScriptedLlmClient {
    responses: std::sync::Mutex<std::collections::VecDeque<Result<LlmResponse, ConversationError>>>,
}

impl ScriptedLlmClient {
    pub fn new(responses: Vec<Result<LlmResponse, ConversationError>>) -> Self {
        Self { responses: std::sync::Mutex::new(responses.into()) }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(
        &self,
        _messages: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<LlmResponse, ConversationError> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ConversationError::Other("scripted LLM client exhausted".into())))
    }
}
