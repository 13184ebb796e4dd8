//! The event sum type and its envelope.
//!
//! Events are immutable once appended. Every variant that can be
//! malformed (actions with unparsable arguments) still gets recorded —
//! dropping it would lose the `tool_call_id` the next LLM turn needs to
//! close out the call.

use serde::{Deserialize, Serialize};

/// Opaque, per-conversation-unique event id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    User,
    Agent,
    Environment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityRisk {
    Unknown,
    Low,
    Medium,
    High,
}

/// One envelope per line in the event log: the variant plus the
/// bookkeeping every variant shares (id, timestamp, source).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: EventId,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub source: Source,
    #[serde(flatten)]
    pub event: Event,
}

impl EventRecord {
    pub fn new(source: Source, event: Event) -> Self {
        Self {
            id: EventId::new(),
            timestamp: chrono::Utc::now(),
            source,
            event,
        }
    }

    /// Structural equality used by the stuck detector: same source and
    /// variant-appropriate payload, ignoring ids, timestamps, and
    /// metrics. See [`Event::stuck_eq`].
    pub fn stuck_eq(&self, other: &EventRecord) -> bool {
        self.source == other.source && self.event.stuck_eq(&other.event)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Event {
    SystemPrompt {
        prompt_text: String,
        tool_schemas: Vec<serde_json::Value>,
    },
    Message {
        role: MessageRole,
        content: Vec<String>,
        #[serde(default)]
        activated_skills: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        sender: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        reasoning_content: Option<String>,
        #[serde(default)]
        thinking_blocks: Vec<String>,
    },
    Action {
        tool_name: String,
        tool_call_id: String,
        llm_response_id: String,
        /// `None` means the call was malformed — preserved so the next
        /// LLM turn still has a matching `tool_call_id` to close out.
        #[serde(skip_serializing_if = "Option::is_none", default)]
        action_payload: Option<serde_json::Value>,
        #[serde(default)]
        thought: Vec<String>,
        security_risk: SecurityRisk,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        reasoning_content: Option<String>,
        #[serde(default)]
        thinking_blocks: Vec<String>,
    },
    Observation {
        tool_name: String,
        tool_call_id: String,
        action_id: EventId,
        observation_payload: serde_json::Value,
        is_error: bool,
    },
    AgentError {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        tool_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        tool_call_id: Option<String>,
    },
    UserRejectObservation {
        tool_name: String,
        tool_call_id: String,
        action_id: EventId,
        reason: String,
    },
    CondensationRequest,
    Condensation {
        summary: String,
        dropped_ids: Vec<EventId>,
    },
    Pause,
    ConversationError {
        code: String,
        detail: String,
    },
    Token {
        prompt_ids: Vec<String>,
        response_ids: Vec<String>,
    },
    ConversationStateUpdate {
        key: String,
        value: serde_json::Value,
    },
}

impl Event {
    pub fn is_action(&self) -> bool {
        matches!(self, Event::Action { .. })
    }

    pub fn is_agent_error(&self) -> bool {
        matches!(self, Event::AgentError { .. })
    }

    /// Is this a plain assistant message produced by the agent (as
    /// opposed to a user message or a system prompt)?
    pub fn is_agent_message(&self) -> bool {
        matches!(self, Event::Message { role: MessageRole::Assistant, .. })
    }

    pub fn is_user_message(&self) -> bool {
        matches!(self, Event::Message { role: MessageRole::User, .. })
    }

    pub fn is_condensation(&self) -> bool {
        matches!(self, Event::Condensation { .. })
    }

    /// Structural equality for the stuck detector: compares only the
    /// content fields per variant, ignoring ids and timestamps.
    pub fn stuck_eq(&self, other: &Event) -> bool {
        use Event::*;
        match (self, other) {
            (
                Action { thought: t1, action_payload: p1, tool_name: n1, .. },
                Action { thought: t2, action_payload: p2, tool_name: n2, .. },
            ) => t1 == t2 && p1 == p2 && n1 == n2,
            (
                Observation { observation_payload: p1, tool_name: n1, .. },
                Observation { observation_payload: p2, tool_name: n2, .. },
            ) => p1 == p2 && n1 == n2,
            (AgentError { error: e1, .. }, AgentError { error: e2, .. }) => e1 == e2,
            (
                Message { content: c1, .. },
                Message { content: c2, .. },
            ) => c1 == c2,
            _ => false,
        }
    }
}
