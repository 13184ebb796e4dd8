//! The conversation engine's error taxonomy.
//!
//! Kinds, not type names, per the design: input validation and missing
//! `security_risk` both surface as [`Event::AgentError`](crate::event::Event::AgentError)
//! rather than this enum — they are non-terminal and handled inside the
//! step engine. This enum covers the failures that stop the engine
//! outright: corrupted storage, reconciliation mismatches, and the
//! run-loop's terminal wrapper.

#[derive(thiserror::Error, Debug)]
pub enum ConversationError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("event id '{id}' already present at index {existing_index}")]
    DuplicateEventId { id: String, existing_index: usize },

    #[error("index {index} out of range (log has {length} events)")]
    IndexOutOfRange { index: usize, length: usize },

    #[error("event not found: {0}")]
    EventNotFound(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("reconciliation failed: {0}")]
    ReconciliationFailed(String),

    #[error("state is locked by another thread")]
    NotLocked,

    #[error("context window exceeded")]
    ContextWindowExceeded,

    #[error("function call validation error: {0}")]
    FunctionCallValidationError(String),

    #[error("llm provider error: {0}")]
    LlmProvider(String),

    #[error("max iterations reached")]
    MaxIterationsReached,

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ConversationError>;

/// Wraps any error that escapes the run loop. The loop always emits a
/// `ConversationError` event and sets status to `Error` before
/// re-raising this.
#[derive(thiserror::Error, Debug)]
#[error("conversation {conversation_id} failed (persisted at {persistence_dir:?}): {source}")]
pub struct ConversationRunError {
    pub conversation_id: String,
    pub persistence_dir: Option<String>,
    #[source]
    pub source: ConversationError,
}
