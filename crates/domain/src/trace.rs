use serde::Serialize;

/// Structured, high-value lifecycle events emitted across the workspace.
///
/// Routine per-call detail is logged with plain `tracing::debug!`/`info!`
/// calls; this type is reserved for events worth grepping for across a
/// whole run (conversation lifecycle, reconciliation, stuck detection).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    ConversationCreated {
        conversation_id: String,
        resumed: bool,
    },
    ConversationClosed {
        conversation_id: String,
    },
    StatusTransition {
        conversation_id: String,
        from: String,
        to: String,
    },
    StuckDetected {
        conversation_id: String,
        scenario: String,
    },
    ReconciliationFailed {
        conversation_id: String,
        diff: String,
    },
    ToolInvoked {
        tool_name: String,
        tool_call_id: String,
        duration_ms: u64,
        is_error: bool,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "ac_event");
    }
}
