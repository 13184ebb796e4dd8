//! Persistence of everything about a conversation that isn't an event:
//! `base_state.json` alongside the `events/` directory the `EventLog`
//! already manages. Loading an existing conversation reconciles the
//! runtime `Agent`'s snapshot against the one recorded when the
//! conversation was created, rather than trusting the persisted
//! snapshot blindly.

use ac_domain::trace::TraceEvent;
use serde::{Deserialize, Serialize};

use crate::error::{ConversationError, Result};
use crate::event_log::FileStore;
use crate::state::{ConversationExecutionStatus, ConversationStats};

const BASE_STATE_FILE: &str = "base_state.json";

/// Everything about a conversation the event log doesn't already carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseState {
    pub id: String,
    pub status: ConversationExecutionStatus,
    pub stats: ConversationStats,
    pub agent_snapshot: serde_json::Value,
}

pub fn save(store: &dyn FileStore, dir: &str, state: &BaseState) -> Result<()> {
    let path = format!("{dir}/{BASE_STATE_FILE}");
    let json = serde_json::to_string_pretty(state)?;
    store.write(&path, &json)?;
    Ok(())
}

/// Loads `base_state.json` if present, reconciling its `agent_snapshot`
/// against the runtime agent's. `Ok(None)` means no base state exists
/// yet — orphaned event files with no base state are treated as a
/// fresh conversation rather than a corrupt one, since the two files
/// are written independently and a crash between them is recoverable
/// by just starting over.
pub fn load(
    store: &dyn FileStore,
    dir: &str,
    conversation_id: &str,
    runtime_snapshot: &serde_json::Value,
) -> Result<Option<BaseState>> {
    let path = format!("{dir}/{BASE_STATE_FILE}");
    let raw = match store.read(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ConversationError::Io(e)),
    };
    let mut loaded: BaseState = serde_json::from_str(&raw)?;
    reconcile(conversation_id, &mut loaded.agent_snapshot, runtime_snapshot)?;
    Ok(Some(loaded))
}

/// `security_analyzer` presence and the `llm` field's secret-bearing
/// sub-fields always reconcile to the runtime value — swapping
/// analyzers or rotating credentials between process restarts is
/// allowed. Every other field (system prompt, tool set) must match
/// exactly; any difference means the persisted conversation was
/// created by a different agent and resuming it would silently change
/// its semantics, which is treated as fatal rather than guessed at.
/// Every failure is also recorded as a [`TraceEvent::ReconciliationFailed`]
/// before the error is returned.
fn reconcile(conversation_id: &str, persisted: &mut serde_json::Value, runtime: &serde_json::Value) -> Result<()> {
    let fail = |diff: String| -> ConversationError {
        TraceEvent::ReconciliationFailed { conversation_id: conversation_id.to_string(), diff: diff.clone() }.emit();
        ConversationError::ReconciliationFailed(diff)
    };

    let (Some(persisted_obj), Some(runtime_obj)) = (persisted.as_object_mut(), runtime.as_object()) else {
        return Err(fail("agent snapshot is not a JSON object".into()));
    };

    if let Some(runtime_flag) = runtime_obj.get("has_security_analyzer") {
        persisted_obj.insert("has_security_analyzer".to_string(), runtime_flag.clone());
    }

    if let Some(runtime_llm) = runtime_obj.get("llm") {
        reconcile_llm_field(persisted_obj, runtime_llm, &fail)?;
    }

    for (key, runtime_value) in runtime_obj {
        if key == "has_security_analyzer" || key == "llm" {
            continue;
        }
        match persisted_obj.get(key) {
            Some(persisted_value) if persisted_value == runtime_value => {}
            Some(persisted_value) => {
                return Err(fail(format!(
                    "field '{key}' differs: persisted={persisted_value}, runtime={runtime_value}"
                )));
            }
            None => {
                return Err(fail(format!("runtime agent has field '{key}' the persisted conversation doesn't")));
            }
        }
    }

    Ok(())
}

/// Keys inside the `llm` snapshot field that always take the runtime's
/// value rather than needing to match: the ones that carry a secret
/// (an API key, AWS credentials) or that a caller may legitimately vary
/// per process (extra body parameters forwarded to the provider).
const LLM_RECONCILES_TO_RUNTIME: &[&str] =
    &["api_key", "aws_access_key_id", "aws_secret_access_key", "aws_session_token", "litellm_extra_body"];

fn reconcile_llm_field(
    persisted_obj: &mut serde_json::Map<String, serde_json::Value>,
    runtime_llm: &serde_json::Value,
    fail: &dyn Fn(String) -> ConversationError,
) -> Result<()> {
    let runtime_llm_obj = runtime_llm.as_object().ok_or_else(|| fail("runtime 'llm' snapshot is not a JSON object".into()))?;

    let mut merged = match persisted_obj.get("llm").and_then(|v| v.as_object()) {
        Some(obj) => obj.clone(),
        None => serde_json::Map::new(),
    };

    for (key, runtime_value) in runtime_llm_obj {
        if LLM_RECONCILES_TO_RUNTIME.contains(&key.as_str()) {
            merged.insert(key.clone(), runtime_value.clone());
            continue;
        }
        match merged.get(key) {
            Some(persisted_value) if persisted_value == runtime_value => {}
            Some(persisted_value) => {
                return Err(fail(format!(
                    "llm field '{key}' differs: persisted={persisted_value}, runtime={runtime_value}"
                )));
            }
            None => {
                merged.insert(key.clone(), runtime_value.clone());
            }
        }
    }

    persisted_obj.insert("llm".to_string(), serde_json::Value::Object(merged));
    Ok(())
}
