//! `ConversationState`: the events plus the status FSM plus policy
//! fields, guarded by a reentrant lock with owner-thread tracking.

use std::cell::UnsafeCell;
use std::sync::{Condvar, Mutex};
use std::thread::ThreadId;

use serde::{Deserialize, Serialize};

use crate::confirmation::ConfirmationPolicy;
use crate::event::{Event, EventId, EventRecord, Source};
use crate::event_log::EventLog;
use crate::secrets::SecretsRegistry;
use crate::security::SecurityAnalyzer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationExecutionStatus {
    Idle,
    Running,
    Paused,
    WaitingForConfirmation,
    Finished,
    Stuck,
    Error,
}

impl std::fmt::Display for ConversationExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::WaitingForConfirmation => "waiting_for_confirmation",
            Self::Finished => "finished",
            Self::Stuck => "stuck",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationStats {
    pub iterations: u64,
    pub llm_calls: u64,
    pub tool_calls: u64,
}

/// A minimal lock with owner-thread tracking that allows the owning
/// thread to reacquire it without deadlocking (e.g. a tool executor
/// calling back into the conversation it was dispatched from).
#[derive(Debug)]
pub struct ReentrantLock {
    inner: Mutex<LockInner>,
    cv: Condvar,
}

#[derive(Debug, Default)]
struct LockInner {
    owner: Option<ThreadId>,
    depth: u32,
}

impl Default for ReentrantLock {
    fn default() -> Self {
        Self { inner: Mutex::new(LockInner::default()), cv: Condvar::new() }
    }
}

impl ReentrantLock {
    fn acquire(&self) {
        let me = std::thread::current().id();
        let mut guard = self.inner.lock().expect("lock poisoned");
        loop {
            match guard.owner {
                Some(owner) if owner == me => break,
                None => break,
                Some(_) => {
                    guard = self.cv.wait(guard).expect("lock poisoned");
                }
            }
        }
        guard.owner = Some(me);
        guard.depth += 1;
    }

    fn release(&self) {
        let me = std::thread::current().id();
        let mut guard = self.inner.lock().expect("lock poisoned");
        assert_eq!(guard.owner, Some(me), "release() called by a thread that doesn't hold the lock");
        guard.depth -= 1;
        if guard.depth == 0 {
            guard.owner = None;
            self.cv.notify_one();
        }
    }

    fn owned_by_current_thread(&self) -> bool {
        let guard = self.inner.lock().expect("lock poisoned");
        guard.owner == Some(std::thread::current().id())
    }
}

/// The data protected by [`ConversationState`]'s lock.
pub struct StateInner {
    pub id: String,
    pub events: EventLog,
    pub status: ConversationExecutionStatus,
    pub confirmation_policy: Box<dyn ConfirmationPolicy>,
    pub security_analyzer: Option<Box<dyn SecurityAnalyzer>>,
    pub activated_knowledge_skills: Vec<String>,
    pub stats: ConversationStats,
    pub secrets: SecretsRegistry,
    pub persistence_dir: Option<String>,
    pub agent_snapshot: serde_json::Value,
}

/// Holds an `EventLog` plus the FSM field and policy fields behind a
/// reentrant lock. Interior mutability is implemented with
/// `UnsafeCell`, not `RefCell`: a plain `RefCell` would panic on
/// reentrant acquisition, which defeats the point of the lock being
/// reentrant. Soundness rests entirely on the discipline that callers
/// only ever touch `StateInner` through a live [`StateGuard`].
pub struct ConversationState {
    lock: ReentrantLock,
    data: UnsafeCell<StateInner>,
}

// Safety: all field access to `data` goes through `acquire()`, which
// serializes cross-thread access via `lock` (same-thread reentry is
// permitted by design, matching the Python `RLock` this mirrors).
unsafe impl Send for ConversationState {}
unsafe impl Sync for ConversationState {}

impl ConversationState {
    pub fn new(inner: StateInner) -> Self {
        Self { lock: ReentrantLock::default(), data: UnsafeCell::new(inner) }
    }

    /// Acquire the lock, returning an RAII guard. Recursive acquisition
    /// by the thread that already holds it succeeds immediately.
    pub fn acquire(&self) -> StateGuard<'_> {
        self.lock.acquire();
        StateGuard { state: self }
    }

    /// Panics unless the calling thread currently holds the lock —
    /// for asserting invariants inside methods that require callers to
    /// have already acquired the guard.
    pub fn assert_locked(&self) {
        assert!(self.lock.owned_by_current_thread(), "state not held by current thread");
    }
}

pub struct StateGuard<'a> {
    state: &'a ConversationState,
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        self.state.lock.release();
    }
}

impl std::ops::Deref for StateGuard<'_> {
    type Target = StateInner;
    fn deref(&self) -> &StateInner {
        unsafe { &*self.state.data.get() }
    }
}

impl std::ops::DerefMut for StateGuard<'_> {
    fn deref_mut(&mut self) -> &mut StateInner {
        unsafe { &mut *self.state.data.get() }
    }
}

/// Returns `ActionEvent`s (by index into `events`) whose `tool_call_id`
/// has no following `ObservationEvent` or `UserRejectObservation` — the
/// authoritative "pending actions" source for both the confirmation
/// gate's release path and the stuck detector.
pub fn get_unmatched_actions(events: &[EventRecord]) -> Vec<&EventRecord> {
    let mut matched: std::collections::HashSet<&str> = std::collections::HashSet::new();
    for rec in events {
        match &rec.event {
            Event::Observation { tool_call_id, .. } | Event::UserRejectObservation { tool_call_id, .. } => {
                matched.insert(tool_call_id.as_str());
            }
            _ => {}
        }
    }
    events
        .iter()
        .filter(|rec| match &rec.event {
            Event::Action { tool_call_id, .. } => !matched.contains(tool_call_id.as_str()),
            _ => false,
        })
        .collect()
}

/// Find the `ActionEvent`'s own id and tool name given a `tool_call_id`,
/// used when constructing the matching `ObservationEvent`.
pub fn find_action_by_call_id<'a>(events: &'a [EventRecord], tool_call_id: &str) -> Option<(&'a EventId, &'a str)> {
    events.iter().rev().find_map(|rec| match &rec.event {
        Event::Action { tool_call_id: id, tool_name, .. } if id == tool_call_id => Some((&rec.id, tool_name.as_str())),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirmation::NeverConfirm;
    use crate::event::{MessageRole, SecurityRisk};
    use crate::event_log::{EventLog, MemoryFileStore};

    fn new_state() -> ConversationState {
        let events = EventLog::open(Box::new(MemoryFileStore::default()), "events").unwrap();
        ConversationState::new(StateInner {
            id: "c1".into(),
            events,
            status: ConversationExecutionStatus::Idle,
            confirmation_policy: Box::new(NeverConfirm),
            security_analyzer: None,
            activated_knowledge_skills: vec![],
            stats: ConversationStats::default(),
            secrets: SecretsRegistry::default(),
            persistence_dir: None,
            agent_snapshot: serde_json::json!({}),
        })
    }

    #[test]
    fn recursive_acquire_does_not_deadlock() {
        let state = new_state();
        let _outer = state.acquire();
        let _inner = state.acquire();
        state.assert_locked();
    }

    #[test]
    fn release_allows_other_thread_to_proceed() {
        let state = std::sync::Arc::new(new_state());
        {
            let _g = state.acquire();
        }
        let state2 = state.clone();
        let handle = std::thread::spawn(move || {
            let _g = state2.acquire();
        });
        handle.join().unwrap();
    }

    #[test]
    fn unmatched_actions_excludes_matched_ones() {
        let a1 = EventRecord::new(
            Source::Agent,
            Event::Action {
                tool_name: "echo".into(),
                tool_call_id: "call-1".into(),
                llm_response_id: "r1".into(),
                action_payload: Some(serde_json::json!({"text": "hi"})),
                thought: vec![],
                security_risk: SecurityRisk::Unknown,
                reasoning_content: None,
                thinking_blocks: vec![],
            },
        );
        let a2 = EventRecord::new(
            Source::Agent,
            Event::Action {
                tool_name: "echo".into(),
                tool_call_id: "call-2".into(),
                llm_response_id: "r1".into(),
                action_payload: Some(serde_json::json!({"text": "bye"})),
                thought: vec![],
                security_risk: SecurityRisk::Unknown,
                reasoning_content: None,
                thinking_blocks: vec![],
            },
        );
        let obs1 = EventRecord::new(
            Source::Environment,
            Event::Observation {
                tool_name: "echo".into(),
                tool_call_id: "call-1".into(),
                action_id: a1.id.clone(),
                observation_payload: serde_json::json!("hi"),
                is_error: false,
            },
        );
        let events = vec![a1, a2, obs1];
        let unmatched = get_unmatched_actions(&events);
        assert_eq!(unmatched.len(), 1);
        assert!(matches!(&unmatched[0].event, Event::Action { tool_call_id, .. } if tool_call_id == "call-2"));
    }

    #[test]
    fn status_serializes_as_snake_case() {
        let json = serde_json::to_string(&ConversationExecutionStatus::WaitingForConfirmation).unwrap();
        assert_eq!(json, "\"waiting_for_confirmation\"");
    }

    // suppress unused import warning for MessageRole in this module's tests
    #[allow(dead_code)]
    fn _use(_: MessageRole) {}
}
