//! `Conversation`: the public façade wrapping an `Agent`, its
//! `ConversationState`, a `Condenser`, and the `StuckDetector`, and
//! driving the `AgentStepEngine` loop.

use std::sync::Mutex;

use ac_domain::trace::TraceEvent;

use crate::agent::Agent;
use crate::condenser::{CondenseResult, Condenser};
use crate::confirmation::ConfirmationPolicy;
use crate::error::{ConversationError, ConversationRunError, Result};
use crate::event::{Event, EventRecord, MessageRole, Source};
use crate::event_log::{EventLog, FileStore};
use crate::llm::LlmClient;
use crate::persistence;
use crate::secrets::SecretSource;
use crate::state::{find_action_by_call_id, get_unmatched_actions, ConversationExecutionStatus, ConversationState, StateInner};
use crate::step::AgentStepEngine;
use crate::stuck::StuckDetector;

/// A user-supplied callback invoked with every event as it's appended.
/// Independent of persistence — the event is already durable by the
/// time any callback runs.
pub type EventCallback = Box<dyn Fn(&EventRecord) + Send + Sync>;

/// Default `max_length` for [`Conversation::generate_title`] when a
/// caller has no stronger preference.
pub const DEFAULT_TITLE_LENGTH: usize = 50;

fn truncate_title(text: &str, max_length: usize) -> String {
    if text.chars().count() > max_length {
        format!("{}…", text.chars().take(max_length).collect::<String>())
    } else {
        text.to_string()
    }
}

pub struct Conversation {
    pub id: String,
    agent: Agent,
    state: ConversationState,
    condenser: Box<dyn Condenser>,
    stuck_detector: StuckDetector,
    engine: AgentStepEngine,
    callbacks: Mutex<Vec<EventCallback>>,
    max_iterations: u64,
    persistence_store: Option<Box<dyn FileStore>>,
}

impl Conversation {
    /// Opens (or creates) a conversation against `events`. Emits the
    /// system prompt exactly once, via `Agent::init_state` — resuming a
    /// conversation with a non-empty log is a no-op here.
    pub fn new(
        id: impl Into<String>,
        agent: Agent,
        mut events: EventLog,
        condenser: Box<dyn Condenser>,
        confirmation_policy: Box<dyn ConfirmationPolicy>,
    ) -> Result<Self> {
        let id = id.into();
        agent.init_state(&mut events)?;
        let agent_snapshot = agent.snapshot();
        let state = ConversationState::new(StateInner {
            id: id.clone(),
            events,
            status: ConversationExecutionStatus::Idle,
            confirmation_policy,
            security_analyzer: None,
            activated_knowledge_skills: vec![],
            stats: Default::default(),
            secrets: Default::default(),
            persistence_dir: None,
            agent_snapshot,
        });
        TraceEvent::ConversationCreated { conversation_id: id.clone(), resumed: false }.emit();
        Ok(Self {
            id,
            agent,
            state,
            condenser,
            stuck_detector: StuckDetector,
            engine: AgentStepEngine,
            callbacks: Mutex::new(Vec::new()),
            max_iterations: 500,
            persistence_store: None,
        })
    }

    /// Like [`Conversation::new`], but also reconciles and maintains a
    /// `base_state.json` under `persistence_dir`: status and stats
    /// survive a process restart, and the persisted agent snapshot is
    /// checked against this run's agent before anything is trusted.
    pub fn open_persistent(
        id: impl Into<String>,
        agent: Agent,
        mut events: EventLog,
        condenser: Box<dyn Condenser>,
        confirmation_policy: Box<dyn ConfirmationPolicy>,
        persistence_store: Box<dyn FileStore>,
        persistence_dir: impl Into<String>,
    ) -> Result<Self> {
        let id = id.into();
        let persistence_dir = persistence_dir.into();
        let runtime_snapshot = agent.snapshot();
        let loaded = persistence::load(persistence_store.as_ref(), &persistence_dir, &id, &runtime_snapshot)?;

        agent.init_state(&mut events)?;

        let resumed = loaded.is_some();
        let (status, stats, agent_snapshot) = match loaded {
            Some(base) => (base.status, base.stats, base.agent_snapshot),
            None => (ConversationExecutionStatus::Idle, Default::default(), runtime_snapshot),
        };
        TraceEvent::ConversationCreated { conversation_id: id.clone(), resumed }.emit();

        let state = ConversationState::new(StateInner {
            id: id.clone(),
            events,
            status,
            confirmation_policy,
            security_analyzer: None,
            activated_knowledge_skills: vec![],
            stats,
            secrets: Default::default(),
            persistence_dir: Some(persistence_dir),
            agent_snapshot,
        });
        Ok(Self {
            id,
            agent,
            state,
            condenser,
            stuck_detector: StuckDetector,
            engine: AgentStepEngine,
            callbacks: Mutex::new(Vec::new()),
            max_iterations: 500,
            persistence_store: Some(persistence_store),
        })
    }

    /// Write `base_state.json` if this conversation was opened with
    /// [`Conversation::open_persistent`]; a no-op otherwise.
    pub fn save_base_state(&self) -> Result<()> {
        let Some(store) = &self.persistence_store else { return Ok(()) };
        let guard = self.state.acquire();
        let Some(dir) = guard.persistence_dir.clone() else { return Ok(()) };
        let base = persistence::BaseState {
            id: guard.id.clone(),
            status: guard.status,
            stats: guard.stats.clone(),
            agent_snapshot: guard.agent_snapshot.clone(),
        };
        drop(guard);
        persistence::save(store.as_ref(), &dir, &base)
    }

    pub fn on_event(&self, callback: EventCallback) {
        self.callbacks.lock().expect("callbacks lock poisoned").push(callback);
    }

    fn notify(&self, record: &EventRecord) {
        for cb in self.callbacks.lock().expect("callbacks lock poisoned").iter() {
            cb(record);
        }
    }

    pub fn status(&self) -> ConversationExecutionStatus {
        self.state.acquire().status
    }

    /// Append a user message and make the conversation runnable. Valid
    /// from any status except mid-run states the caller shouldn't be
    /// racing against; `Finished` is explicitly allowed to restart
    /// the conversation, matching the "not a break condition" rule for
    /// concurrent sends during `run()`.
    pub fn send_message(&self, text: impl Into<String>) -> Result<()> {
        let mut guard = self.state.acquire();
        let record = EventRecord::new(
            Source::User,
            Event::Message {
                role: MessageRole::User,
                content: vec![text.into()],
                activated_skills: vec![],
                sender: None,
                reasoning_content: None,
                thinking_blocks: vec![],
            },
        );
        guard.events.append(record.clone())?;
        drop(guard);
        self.notify(&record);
        let mut guard = self.state.acquire();
        let from = guard.status;
        guard.status = ConversationExecutionStatus::Running;
        if from != ConversationExecutionStatus::Running {
            TraceEvent::StatusTransition { conversation_id: self.id.clone(), from: from.to_string(), to: ConversationExecutionStatus::Running.to_string() }.emit();
        }
        Ok(())
    }

    /// Drives steps until the conversation leaves the `Running` state
    /// (paused, waiting for confirmation, finished, stuck, or erred) or
    /// `max_iterations` is exceeded.
    pub async fn run(&self) -> Result<()> {
        loop {
            if self.state.acquire().status != ConversationExecutionStatus::Running {
                self.save_base_state()?;
                return Ok(());
            }

            let snapshot = self.state.acquire().events.to_vec()?;
            if let Some(scenario) = self.stuck_detector.is_stuck(&snapshot) {
                let mut guard = self.state.acquire();
                let from = guard.status;
                guard.status = ConversationExecutionStatus::Stuck;
                tracing::warn!(conversation_id = %self.id, scenario = scenario.name(), "conversation stuck");
                drop(guard);
                TraceEvent::StuckDetected { conversation_id: self.id.clone(), scenario: scenario.name().to_string() }.emit();
                TraceEvent::StatusTransition {
                    conversation_id: self.id.clone(),
                    from: from.to_string(),
                    to: ConversationExecutionStatus::Stuck.to_string(),
                }
                .emit();
                self.save_base_state()?;
                return Ok(());
            }

            let result = {
                let mut cb = |rec: &EventRecord| self.notify(rec);
                self.engine.step(&self.agent, &self.state, self.condenser.as_ref(), &mut cb).await
            };

            if let Err(source) = result {
                let mut guard = self.state.acquire();
                let from = guard.status;
                guard.status = ConversationExecutionStatus::Error;
                let persistence_dir = guard.persistence_dir.clone();
                drop(guard);
                TraceEvent::StatusTransition {
                    conversation_id: self.id.clone(),
                    from: from.to_string(),
                    to: ConversationExecutionStatus::Error.to_string(),
                }
                .emit();
                let _ = self.save_base_state();
                return Err(ConversationError::Other(
                    ConversationRunError { conversation_id: self.id.clone(), persistence_dir, source }.to_string(),
                ));
            }

            let mut guard = self.state.acquire();
            guard.stats.iterations += 1;
            if guard.stats.iterations >= self.max_iterations && guard.status == ConversationExecutionStatus::Running {
                guard.status = ConversationExecutionStatus::Error;
                drop(guard);
                TraceEvent::StatusTransition {
                    conversation_id: self.id.clone(),
                    from: ConversationExecutionStatus::Running.to_string(),
                    to: ConversationExecutionStatus::Error.to_string(),
                }
                .emit();
                let _ = self.save_base_state();
                return Err(ConversationError::MaxIterationsReached);
            }
        }
    }

    /// Idempotent: pausing a conversation that isn't running is a
    /// no-op. Takes effect at the next loop boundary inside `run()`,
    /// never mid-step.
    pub fn pause(&self) -> Result<()> {
        let mut guard = self.state.acquire();
        if guard.status == ConversationExecutionStatus::Running {
            guard.status = ConversationExecutionStatus::Paused;
            drop(guard);
            TraceEvent::StatusTransition {
                conversation_id: self.id.clone(),
                from: ConversationExecutionStatus::Running.to_string(),
                to: ConversationExecutionStatus::Paused.to_string(),
            }
            .emit();
        }
        Ok(())
    }

    /// Resolve every pending (confirmed-but-not-yet-executed) action as
    /// rejected, and return the conversation to `Running` so the next
    /// LLM turn sees why its actions didn't run.
    pub fn reject_pending_actions(&self, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        let mut guard = self.state.acquire();
        let events = guard.events.to_vec()?;
        let pending: Vec<(String, String, crate::event::EventId)> = get_unmatched_actions(&events)
            .into_iter()
            .filter_map(|rec| match &rec.event {
                Event::Action { tool_name, tool_call_id, action_payload: Some(_), .. } => {
                    find_action_by_call_id(&events, tool_call_id)
                        .map(|(action_id, _)| (tool_name.clone(), tool_call_id.clone(), action_id.clone()))
                }
                _ => None,
            })
            .collect();

        for (tool_name, tool_call_id, action_id) in pending {
            let record = EventRecord::new(
                Source::User,
                Event::UserRejectObservation { tool_name, tool_call_id, action_id, reason: reason.clone() },
            );
            guard.events.append(record.clone())?;
            drop(guard);
            self.notify(&record);
            guard = self.state.acquire();
        }
        guard.status = ConversationExecutionStatus::Running;
        Ok(())
    }

    pub fn set_confirmation_policy(&self, policy: Box<dyn ConfirmationPolicy>) {
        self.state.acquire().confirmation_policy = policy;
    }

    pub fn update_secret(&self, name: impl Into<String>, source: Box<dyn SecretSource>) {
        self.state.acquire().secrets.update(name, source);
    }

    /// Releases resources the conversation holds (tool executors, open
    /// handles) and flushes `base_state.json` if this conversation was
    /// opened with [`Conversation::open_persistent`]. Idempotent; this
    /// crate's tools hold no unmanaged resources of their own, so the
    /// persistence flush is the only real work.
    pub fn close(&self) {
        if let Err(e) = self.save_base_state() {
            tracing::error!(conversation_id = %self.id, error = %e, "failed to save base state on close");
        }
        TraceEvent::ConversationClosed { conversation_id: self.id.clone() }.emit();
    }

    /// A short title derived from the first user message, for display
    /// purposes only. With `llm` supplied, asks it for a real
    /// summarizing title and falls back to a plain truncation if the
    /// call fails or comes back empty; without one, truncates directly.
    /// Either way the result is never fed back into the conversation.
    pub async fn generate_title(&self, llm: Option<&dyn LlmClient>, max_length: usize) -> Option<String> {
        let events = self.state.acquire().events.to_vec().ok()?;
        let first_user = events.iter().find(|e| e.event.is_user_message())?;
        let Event::Message { content, .. } = &first_user.event else { return None };
        let text = content.join(" ");

        if let Some(llm) = llm {
            let prompt = format!(
                "Summarize the following user message as a short title of at most {max_length} characters. Reply with only the title, no surrounding quotes.\n\n{text}"
            );
            if let Ok(response) = llm.complete(&[ac_domain::tool::Message::user(prompt)], &[]).await {
                if let Some(title) = response.message.content.first().map(|t| t.trim()).filter(|t| !t.is_empty()) {
                    return Some(truncate_title(title, max_length));
                }
            }
        }

        Some(truncate_title(&text, max_length))
    }

    /// A stateless side channel to the same LLM and tool schema, that
    /// never touches the event log — for one-off questions (e.g. "is
    /// this diff safe to merge?") asked outside the conversation's own
    /// turn-taking.
    pub async fn ask_agent(&self, question: impl Into<String>) -> Result<String> {
        use ac_domain::tool::Message;
        let messages = vec![Message::system(self.agent.system_prompt.clone()), Message::user(question.into())];
        let response = self.agent.llm.complete(&messages, &[]).await?;
        Ok(response.message.content.join("\n"))
    }

    /// Manually trigger condensation regardless of the condenser's own
    /// threshold, appending a `Condensation` event if there's anything
    /// worth summarizing.
    pub async fn condense(&self) -> Result<()> {
        let events = self.state.acquire().events.to_vec()?;
        if let CondenseResult::Condensation(outcome) = self.condenser.condense(&events) {
            let mut guard = self.state.acquire();
            let record = EventRecord::new(
                Source::Agent,
                Event::Condensation { summary: outcome.summary, dropped_ids: outcome.dropped_ids },
            );
            guard.events.append(record.clone())?;
            drop(guard);
            self.notify(&record);
        }
        Ok(())
    }
}
