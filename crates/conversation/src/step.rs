//! `AgentStepEngine`: given conversation state, produces the next
//! batch of events — one LLM call, tool-call parsing, the confirmation
//! gate, execution, and observation.

use ac_domain::tool::{ContentPart, Message, MessageContent, Role};
use ac_domain::trace::TraceEvent;

use crate::agent::Agent;
use crate::condenser::{CondenseResult, Condenser};
use crate::error::{ConversationError, Result};
use crate::event::{Event, EventId, EventRecord, SecurityRisk, Source};
use crate::security::extract_security_risk;
use crate::state::{get_unmatched_actions, ConversationExecutionStatus, ConversationState};
use crate::tool::{coerce_arguments, ConversationHandle};

pub struct AgentStepEngine;

struct BatchAction {
    action_id: EventId,
    tool_call_id: String,
    tool_name: String,
    payload: serde_json::Value,
}

impl AgentStepEngine {
    /// Runs one step. Holds the conversation lock for the whole call —
    /// the LLM call and tool execution are the two suspension points
    /// where the lock stays held per the concurrency model; pause and
    /// friends wait for the lock to be released between steps.
    pub async fn step(
        &self,
        agent: &Agent,
        state: &ConversationState,
        condenser: &dyn Condenser,
        on_event: &mut dyn FnMut(&EventRecord),
    ) -> Result<()> {
        let mut guard = state.acquire();

        if guard.status == ConversationExecutionStatus::Finished {
            return Ok(());
        }

        // 1. Resume a batch parked behind confirmation: actions that
        // already have a payload but no observation yet.
        let pending: Vec<BatchAction> = {
            let events = guard.events.to_vec()?;
            get_unmatched_actions(&events)
                .into_iter()
                .filter_map(|rec| match &rec.event {
                    Event::Action { tool_name, tool_call_id, action_payload: Some(payload), .. } => {
                        Some(BatchAction {
                            action_id: rec.id.clone(),
                            tool_call_id: tool_call_id.clone(),
                            tool_name: tool_name.clone(),
                            payload: payload.clone(),
                        })
                    }
                    _ => None,
                })
                .collect()
        };
        if !pending.is_empty() {
            return self.execute_batch(agent, &mut guard, pending, on_event).await;
        }

        // 2. Condenser view before every LLM call.
        let events = guard.events.to_vec()?;
        let view = match condenser.condense(&events) {
            CondenseResult::View(v) => v,
            CondenseResult::Condensation(outcome) => {
                append(&mut guard, Source::Agent, Event::Condensation {
                    summary: outcome.summary,
                    dropped_ids: outcome.dropped_ids,
                }, on_event)?;
                return Ok(());
            }
        };

        // 3. Call the LLM. `security_risk` is always in the schema
        // regardless of whether an analyzer is configured, to keep the
        // schema stable across analyzer changes.
        let messages = to_llm_messages(&view.events, &agent.system_prompt);
        let tools = agent.tools.to_tool_definitions();
        let response = match agent.llm.complete(&messages, &tools).await {
            Ok(r) => r,
            Err(ConversationError::FunctionCallValidationError(msg)) => {
                append(&mut guard, Source::User, Event::Message {
                    role: crate::event::MessageRole::User,
                    content: vec![format!("Your previous tool call was rejected: {msg}")],
                    activated_skills: vec![],
                    sender: Some("system".into()),
                    reasoning_content: None,
                    thinking_blocks: vec![],
                }, on_event)?;
                return Ok(());
            }
            Err(ConversationError::ContextWindowExceeded) => {
                if condenser.handles_condensation_requests() {
                    append(&mut guard, Source::Agent, Event::CondensationRequest, on_event)?;
                    return Ok(());
                }
                return Err(ConversationError::ContextWindowExceeded);
            }
            Err(e) => return Err(e),
        };
        guard.stats.llm_calls += 1;

        // 9. Plain assistant message, no tool calls: finish.
        if response.message.tool_calls.is_empty() {
            append(&mut guard, Source::Agent, Event::Message {
                role: crate::event::MessageRole::Assistant,
                content: response.message.content.clone(),
                activated_skills: vec![],
                sender: None,
                reasoning_content: response.message.reasoning_content.clone(),
                thinking_blocks: response.message.thinking_blocks.clone(),
            }, on_event)?;
            guard.status = ConversationExecutionStatus::Finished;
            return Ok(());
        }

        // 6. One ActionEvent per tool call; only the first carries
        // thought/reasoning/thinking blocks. Malformed calls (unknown
        // tool, or arguments that don't coerce) still get an
        // ActionEvent with a null payload plus a paired AgentError, and
        // a synthetic user message so the model can self-correct on
        // the very next LLM call.
        let mut batch = Vec::new();
        for (i, call) in response.message.tool_calls.iter().enumerate() {
            let first = i == 0;
            let thought = if first { response.message.content.clone() } else { vec![] };
            let reasoning = if first { response.message.reasoning_content.clone() } else { None };
            let thinking = if first { response.message.thinking_blocks.clone() } else { vec![] };

            if !agent.tools.contains(&call.tool_name) {
                append(&mut guard, Source::Agent, Event::Action {
                    tool_name: call.tool_name.clone(),
                    tool_call_id: call.call_id.clone(),
                    llm_response_id: response.id.clone(),
                    action_payload: None,
                    thought,
                    security_risk: SecurityRisk::Unknown,
                    reasoning_content: reasoning,
                    thinking_blocks: thinking,
                }, on_event)?;
                let message = format!("Tool '{}' is not registered", call.tool_name);
                emit_malformed_error(&mut guard, &call.tool_name, &call.call_id, &message, on_event)?;
                continue;
            }

            let parsed_arguments: serde_json::Value = match serde_json::from_str(&call.raw_arguments) {
                Ok(v) => v,
                Err(e) => {
                    append(&mut guard, Source::Agent, Event::Action {
                        tool_name: call.tool_name.clone(),
                        tool_call_id: call.call_id.clone(),
                        llm_response_id: response.id.clone(),
                        action_payload: None,
                        thought,
                        security_risk: SecurityRisk::Unknown,
                        reasoning_content: reasoning,
                        thinking_blocks: thinking,
                    }, on_event)?;
                    let message = format!("tool '{}' arguments were not valid JSON: {e}", call.tool_name);
                    emit_malformed_error(&mut guard, &call.tool_name, &call.call_id, &message, on_event)?;
                    continue;
                }
            };

            let read_only = agent.tools.is_read_only(&call.tool_name);
            let tool = agent.tools.get(&call.tool_name).expect("checked contains above");
            let schema = tool.input_schema();
            let mut arguments = coerce_arguments(&schema, parsed_arguments);

            let Some(args_obj) = arguments.as_object_mut() else {
                append(&mut guard, Source::Agent, Event::Action {
                    tool_name: call.tool_name.clone(),
                    tool_call_id: call.call_id.clone(),
                    llm_response_id: response.id.clone(),
                    action_payload: None,
                    thought,
                    security_risk: SecurityRisk::Unknown,
                    reasoning_content: reasoning,
                    thinking_blocks: thinking,
                }, on_event)?;
                let message = format!(
                    "Error validating args {} for tool '{}': arguments must be a JSON object",
                    arguments, call.tool_name
                );
                emit_malformed_error(&mut guard, &call.tool_name, &call.call_id, &message, on_event)?;
                continue;
            };

            let risk_result = extract_security_risk(
                &call.tool_name,
                read_only,
                agent.security_analyzer.as_deref(),
                args_obj,
            );

            let risk = match risk_result {
                Ok(r) => r,
                Err(message) => {
                    append(&mut guard, Source::Agent, Event::Action {
                        tool_name: call.tool_name.clone(),
                        tool_call_id: call.call_id.clone(),
                        llm_response_id: response.id.clone(),
                        action_payload: None,
                        thought,
                        security_risk: SecurityRisk::Unknown,
                        reasoning_content: reasoning,
                        thinking_blocks: thinking,
                    }, on_event)?;
                    emit_malformed_error(&mut guard, &call.tool_name, &call.call_id, &message, on_event)?;
                    continue;
                }
            };

            let action_id = append(&mut guard, Source::Agent, Event::Action {
                tool_name: call.tool_name.clone(),
                tool_call_id: call.call_id.clone(),
                llm_response_id: response.id.clone(),
                action_payload: Some(arguments.clone()),
                thought,
                security_risk: risk,
                reasoning_content: reasoning,
                thinking_blocks: thinking,
            }, on_event)?;

            batch.push(BatchAction {
                action_id,
                tool_call_id: call.call_id.clone(),
                tool_name: call.tool_name.clone(),
                payload: arguments,
            });
        }

        if batch.is_empty() {
            // Every call was malformed; the synthetic user messages
            // already appended give the model something to correct on
            // the next turn.
            return Ok(());
        }

        // 7. Confirmation gate. A lone finish or lone think action is
        // exempt regardless of policy.
        let exempt = batch.len() == 1 && matches!(batch[0].tool_name.as_str(), "finish" | "think");
        if !exempt {
            let risks = collect_risks(&guard, &batch)?;
            if guard.confirmation_policy.should_confirm_batch(&risks) {
                guard.status = ConversationExecutionStatus::WaitingForConfirmation;
                return Ok(());
            }
        }

        self.execute_batch(agent, &mut guard, batch, on_event).await
    }

    async fn execute_batch(
        &self,
        agent: &Agent,
        guard: &mut crate::state::StateGuard<'_>,
        batch: Vec<BatchAction>,
        on_event: &mut dyn FnMut(&EventRecord),
    ) -> Result<()> {
        for action in batch {
            let conversation_id = guard.id.clone();
            let tool = agent.tools.get(&action.tool_name).ok_or_else(|| {
                ConversationError::ToolNotFound(action.tool_name.clone())
            })?;
            let handle = ConversationHandle { conversation_id: &conversation_id, secrets: &guard.secrets };
            let started = std::time::Instant::now();
            let outcome = tool.execute(action.payload.clone(), handle).await;
            guard.stats.tool_calls += 1;

            let (payload, is_error) = match outcome {
                Ok(value) => (value, false),
                Err(message) => (serde_json::json!({"error": message}), true),
            };

            TraceEvent::ToolInvoked {
                tool_name: action.tool_name.clone(),
                tool_call_id: action.tool_call_id.clone(),
                duration_ms: started.elapsed().as_millis() as u64,
                is_error,
            }
            .emit();

            append(guard, Source::Environment, Event::Observation {
                tool_name: action.tool_name.clone(),
                tool_call_id: action.tool_call_id.clone(),
                action_id: action.action_id.clone(),
                observation_payload: payload,
                is_error,
            }, on_event)?;

            if action.tool_name == "finish" && !is_error {
                guard.status = ConversationExecutionStatus::Finished;
            }
        }
        Ok(())
    }
}

fn collect_risks(guard: &crate::state::StateGuard<'_>, batch: &[BatchAction]) -> Result<Vec<SecurityRisk>> {
    let events = guard.events.to_vec()?;
    let mut risks = Vec::with_capacity(batch.len());
    for action in batch {
        let risk = events
            .iter()
            .rev()
            .find_map(|rec| match &rec.event {
                Event::Action { tool_call_id, security_risk, .. } if tool_call_id == &action.tool_call_id => {
                    Some(*security_risk)
                }
                _ => None,
            })
            .unwrap_or(SecurityRisk::Unknown);
        risks.push(risk);
    }
    Ok(risks)
}

fn emit_malformed_error(
    guard: &mut crate::state::StateGuard<'_>,
    tool_name: &str,
    tool_call_id: &str,
    message: &str,
    on_event: &mut dyn FnMut(&EventRecord),
) -> Result<()> {
    append(guard, Source::Agent, Event::AgentError {
        error: message.to_string(),
        tool_name: Some(tool_name.to_string()),
        tool_call_id: Some(tool_call_id.to_string()),
    }, on_event)?;
    append(guard, Source::User, Event::Message {
        role: crate::event::MessageRole::User,
        content: vec![message.to_string()],
        activated_skills: vec![],
        sender: Some("system".into()),
        reasoning_content: None,
        thinking_blocks: vec![],
    }, on_event)?;
    Ok(())
}

fn append(
    guard: &mut crate::state::StateGuard<'_>,
    source: Source,
    event: Event,
    on_event: &mut dyn FnMut(&EventRecord),
) -> Result<EventId> {
    let record = EventRecord::new(source, event);
    let id = record.id.clone();
    on_event(&record);
    guard.events.append(record)?;
    Ok(id)
}

fn to_llm_messages(events: &[EventRecord], system_prompt: &str) -> Vec<Message> {
    let mut messages = vec![Message::system(system_prompt)];
    for rec in events {
        match &rec.event {
            Event::SystemPrompt { .. } => {}
            Event::Message { content, .. } => {
                let text = content.join("\n");
                let msg = match rec.source {
                    Source::User => Message::user(text),
                    Source::Agent => Message::assistant(text),
                    Source::Environment => Message::system(text),
                };
                messages.push(msg);
            }
            Event::Action { tool_name, tool_call_id, action_payload, .. } => {
                messages.push(Message {
                    role: Role::Assistant,
                    content: MessageContent::Parts(vec![ContentPart::ToolUse {
                        id: tool_call_id.clone(),
                        name: tool_name.clone(),
                        input: action_payload.clone().unwrap_or(serde_json::Value::Null),
                    }]),
                });
            }
            Event::Observation { tool_call_id, observation_payload, is_error, .. } => {
                messages.push(Message {
                    role: Role::Tool,
                    content: MessageContent::Parts(vec![ContentPart::ToolResult {
                        tool_use_id: tool_call_id.clone(),
                        content: observation_payload.to_string(),
                        is_error: *is_error,
                    }]),
                });
            }
            Event::AgentError { .. } | Event::UserRejectObservation { .. } => {}
            Event::Condensation { summary, .. } => messages.push(Message::system(summary.clone())),
            Event::CondensationRequest
            | Event::Pause
            | Event::ConversationError { .. }
            | Event::Token { .. }
            | Event::ConversationStateUpdate { .. } => {}
        }
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use crate::confirmation::{AlwaysConfirm, NeverConfirm};
    use crate::condenser::NoOpCondenser;
    use crate::event_log::{EventLog, MemoryFileStore};
    use crate::llm::{LlmResponse, LlmResponseMessage, LlmToolCallResponse, ScriptedLlmClient};
    use crate::secrets::SecretsRegistry;
    use crate::state::{ConversationStats, StateInner};
    use crate::tool::{ConversationHandle, Tool, ToolAnnotations, ToolRegistry};
    use std::sync::Arc;

    struct EchoTool;

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes text back"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }
        fn annotations(&self) -> ToolAnnotations {
            ToolAnnotations { read_only_hint: true }
        }
        async fn execute(&self, action: serde_json::Value, _conv: ConversationHandle<'_>) -> std::result::Result<serde_json::Value, String> {
            Ok(action.get("text").cloned().unwrap_or(serde_json::Value::Null))
        }
    }

    fn new_state(policy: impl crate::confirmation::ConfirmationPolicy + 'static) -> ConversationState {
        let events = EventLog::open(Box::new(MemoryFileStore::default()), "events").unwrap();
        ConversationState::new(StateInner {
            id: "c1".into(),
            events,
            status: ConversationExecutionStatus::Running,
            confirmation_policy: Box::new(policy),
            security_analyzer: None,
            activated_knowledge_skills: vec![],
            stats: ConversationStats::default(),
            secrets: SecretsRegistry::default(),
            persistence_dir: None,
            agent_snapshot: serde_json::json!({}),
        })
    }

    fn tool_call_response(id: &str, name: &str, args: serde_json::Value) -> LlmResponse {
        tool_call_response_raw(id, name, args.to_string())
    }

    fn tool_call_response_raw(id: &str, name: &str, raw_arguments: String) -> LlmResponse {
        LlmResponse {
            message: LlmResponseMessage {
                content: vec!["I'll call the tool".into()],
                tool_calls: vec![LlmToolCallResponse { call_id: id.into(), tool_name: name.into(), raw_arguments }],
                reasoning_content: None,
                thinking_blocks: vec![],
            },
            id: "resp-1".into(),
            prompt_token_ids: vec![],
            response_token_ids: vec![],
        }
    }

    fn final_message_response(text: &str) -> LlmResponse {
        LlmResponse {
            message: LlmResponseMessage { content: vec![text.into()], tool_calls: vec![], reasoning_content: None, thinking_blocks: vec![] },
            id: "resp-2".into(),
            prompt_token_ids: vec![],
            response_token_ids: vec![],
        }
    }

    #[tokio::test]
    async fn happy_path_single_tool_call_reaches_finished() {
        let mut registry = ToolRegistry::default();
        registry.register(Arc::new(EchoTool));
        let llm = ScriptedLlmClient::new(vec![
            Ok(tool_call_response("call-1", "echo", serde_json::json!({"text": "hi"}))),
            Ok(final_message_response("done")),
        ]);
        let agent = Agent::new(Arc::new(llm), registry, "be helpful");
        let state = new_state(NeverConfirm);

        let mut events = Vec::new();
        let mut on_event = |rec: &EventRecord| events.push(rec.clone());
        let engine = AgentStepEngine;

        engine.step(&agent, &state, &NoOpCondenser, &mut on_event).await.unwrap();
        assert!(events.iter().any(|e| matches!(e.event, Event::Action { .. })));
        assert!(events.iter().any(|e| matches!(e.event, Event::Observation { .. })));

        engine.step(&agent, &state, &NoOpCondenser, &mut on_event).await.unwrap();
        let guard = state.acquire();
        assert_eq!(guard.status, ConversationExecutionStatus::Finished);
    }

    #[tokio::test]
    async fn unknown_tool_records_null_action_and_paired_error() {
        let registry = ToolRegistry::default();
        let llm = ScriptedLlmClient::new(vec![Ok(tool_call_response("call-1", "does_not_exist", serde_json::json!({})))]);
        let agent = Agent::new(Arc::new(llm), registry, "be helpful");
        let state = new_state(NeverConfirm);

        let mut events = Vec::new();
        let mut on_event = |rec: &EventRecord| events.push(rec.clone());
        AgentStepEngine.step(&agent, &state, &NoOpCondenser, &mut on_event).await.unwrap();

        let action = events.iter().find(|e| matches!(e.event, Event::Action { .. })).unwrap();
        match &action.event {
            Event::Action { action_payload, .. } => assert!(action_payload.is_none()),
            _ => unreachable!(),
        }
        assert!(events.iter().any(|e| matches!(e.event, Event::AgentError { .. })));
        assert!(events.iter().any(|e| e.event.is_user_message()));
    }

    #[tokio::test]
    async fn malformed_json_arguments_records_null_action_and_paired_error() {
        let mut registry = ToolRegistry::default();
        registry.register(Arc::new(EchoTool));
        let llm = ScriptedLlmClient::new(vec![Ok(tool_call_response_raw("call-1", "echo", "{not json".into()))]);
        let agent = Agent::new(Arc::new(llm), registry, "be helpful");
        let state = new_state(NeverConfirm);

        let mut events = Vec::new();
        let mut on_event = |rec: &EventRecord| events.push(rec.clone());
        AgentStepEngine.step(&agent, &state, &NoOpCondenser, &mut on_event).await.unwrap();

        let action = events.iter().find(|e| matches!(e.event, Event::Action { .. })).unwrap();
        match &action.event {
            Event::Action { action_payload, .. } => assert!(action_payload.is_none()),
            _ => unreachable!(),
        }
        let error = events.iter().find_map(|e| match &e.event {
            Event::AgentError { error, .. } => Some(error.clone()),
            _ => None,
        });
        assert!(error.unwrap().contains("not valid JSON"));
        assert!(events.iter().any(|e| e.event.is_user_message()));
    }

    #[tokio::test]
    async fn confirmation_gate_parks_batch_without_executing() {
        let mut registry = ToolRegistry::default();
        registry.register(Arc::new(EchoTool));
        let llm = ScriptedLlmClient::new(vec![Ok(tool_call_response("call-1", "echo", serde_json::json!({"text": "hi"})))]);
        let agent = Agent::new(Arc::new(llm), registry, "be helpful");
        let state = new_state(AlwaysConfirm);

        let mut events = Vec::new();
        let mut on_event = |rec: &EventRecord| events.push(rec.clone());
        AgentStepEngine.step(&agent, &state, &NoOpCondenser, &mut on_event).await.unwrap();

        assert!(events.iter().any(|e| matches!(e.event, Event::Action { .. })));
        assert!(!events.iter().any(|e| matches!(e.event, Event::Observation { .. })));
        let guard = state.acquire();
        assert_eq!(guard.status, ConversationExecutionStatus::WaitingForConfirmation);
    }
}
