//! `Agent`: the bundle of an LLM client, a tool registry, a system
//! prompt, and an optional security analyzer that the step engine
//! drives. Kept deliberately thin — the interesting behavior lives in
//! [`crate::step`].

use std::sync::Arc;

use crate::event::{Event, EventRecord, Source};
use crate::event_log::EventLog;
use crate::llm::LlmClient;
use crate::security::SecurityAnalyzer;
use crate::tool::ToolRegistry;

pub struct Agent {
    pub llm: Arc<dyn LlmClient>,
    pub tools: ToolRegistry,
    pub system_prompt: String,
    pub security_analyzer: Option<Arc<dyn SecurityAnalyzer>>,
}

impl Agent {
    pub fn new(llm: Arc<dyn LlmClient>, tools: ToolRegistry, system_prompt: impl Into<String>) -> Self {
        Self { llm, tools, system_prompt: system_prompt.into(), security_analyzer: None }
    }

    pub fn with_security_analyzer(mut self, analyzer: Arc<dyn SecurityAnalyzer>) -> Self {
        self.security_analyzer = Some(analyzer);
        self
    }

    /// A reconciliation snapshot: just enough to detect a mismatch
    /// between the agent that created a persisted conversation and the
    /// one resuming it, without round-tripping secret-bearing fields.
    pub fn snapshot(&self) -> serde_json::Value {
        let mut tool_names: Vec<String> =
            self.tools.to_tool_definitions().into_iter().map(|d| d.name).collect();
        tool_names.sort();
        let mut snapshot = serde_json::json!({
            "system_prompt": self.system_prompt,
            "tool_names": tool_names,
            "has_security_analyzer": self.security_analyzer.is_some(),
        });
        let llm = self.llm.config_snapshot();
        if !llm.is_null() {
            snapshot["llm"] = llm;
        }
        snapshot
    }

    /// Emit the `SystemPromptEvent` exactly once: only when the log has
    /// no convertible messages yet (i.e. brand new conversations), not
    /// on every resume.
    pub fn init_state(&self, events: &mut EventLog) -> crate::error::Result<()> {
        if events.len() > 0 {
            return Ok(());
        }
        let tool_schemas = self
            .tools
            .to_tool_definitions()
            .into_iter()
            .map(|d| serde_json::to_value(d).unwrap_or(serde_json::Value::Null))
            .collect();
        let record = EventRecord::new(
            Source::Agent,
            Event::SystemPrompt { prompt_text: self.system_prompt.clone(), tool_schemas },
        );
        events.append(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::{EventLog, MemoryFileStore};
    use crate::llm::ScriptedLlmClient;

    fn agent() -> Agent {
        Agent::new(Arc::new(ScriptedLlmClient::new(vec![])), ToolRegistry::default(), "be helpful")
    }

    #[test]
    fn init_state_emits_system_prompt_once() {
        let mut events = EventLog::open(Box::new(MemoryFileStore::default()), "events").unwrap();
        let agent = agent();
        agent.init_state(&mut events).unwrap();
        assert_eq!(events.len(), 1);
        // Resuming (non-empty log) must not append a second one.
        agent.init_state(&mut events).unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn snapshot_captures_tool_names_and_analyzer_presence() {
        let snap = agent().snapshot();
        assert_eq!(snap["has_security_analyzer"], serde_json::json!(false));
    }
}
