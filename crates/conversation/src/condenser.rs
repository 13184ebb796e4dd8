//! `Condenser`: transforms long event histories into a shorter
//! logically-equivalent view fed to the LLM, or requests a
//! condensation be recorded.

use crate::event::{Event, EventId, EventRecord};

/// A possibly-shortened but logically equivalent event sequence.
pub struct View {
    pub events: Vec<EventRecord>,
}

/// The condenser decided enough has accumulated to summarize a prefix;
/// the caller is responsible for emitting this as an event and
/// returning from the current step without calling the LLM.
pub struct CondensationOutcome {
    pub summary: String,
    pub dropped_ids: Vec<EventId>,
}

pub enum CondenseResult {
    View(View),
    Condensation(CondensationOutcome),
}

pub trait Condenser: Send + Sync {
    fn condense(&self, events: &[EventRecord]) -> CondenseResult;

    /// Whether this condenser can react to a `CondensationRequest`
    /// raised by a context-window-exceeded error from the LLM client.
    fn handles_condensation_requests(&self) -> bool;
}

/// Never condenses; always returns the full history unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpCondenser;

impl Condenser for NoOpCondenser {
    fn condense(&self, events: &[EventRecord]) -> CondenseResult {
        CondenseResult::View(View { events: events.to_vec() })
    }

    fn handles_condensation_requests(&self) -> bool {
        false
    }
}

/// Keeps the first `keep_first` events (typically the system prompt and
/// the first user message) and the last `keep_last` events verbatim;
/// once the history grows past both windows it summarizes the dropped
/// middle into a single `Condensation`.
///
/// Counts events backward from the end of the in-memory event slice
/// rather than turns backward from the end of a flat text log, since
/// this engine keeps structured events rather than a line-oriented
/// transcript.
pub struct RecentEventsCondenser {
    pub keep_first: usize,
    pub keep_last: usize,
    pub trigger_len: usize,
}

impl Default for RecentEventsCondenser {
    fn default() -> Self {
        Self { keep_first: 1, keep_last: 20, trigger_len: 40 }
    }
}

impl Condenser for RecentEventsCondenser {
    fn condense(&self, events: &[EventRecord]) -> CondenseResult {
        if events.len() <= self.trigger_len {
            return CondenseResult::View(View { events: events.to_vec() });
        }

        // Never re-condense a history that already ends in a
        // condensation marker with nothing new past it.
        if let Some(last) = events.last() {
            if last.event.is_condensation() {
                return CondenseResult::View(View { events: events.to_vec() });
            }
        }

        let keep_first = self.keep_first.min(events.len());
        let keep_last = self.keep_last.min(events.len().saturating_sub(keep_first));
        let dropped_start = keep_first;
        let dropped_end = events.len() - keep_last;

        if dropped_start >= dropped_end {
            return CondenseResult::View(View { events: events.to_vec() });
        }

        let dropped = &events[dropped_start..dropped_end];
        let dropped_ids = dropped.iter().map(|e| e.id.clone()).collect();
        let summary = summarize(dropped);

        CondenseResult::Condensation(CondensationOutcome { summary, dropped_ids })
    }

    fn handles_condensation_requests(&self) -> bool {
        true
    }
}

fn summarize(events: &[EventRecord]) -> String {
    let mut lines = Vec::new();
    for rec in events {
        match &rec.event {
            Event::Message { content, .. } => lines.push(content.join(" ")),
            Event::Action { tool_name, .. } => lines.push(format!("called {tool_name}")),
            Event::Observation { tool_name, .. } => lines.push(format!("{tool_name} returned a result")),
            _ => {}
        }
    }
    format!("Summary of {} earlier events: {}", events.len(), lines.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{MessageRole, Source};

    fn msg(i: usize) -> EventRecord {
        EventRecord::new(
            Source::User,
            Event::Message {
                role: MessageRole::User,
                content: vec![format!("message {i}")],
                activated_skills: vec![],
                sender: None,
                reasoning_content: None,
                thinking_blocks: vec![],
            },
        )
    }

    #[test]
    fn noop_condenser_returns_full_view() {
        let events: Vec<_> = (0..100).map(msg).collect();
        match NoOpCondenser.condense(&events) {
            CondenseResult::View(v) => assert_eq!(v.events.len(), 100),
            _ => panic!("expected a view"),
        }
    }

    #[test]
    fn recent_events_condenser_passes_through_below_threshold() {
        let events: Vec<_> = (0..10).map(msg).collect();
        let condenser = RecentEventsCondenser::default();
        match condenser.condense(&events) {
            CondenseResult::View(v) => assert_eq!(v.events.len(), 10),
            _ => panic!("expected a view below threshold"),
        }
    }

    #[test]
    fn recent_events_condenser_drops_middle_above_threshold() {
        let events: Vec<_> = (0..50).map(msg).collect();
        let condenser = RecentEventsCondenser { keep_first: 1, keep_last: 10, trigger_len: 40 };
        match condenser.condense(&events) {
            CondenseResult::Condensation(outcome) => {
                assert_eq!(outcome.dropped_ids.len(), 50 - 1 - 10);
            }
            _ => panic!("expected a condensation"),
        }
    }
}
