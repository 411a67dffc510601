use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::behavioral::SessionFeatures;
use crate::event::{Event, EventName, Level};

/// Running totals maintained incrementally as events arrive; these survive
/// reactivation (unlike the signature and features, which are cleared).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionCounters {
    pub events: u64,
    pub messages: u64,
    pub tool_uses: u64,
    pub errors: u64,
    pub tokens_input: u64,
    pub tokens_output: u64,
    pub cumulative_response_ms: u64,
}

/// One logical conversation, reconstructed from a sequence of otherwise
/// unrelated stateless upstream calls. Mutable while active, frozen (its
/// signature and features are computed once) on completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub system_prompt_id: Option<String>,
    pub agent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub is_active: bool,
    pub is_completed: bool,
    pub counters: SessionCounters,
    pub tool_usage: HashMap<String, u64>,
    pub available_tools: HashSet<String>,
    pub events: VecDeque<Event>,
    pub max_events: usize,
    pub signature: Option<Vec<u64>>,
    pub features: Option<SessionFeatures>,
    pub last_analysis_session_id: Option<String>,
}

fn u64_attr(event: &Event, key: &str) -> Option<u64> {
    event.attributes.get(key).and_then(|v| v.as_u64())
}

impl Session {
    pub fn new(session_id: impl Into<String>, now: DateTime<Utc>, max_events: usize) -> Self {
        Self {
            session_id: session_id.into(),
            system_prompt_id: None,
            agent_id: None,
            created_at: now,
            last_activity: now,
            is_active: true,
            is_completed: false,
            counters: SessionCounters::default(),
            tool_usage: HashMap::new(),
            available_tools: HashSet::new(),
            events: VecDeque::new(),
            max_events,
            signature: None,
            features: None,
            last_analysis_session_id: None,
        }
    }

    /// Apply a newly-arrived event. If the session was completed, it is
    /// reactivated first so the signature and features never survive past
    /// an aggregate update that postdates them.
    pub fn record_event(&mut self, event: Event) {
        if self.is_completed {
            self.reactivate();
        }
        self.is_active = true;
        self.last_activity = event.timestamp;
        self.counters.events += 1;
        if event.level == Level::Error {
            self.counters.errors += 1;
        }
        match event.name {
            EventName::LlmCallStart => {
                if let Some(count) = u64_attr(&event, "message_count") {
                    self.counters.messages = self.counters.messages.max(count);
                }
            }
            EventName::LlmCallFinish | EventName::LlmCallError => {
                if let Some(tokens) = u64_attr(&event, "tokens_input") {
                    self.counters.tokens_input += tokens;
                }
                if let Some(tokens) = u64_attr(&event, "tokens_output") {
                    self.counters.tokens_output += tokens;
                }
                if let Some(ms) = u64_attr(&event, "duration_ms") {
                    self.counters.cumulative_response_ms += ms;
                }
            }
            _ => {}
        }
        self.events.push_back(event);
        while self.events.len() > self.max_events {
            self.events.pop_front();
        }
    }

    /// Record a tool invocation against the running counters and usage map.
    pub fn record_tool_use(&mut self, tool_name: impl Into<String>) {
        self.counters.tool_uses += 1;
        *self.tool_usage.entry(tool_name.into()).or_insert(0) += 1;
    }

    /// Clear the frozen behavioral state. Counters, tool usage and the
    /// event ring buffer are untouched by reactivation.
    pub fn reactivate(&mut self) {
        self.is_completed = false;
        self.signature = None;
        self.features = None;
    }

    /// Mark the session completed and freeze its behavioral signature and
    /// features. Never call this on a session that may still receive
    /// events without calling `reactivate` first.
    pub fn complete(&mut self, signature: Vec<u64>, features: SessionFeatures) {
        self.is_active = false;
        self.is_completed = true;
        self.signature = Some(signature);
        self.features = Some(features);
    }

    /// `is_completed ⇒ ¬is_active`, checked explicitly at state boundaries
    /// rather than relied upon implicitly.
    pub fn upholds_completion_invariant(&self) -> bool {
        !self.is_completed || !self.is_active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavioral::SessionFeatures;
    use crate::event::{EventName, Level};

    fn event(session_id: &str, seq: u64, at: DateTime<Utc>) -> Event {
        Event::new(EventName::LlmCallStart, session_id, seq, at).with_level(Level::Info)
    }

    #[test]
    fn new_session_is_active_and_not_completed() {
        let now = Utc::now();
        let session = Session::new("s1", now, 10_000);
        assert!(session.is_active);
        assert!(!session.is_completed);
        assert!(session.upholds_completion_invariant());
    }

    #[test]
    fn completing_then_reactivating_clears_signature_and_features() {
        let now = Utc::now();
        let mut session = Session::new("s1", now, 10_000);
        session.complete(vec![1, 2, 3], SessionFeatures::default());
        assert!(session.is_completed);
        assert!(!session.is_active);
        assert!(session.signature.is_some());
        assert!(session.features.is_some());

        session.record_event(event("s1", 0, now));
        assert!(!session.is_completed);
        assert!(session.is_active);
        assert!(session.signature.is_none());
        assert!(session.features.is_none());
    }

    #[test]
    fn counters_survive_reactivation() {
        let now = Utc::now();
        let mut session = Session::new("s1", now, 10_000);
        session.record_event(event("s1", 0, now));
        session.record_tool_use("Bash");
        session.complete(vec![1], SessionFeatures::default());
        session.record_event(event("s1", 1, now));
        assert_eq!(session.counters.events, 2);
        assert_eq!(session.tool_usage.get("Bash"), Some(&1));
    }

    #[test]
    fn finish_events_fold_tokens_duration_and_errors_into_counters() {
        use serde_json::json;

        let now = Utc::now();
        let mut session = Session::new("s1", now, 10_000);

        let mut start = Event::new(EventName::LlmCallStart, "s1", 0, now);
        start = start.with_attribute("message_count", json!(3));
        session.record_event(start);

        let mut finish = Event::new(EventName::LlmCallFinish, "s1", 0, now);
        finish = finish
            .with_attribute("tokens_input", json!(100))
            .with_attribute("tokens_output", json!(40))
            .with_attribute("duration_ms", json!(250));
        session.record_event(finish);

        let error = Event::new(EventName::LlmCallError, "s1", 1, now).with_level(Level::Error);
        session.record_event(error);

        assert_eq!(session.counters.messages, 3);
        assert_eq!(session.counters.tokens_input, 100);
        assert_eq!(session.counters.tokens_output, 40);
        assert_eq!(session.counters.cumulative_response_ms, 250);
        assert_eq!(session.counters.errors, 1);
    }

    #[test]
    fn ring_buffer_is_bounded() {
        let now = Utc::now();
        let mut session = Session::new("s1", now, 2);
        for i in 0..5u64 {
            session.record_event(event("s1", i, now));
        }
        assert_eq!(session.events.len(), 2);
    }
}
