use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The kind of hook that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    SessionStart,
    LlmCallStart,
    LlmCallFinish,
    LlmCallError,
    ToolExecution,
    ToolResult,
}

/// Severity of an event, independent of its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Info,
    Warn,
    Error,
}

/// An immutable record produced once at a proxy hook.
///
/// `trace_id` ties every event of one session together; `span_id` ties the
/// start/finish (or start/error) pair of one upstream call together. Both
/// are deterministic hex derivations of `session_id` so that re-deriving
/// them from a replayed session never produces a different identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub name: EventName,
    pub session_id: String,
    pub trace_id: String,
    pub span_id: String,
    pub agent_id: Option<String>,
    pub system_prompt_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl Event {
    pub fn new(
        name: EventName,
        session_id: impl Into<String>,
        span_seq: u64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let session_id = session_id.into();
        let trace_id = trace_id_for(&session_id);
        let span_id = span_id_for(&session_id, span_seq);
        Self {
            name,
            trace_id,
            span_id,
            session_id,
            agent_id: None,
            system_prompt_id: None,
            timestamp,
            level: Level::Info,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_agent(mut self, agent_id: Option<String>, system_prompt_id: Option<String>) -> Self {
        self.agent_id = agent_id;
        self.system_prompt_id = system_prompt_id;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// Derive a 32-hex-character trace id from a session id. One trace per
/// session, so this is a pure function of `session_id` alone.
pub fn trace_id_for(session_id: &str) -> String {
    derive_hex(&[b"trace:", session_id.as_bytes()])
}

/// Derive a 32-hex-character span id from a session id and a call sequence
/// number. The same `(session_id, span_seq)` pair always yields the same
/// span id, so `llm.call.start` and the matching `llm.call.finish`/`.error`
/// for one upstream call share a span even though they are emitted from
/// separate hooks.
pub fn span_id_for(session_id: &str, span_seq: u64) -> String {
    derive_hex(&[b"span:", session_id.as_bytes(), b":", span_seq.to_string().as_bytes()])
}

fn derive_hex(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let digest = hasher.finalize();
    format!("{:x}", digest)[..32].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_id_is_32_hex_chars() {
        let id = trace_id_for("session-abc");
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn trace_id_is_deterministic() {
        assert_eq!(trace_id_for("session-abc"), trace_id_for("session-abc"));
        assert_ne!(trace_id_for("session-abc"), trace_id_for("session-def"));
    }

    #[test]
    fn span_id_varies_by_sequence_but_not_by_rederivation() {
        let s1 = span_id_for("session-abc", 0);
        let s2 = span_id_for("session-abc", 1);
        assert_ne!(s1, s2);
        assert_eq!(s1, span_id_for("session-abc", 0));
    }

    #[test]
    fn new_event_carries_matching_trace_and_span() {
        let now = Utc::now();
        let event = Event::new(EventName::LlmCallStart, "session-abc", 3, now);
        assert_eq!(event.trace_id, trace_id_for("session-abc"));
        assert_eq!(event.span_id, span_id_for("session-abc", 3));
        assert_eq!(event.level, Level::Info);
    }
}
