use chrono::{DateTime, Utc};
use relayscope_types::Event;

use crate::error::Result;
use crate::events;
use crate::types::{ResponseFacts, SessionInputs};

/// Parses one upstream vendor's request/response wire format and emits the
/// normalized event stream for it. Implementations hold no session state
/// of their own except where a vendor's wire protocol requires it (the
/// OpenAI Responses adapter's `previous_response_id` chain).
pub trait ProviderAdapter: Send + Sync {
    /// Stable provider identifier, e.g. "openai", "openai_responses", "anthropic".
    fn name(&self) -> &'static str;

    /// Whether this adapter recognizes the request, by upstream path and
    /// (if the path alone is ambiguous) the body shape.
    fn can_handle(&self, path: &str, body: &serde_json::Value) -> bool;

    fn parse_request(&self, body: &serde_json::Value) -> Result<SessionInputs>;

    fn parse_response(&self, body: &serde_json::Value) -> Result<ResponseFacts>;

    /// `session.start` (if new) + `tool.result`* + `llm.call.start`. The
    /// default implementation is vendor-agnostic; adapters do not need to
    /// override it.
    fn events_for_request(
        &self,
        session_id: &str,
        is_new: bool,
        span_seq: u64,
        inputs: &SessionInputs,
        now: DateTime<Utc>,
    ) -> Vec<Event> {
        events::events_for_request(session_id, is_new, span_seq, inputs, now)
    }

    /// `llm.call.finish` | `llm.call.error` + `tool.execution`* for each
    /// tool-use block the assistant requested.
    fn events_for_response(
        &self,
        session_id: &str,
        span_seq: u64,
        facts: &ResponseFacts,
        duration_ms: u64,
        upstream_status: Option<u16>,
        now: DateTime<Utc>,
    ) -> Vec<Event> {
        events::events_for_response(session_id, span_seq, facts, duration_ms, upstream_status, now)
    }
}
