use chrono::{DateTime, Utc};
use relayscope_types::{Event, EventName, Level};
use serde_json::json;

use crate::types::{ResponseFacts, SessionInputs};

/// Build the events a provider adapter emits for one inbound request:
/// a `session.start` for brand-new sessions, one `tool.result` per tool
/// result present in the history, and the `llm.call.start` that brackets
/// the upcoming upstream call. Order matters: tool results are emitted
/// before `llm.call.start`.
pub fn events_for_request(
    session_id: &str,
    is_new: bool,
    span_seq: u64,
    inputs: &SessionInputs,
    now: DateTime<Utc>,
) -> Vec<Event> {
    let mut events = Vec::new();

    if is_new {
        events.push(Event::new(EventName::SessionStart, session_id, span_seq, now));
    }

    for result in &inputs.tool_results {
        let mut event = Event::new(EventName::ToolResult, session_id, span_seq, now);
        if let Some(ref call_id) = result.tool_call_id {
            event = event.with_attribute("tool_call_id", json!(call_id));
        }
        event = event.with_attribute("content_prefix", json!(relayscope_types::truncate(&result.content, 200)));
        events.push(event);
    }

    let mut start = Event::new(EventName::LlmCallStart, session_id, span_seq, now);
    if let Some(ref model) = inputs.model {
        start = start.with_attribute("model", json!(model));
    }
    start = start.with_attribute("is_streaming", json!(inputs.is_streaming));
    start = start.with_attribute("message_count", json!(inputs.messages.len()));
    events.push(start);

    events
}

/// Build the events a provider adapter emits once the upstream response is
/// available: `llm.call.finish` (or `llm.call.error` on a non-2xx upstream
/// status) carrying duration and token counts, plus one `tool.execution`
/// event per tool-use block the assistant requested.
pub fn events_for_response(
    session_id: &str,
    span_seq: u64,
    facts: &ResponseFacts,
    duration_ms: u64,
    upstream_status: Option<u16>,
    now: DateTime<Utc>,
) -> Vec<Event> {
    let mut events = Vec::new();

    let is_error = upstream_status.is_some_and(|status| !(200..300).contains(&status));
    let finish_name = if is_error {
        EventName::LlmCallError
    } else {
        EventName::LlmCallFinish
    };
    let level = if is_error { Level::Error } else { Level::Info };

    let mut finish = Event::new(finish_name, session_id, span_seq, now).with_level(level);
    finish = finish.with_attribute("duration_ms", json!(duration_ms));
    if let Some(ref reason) = facts.finish_reason {
        finish = finish.with_attribute("finish_reason", json!(reason));
    }
    if let Some(status) = upstream_status {
        finish = finish.with_attribute("upstream_status", json!(status));
    }
    if let Some(tokens) = facts.input_tokens {
        finish = finish.with_attribute("tokens_input", json!(tokens));
    }
    if let Some(tokens) = facts.output_tokens {
        finish = finish.with_attribute("tokens_output", json!(tokens));
    }
    if let Some(tokens) = facts.total_tokens {
        finish = finish.with_attribute("tokens_total", json!(tokens));
    }
    events.push(finish);

    for tool_use in &facts.tool_uses {
        let mut event = Event::new(EventName::ToolExecution, session_id, span_seq, now);
        event = event.with_attribute("tool_name", json!(tool_use.name));
        if let Some(ref call_id) = tool_use.tool_call_id {
            event = event.with_attribute("tool_call_id", json!(call_id));
        }
        events.push(event);
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Message, MessageRole, ToolResult};

    fn inputs() -> SessionInputs {
        SessionInputs {
            messages: vec![Message {
                role: MessageRole::User,
                text: "hi".into(),
                tool_call_id: None,
                raw: serde_json::Value::Null,
            }],
            system_prompt: None,
            model: Some("gpt-4o".into()),
            is_streaming: false,
            tools: Vec::new(),
            tool_results: vec![ToolResult {
                tool_call_id: Some("call_1".into()),
                content: "Sunny, 75F".into(),
            }],
            continuation_key: None,
        }
    }

    #[test]
    fn new_session_emits_session_start_before_tool_result_before_llm_start() {
        let now = Utc::now();
        let events = events_for_request("s1", true, 0, &inputs(), now);
        let names: Vec<_> = events.iter().map(|e| e.name).collect();
        assert_eq!(
            names,
            vec![EventName::SessionStart, EventName::ToolResult, EventName::LlmCallStart]
        );
    }

    #[test]
    fn continuation_request_skips_session_start() {
        let now = Utc::now();
        let events = events_for_request("s1", false, 1, &inputs(), now);
        let names: Vec<_> = events.iter().map(|e| e.name).collect();
        assert_eq!(names, vec![EventName::ToolResult, EventName::LlmCallStart]);
    }

    #[test]
    fn error_status_emits_llm_call_error_with_error_level() {
        let now = Utc::now();
        let facts = ResponseFacts {
            model: Some("gpt-4o".into()),
            finish_reason: None,
            system_fingerprint: None,
            refusal: None,
            input_tokens: Some(10),
            output_tokens: Some(5),
            total_tokens: Some(15),
            content: None,
            tool_uses: Vec::new(),
            response_id: None,
        };
        let events = events_for_response("s1", 0, &facts, 120, Some(500), now);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, EventName::LlmCallError);
        assert_eq!(events[0].level, Level::Error);
    }
}
