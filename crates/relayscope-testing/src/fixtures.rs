//! Sample provider request/response bodies and session builders.
//!
//! Provides utilities to:
//! - Build minimal-but-valid OpenAI chat-completions / Responses / Anthropic
//!   Messages request and response bodies for provider and resolver tests
//! - Seed a [`relayscope_store::Store`] with synthetic completed sessions for
//!   engine and runtime tests, without going through the HTTP surface

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use relayscope_store::Store;
use relayscope_types::{Event, EventName, Level, Session};
use serde_json::{json, Value};

/// A minimal OpenAI chat-completions request body: one system prompt and a
/// user turn. Callers append further turns to `messages` to build a
/// multi-turn history.
pub fn openai_chat_request(system_prompt: &str, messages: &[(&str, &str)]) -> Value {
    let mut body_messages = vec![json!({"role": "system", "content": system_prompt})];
    body_messages.extend(
        messages
            .iter()
            .map(|(role, content)| json!({"role": role, "content": content})),
    );
    json!({
        "model": "gpt-4o",
        "messages": body_messages,
        "stream": false,
    })
}

/// A minimal OpenAI chat-completions response body with no tool calls.
pub fn openai_chat_response(content: &str) -> Value {
    json!({
        "id": "chatcmpl-test",
        "model": "gpt-4o",
        "choices": [{
            "finish_reason": "stop",
            "message": {"role": "assistant", "content": content},
        }],
        "usage": {"prompt_tokens": 42, "completion_tokens": 17, "total_tokens": 59},
    })
}

/// A minimal OpenAI Responses API request body chaining off
/// `previous_response_id`, exercising the adapter's stateless-continuation
/// path instead of full-history resending.
pub fn openai_responses_request(previous_response_id: Option<&str>, input: &str) -> Value {
    let mut body = json!({
        "model": "gpt-4o",
        "input": input,
    });
    if let Some(id) = previous_response_id {
        body["previous_response_id"] = json!(id);
    }
    body
}

/// A minimal OpenAI Responses API response body, carrying the `id` a
/// follow-up request's `previous_response_id` would reference.
pub fn openai_responses_response(response_id: &str, content: &str) -> Value {
    json!({
        "id": response_id,
        "model": "gpt-4o",
        "output": [{"type": "message", "role": "assistant", "content": [{"type": "output_text", "text": content}]}],
        "usage": {"input_tokens": 30, "output_tokens": 12, "total_tokens": 42},
    })
}

/// A minimal Anthropic Messages request body. Unlike OpenAI, the system
/// prompt is a top-level field, never a `messages` entry.
pub fn anthropic_messages_request(system_prompt: &str, messages: &[(&str, &str)]) -> Value {
    json!({
        "model": "claude-opus-4",
        "system": system_prompt,
        "messages": messages.iter().map(|(role, content)| json!({"role": role, "content": content})).collect::<Vec<_>>(),
        "stream": false,
    })
}

/// A minimal Anthropic Messages response body with no tool use.
pub fn anthropic_messages_response(content: &str) -> Value {
    json!({
        "id": "msg-test",
        "model": "claude-opus-4",
        "stop_reason": "end_turn",
        "content": [{"type": "text", "text": content}],
        "usage": {"input_tokens": 55, "output_tokens": 22},
    })
}

/// A tool-use request: an Anthropic `tool_result` content block following
/// the previous turn's `tool_use`, used to exercise the "tool round-trip"
/// session-continuity edge case.
pub fn anthropic_tool_result_message(tool_use_id: &str, result_text: &str) -> Value {
    json!({
        "role": "user",
        "content": [{"type": "tool_result", "tool_use_id": tool_use_id, "content": result_text}],
    })
}

/// Seeds `store` with `count` completed sessions for `system_prompt_id`,
/// each carrying one tool-use event and a fixed token/duration profile, for
/// tests that need an agent already past the percentile-freeze or
/// risk-analysis threshold without exercising the monitor/runner directly.
pub fn seed_completed_sessions(
    store: &Store,
    system_prompt_id: &str,
    count: usize,
    tools: &[&str],
    now: DateTime<Utc>,
) {
    for i in 0..count {
        let session_id = format!("fixture-session-{system_prompt_id}-{i}");
        let mut event = Event::new(EventName::LlmCallStart, session_id.clone(), 0, now).with_level(Level::Info);
        event = event.with_agent(None, Some(system_prompt_id.to_string()));
        store.add_event(&event, Some(system_prompt_id), 10_000).unwrap();

        for tool in tools {
            let mut tool_event = Event::new(EventName::ToolExecution, session_id.clone(), 1, now);
            tool_event
                .attributes
                .insert("tool_name".to_string(), json!(tool));
            store.add_event(&tool_event, Some(system_prompt_id), 10_000).unwrap();
        }

        let completed = store
            .check_and_complete_sessions(now + chrono::Duration::seconds(3_600), 30)
            .unwrap();
        if completed.contains(&session_id) {
            let session: Session = store.get_session(&session_id).unwrap().unwrap();
            let features = relayscope_engine::features::extract(&session);
            let signature = relayscope_engine::compute_signature(&features, &Default::default());
            store.complete_session(&session_id, &signature, &features).unwrap();
        }
    }
}

/// The distinct tool names configured by [`seed_completed_sessions`] calls
/// that pass `tools`, useful for assertions that want to compare against
/// what a fixture actually seeded rather than hardcoding it twice.
pub fn tool_set(tools: &[&str]) -> HashSet<String> {
    tools.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_chat_request_carries_the_system_prompt_and_turns() {
        let body = openai_chat_request("you are a helper", &[("user", "hi")]);
        assert_eq!(body["messages"][0]["content"], "you are a helper");
        assert_eq!(body["messages"][1]["content"], "hi");
    }

    #[test]
    fn seed_completed_sessions_produces_the_requested_count() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();
        seed_completed_sessions(&store, "sp1", 5, &["Read", "Bash"], now);
        let agent = store.get_agent("sp1").unwrap().unwrap();
        assert_eq!(agent.completed_session_count, 5);
    }
}
