use std::sync::Mutex;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::extract::{bool_field, content_text, str_field, u64_field};
use crate::fifo_cache::FifoCache;
use crate::traits::ProviderAdapter;
use crate::types::{Message, MessageRole, ResponseFacts, SessionInputs, ToolSpec, ToolUse};

/// Capacity of the `previous_response_id -> session_id` FIFO, matching the
/// original's `self.response_sessions` bound.
pub const RESPONSE_ID_CACHE_CAPACITY: usize = 10_000;

/// OpenAI `/v1/responses` adapter. Unlike chat-completions, the Responses
/// API is itself stateful across calls via `previous_response_id`, so this
/// adapter owns a small cache mapping each response id it has seen back to
/// the session it belongs to.
pub struct OpenAiResponsesAdapter {
    response_sessions: Mutex<FifoCache<String, String>>,
}

impl Default for OpenAiResponsesAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenAiResponsesAdapter {
    pub fn new() -> Self {
        Self {
            response_sessions: Mutex::new(FifoCache::new(RESPONSE_ID_CACHE_CAPACITY)),
        }
    }

    /// Look up the session a `previous_response_id` belongs to, if this
    /// adapter has seen that response before.
    pub fn resolve_continuation(&self, previous_response_id: &str) -> Option<String> {
        self.response_sessions
            .lock()
            .expect("response_sessions lock poisoned")
            .get(&previous_response_id.to_string())
            .cloned()
    }

    /// Record that `response_id` belongs to `session_id`, so a later
    /// request chaining off it resolves back to this session.
    pub fn record_response(&self, response_id: String, session_id: String) {
        self.response_sessions
            .lock()
            .expect("response_sessions lock poisoned")
            .insert(response_id, session_id);
    }
}

fn input_to_messages(input: &Value) -> Vec<Message> {
    match input {
        Value::String(text) => vec![Message {
            role: MessageRole::User,
            text: text.clone(),
            tool_call_id: None,
            raw: input.clone(),
        }],
        Value::Array(items) => items
            .iter()
            .map(|item| {
                let role = match str_field(item, "role") {
                    Some("assistant") => MessageRole::Assistant,
                    Some("system") | Some("developer") => MessageRole::System,
                    Some("tool") | Some("function_call_output") => MessageRole::Tool,
                    _ => MessageRole::User,
                };
                let content = item.get("content").cloned().unwrap_or(Value::Null);
                Message {
                    role,
                    text: content_text(&content),
                    tool_call_id: str_field(item, "call_id").map(str::to_string),
                    raw: item.clone(),
                }
            })
            .collect(),
        _ => Vec::new(),
    }
}

impl ProviderAdapter for OpenAiResponsesAdapter {
    fn name(&self) -> &'static str {
        "openai_responses"
    }

    fn can_handle(&self, path: &str, _body: &Value) -> bool {
        path.ends_with("/responses")
    }

    fn parse_request(&self, body: &Value) -> Result<SessionInputs> {
        let messages = body
            .get("input")
            .map(input_to_messages)
            .ok_or_else(|| Error::Parse("missing `input`".to_string()))?;

        let tools = body
            .get("tools")
            .and_then(Value::as_array)
            .map(|tools| {
                tools
                    .iter()
                    .filter_map(|tool| {
                        str_field(tool, "name").map(|name| ToolSpec {
                            name: name.to_string(),
                            description: str_field(tool, "description").map(str::to_string),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let tool_results = messages
            .iter()
            .filter(|m| m.role == MessageRole::Tool)
            .map(|m| crate::types::ToolResult {
                tool_call_id: m.tool_call_id.clone(),
                content: m.text.clone(),
            })
            .collect();

        Ok(SessionInputs {
            messages,
            system_prompt: str_field(body, "instructions").map(str::to_string),
            model: str_field(body, "model").map(str::to_string),
            is_streaming: bool_field(body, "stream"),
            tools,
            tool_results,
            continuation_key: str_field(body, "previous_response_id").map(str::to_string),
        })
    }

    fn parse_response(&self, body: &Value) -> Result<ResponseFacts> {
        let output = body.get("output").and_then(Value::as_array);

        let content = output.and_then(|items| {
            items.iter().find_map(|item| {
                (str_field(item, "type") == Some("message"))
                    .then(|| item.get("content"))
                    .flatten()
                    .map(content_text)
            })
        });

        let tool_uses = output
            .map(|items| {
                items
                    .iter()
                    .filter(|item| str_field(item, "type") == Some("function_call"))
                    .filter_map(|item| {
                        let name = str_field(item, "name")?.to_string();
                        Some(ToolUse {
                            tool_call_id: str_field(item, "call_id").map(str::to_string),
                            name,
                            arguments: item.get("arguments").cloned().unwrap_or(Value::Null),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let usage = body.get("usage");

        Ok(ResponseFacts {
            model: str_field(body, "model").map(str::to_string),
            finish_reason: str_field(body, "status").map(str::to_string),
            system_fingerprint: None,
            refusal: None,
            input_tokens: usage.and_then(|u| u64_field(u, "input_tokens")),
            output_tokens: usage.and_then(|u| u64_field(u, "output_tokens")),
            total_tokens: usage.and_then(|u| u64_field(u, "total_tokens")),
            content,
            tool_uses,
            response_id: str_field(body, "id").map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn can_handle_matches_responses_path() {
        let adapter = OpenAiResponsesAdapter::new();
        assert!(adapter.can_handle("/v1/responses", &Value::Null));
        assert!(!adapter.can_handle("/v1/chat/completions", &Value::Null));
    }

    #[test]
    fn parse_request_picks_up_previous_response_id_as_continuation_key() {
        let adapter = OpenAiResponsesAdapter::new();
        let body = json!({
            "model": "gpt-4o",
            "instructions": "You are terse.",
            "previous_response_id": "resp_abc",
            "input": "Continue please"
        });
        let inputs = adapter.parse_request(&body).unwrap();
        assert_eq!(inputs.continuation_key.as_deref(), Some("resp_abc"));
        assert_eq!(inputs.system_prompt.as_deref(), Some("You are terse."));
        assert_eq!(inputs.messages.len(), 1);
    }

    #[test]
    fn response_cache_round_trips() {
        let adapter = OpenAiResponsesAdapter::new();
        assert_eq!(adapter.resolve_continuation("resp_1"), None);
        adapter.record_response("resp_1".to_string(), "session_1".to_string());
        assert_eq!(adapter.resolve_continuation("resp_1"), Some("session_1".to_string()));
    }

    #[test]
    fn parse_response_extracts_function_calls_and_usage() {
        let adapter = OpenAiResponsesAdapter::new();
        let body = json!({
            "id": "resp_1",
            "model": "gpt-4o",
            "status": "completed",
            "output": [
                {"type": "function_call", "call_id": "call_1", "name": "get_weather", "arguments": "{}"},
                {"type": "message", "content": [{"type": "text", "text": "done"}]}
            ],
            "usage": {"input_tokens": 10, "output_tokens": 5, "total_tokens": 15}
        });
        let facts = adapter.parse_response(&body).unwrap();
        assert_eq!(facts.response_id.as_deref(), Some("resp_1"));
        assert_eq!(facts.tool_uses.len(), 1);
        assert_eq!(facts.content.as_deref(), Some("done"));
    }
}
