use serde_json::Value;

use crate::error::{Error, Result};
use crate::extract::{bool_field, content_text, str_field, u64_field};
use crate::traits::ProviderAdapter;
use crate::types::{Message, MessageRole, ResponseFacts, SessionInputs, ToolResult, ToolSpec, ToolUse};

/// Anthropic `/v1/messages` adapter. The system prompt is a top-level
/// `system` field here, never a message in the `messages` array (unlike
/// OpenAI's `role: "system"` convention).
pub struct AnthropicMessagesAdapter;

fn tool_results_in_content(content: &Value) -> Vec<ToolResult> {
    match content {
        Value::Array(blocks) => blocks
            .iter()
            .filter(|b| str_field(b, "type") == Some("tool_result"))
            .map(|b| ToolResult {
                tool_call_id: str_field(b, "tool_use_id").map(str::to_string),
                content: b
                    .get("content")
                    .map(content_text)
                    .unwrap_or_default(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

impl ProviderAdapter for AnthropicMessagesAdapter {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn can_handle(&self, path: &str, _body: &Value) -> bool {
        path.ends_with("/messages")
    }

    fn parse_request(&self, body: &Value) -> Result<SessionInputs> {
        let raw_messages = body
            .get("messages")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::Parse("missing `messages` array".to_string()))?;

        let mut messages = Vec::with_capacity(raw_messages.len());
        let mut tool_results = Vec::new();

        for raw in raw_messages {
            let role_str = str_field(raw, "role")
                .ok_or_else(|| Error::Parse("message missing `role`".to_string()))?;
            let role = match role_str {
                "assistant" => MessageRole::Assistant,
                _ => MessageRole::User,
            };
            let content = raw.get("content").cloned().unwrap_or(Value::Null);
            tool_results.extend(tool_results_in_content(&content));

            messages.push(Message {
                role,
                text: content_text(&content),
                tool_call_id: None,
                raw: raw.clone(),
            });
        }

        let system_prompt = body.get("system").map(content_text);

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

        Ok(SessionInputs {
            messages,
            system_prompt,
            model: str_field(body, "model").map(str::to_string),
            is_streaming: bool_field(body, "stream"),
            tools,
            tool_results,
            continuation_key: None,
        })
    }

    fn parse_response(&self, body: &Value) -> Result<ResponseFacts> {
        let content_blocks = body.get("content").and_then(Value::as_array);

        let content = content_blocks.map(|blocks| {
            blocks
                .iter()
                .filter(|b| str_field(b, "type") == Some("text"))
                .filter_map(|b| str_field(b, "text"))
                .collect::<Vec<_>>()
                .join("")
        });

        let tool_uses = content_blocks
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| str_field(b, "type") == Some("tool_use"))
                    .filter_map(|b| {
                        let name = str_field(b, "name")?.to_string();
                        Some(ToolUse {
                            tool_call_id: str_field(b, "id").map(str::to_string),
                            name,
                            arguments: b.get("input").cloned().unwrap_or(Value::Null),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let usage = body.get("usage");
        let input_tokens = usage.and_then(|u| u64_field(u, "input_tokens"));
        let output_tokens = usage.and_then(|u| u64_field(u, "output_tokens"));

        Ok(ResponseFacts {
            model: str_field(body, "model").map(str::to_string),
            finish_reason: str_field(body, "stop_reason").map(str::to_string),
            system_fingerprint: None,
            refusal: None,
            input_tokens,
            output_tokens,
            total_tokens: match (input_tokens, output_tokens) {
                (Some(i), Some(o)) => Some(i + o),
                _ => None,
            },
            content,
            tool_uses,
            response_id: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn can_handle_matches_messages_path() {
        let adapter = AnthropicMessagesAdapter;
        assert!(adapter.can_handle("/v1/messages", &Value::Null));
        assert!(!adapter.can_handle("/v1/chat/completions", &Value::Null));
    }

    #[test]
    fn system_prompt_comes_from_top_level_system_field() {
        let adapter = AnthropicMessagesAdapter;
        let body = json!({
            "model": "claude-opus-4",
            "system": "Be terse.",
            "messages": [{"role": "user", "content": "hi"}]
        });
        let inputs = adapter.parse_request(&body).unwrap();
        assert_eq!(inputs.system_prompt.as_deref(), Some("Be terse."));
    }

    #[test]
    fn tool_result_blocks_are_extracted_from_user_messages() {
        let adapter = AnthropicMessagesAdapter;
        let body = json!({
            "model": "claude-opus-4",
            "messages": [
                {"role": "user", "content": "what's the weather?"},
                {"role": "assistant", "content": [{"type": "tool_use", "id": "t1", "name": "get_weather", "input": {}}]},
                {"role": "user", "content": [{"type": "tool_result", "tool_use_id": "t1", "content": "Sunny, 75F"}]}
            ]
        });
        let inputs = adapter.parse_request(&body).unwrap();
        assert_eq!(inputs.tool_results.len(), 1);
        assert_eq!(inputs.tool_results[0].content, "Sunny, 75F");
    }

    #[test]
    fn parse_response_sums_total_tokens_from_input_and_output() {
        let adapter = AnthropicMessagesAdapter;
        let body = json!({
            "model": "claude-opus-4",
            "stop_reason": "end_turn",
            "content": [{"type": "text", "text": "hello"}],
            "usage": {"input_tokens": 12, "output_tokens": 8}
        });
        let facts = adapter.parse_response(&body).unwrap();
        assert_eq!(facts.total_tokens, Some(20));
        assert_eq!(facts.content.as_deref(), Some("hello"));
    }
}
