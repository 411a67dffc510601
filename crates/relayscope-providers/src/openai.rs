use serde_json::Value;

use crate::error::{Error, Result};
use crate::extract::{bool_field, content_text, str_field, u64_field};
use crate::traits::ProviderAdapter;
use crate::types::{Message, MessageRole, ResponseFacts, SessionInputs, ToolResult, ToolSpec, ToolUse};

/// OpenAI `/v1/chat/completions` (and legacy `/v1/completions`) adapter.
pub struct OpenAiChatAdapter;

fn message_role(raw: &str) -> MessageRole {
    match raw {
        "system" | "developer" => MessageRole::System,
        "assistant" => MessageRole::Assistant,
        "tool" | "function" => MessageRole::Tool,
        _ => MessageRole::User,
    }
}

impl ProviderAdapter for OpenAiChatAdapter {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn can_handle(&self, path: &str, _body: &Value) -> bool {
        path.ends_with("/chat/completions") || path.ends_with("/completions")
    }

    fn parse_request(&self, body: &Value) -> Result<SessionInputs> {
        let raw_messages = body
            .get("messages")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::Parse("missing `messages` array".to_string()))?;

        let mut messages = Vec::with_capacity(raw_messages.len());
        let mut tool_results = Vec::new();
        let mut system_prompt = None;

        for raw in raw_messages {
            let role_str = str_field(raw, "role")
                .ok_or_else(|| Error::Parse("message missing `role`".to_string()))?;
            let role = message_role(role_str);
            let content = raw.get("content").cloned().unwrap_or(Value::Null);
            let text = content_text(&content);
            let tool_call_id = str_field(raw, "tool_call_id").map(str::to_string);

            if role == MessageRole::System && system_prompt.is_none() {
                system_prompt = Some(text.clone());
            }
            if role == MessageRole::Tool {
                tool_results.push(ToolResult {
                    tool_call_id: tool_call_id.clone(),
                    content: text.clone(),
                });
            }

            messages.push(Message {
                role,
                text,
                tool_call_id,
                raw: raw.clone(),
            });
        }

        let tools = body
            .get("tools")
            .and_then(Value::as_array)
            .map(|tools| {
                tools
                    .iter()
                    .filter_map(|tool| {
                        let function = tool.get("function").unwrap_or(tool);
                        str_field(function, "name").map(|name| ToolSpec {
                            name: name.to_string(),
                            description: str_field(function, "description").map(str::to_string),
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
        let choice = body.get("choices").and_then(|c| c.get(0));
        let message = choice.and_then(|c| c.get("message"));

        let tool_uses = message
            .and_then(|m| m.get("tool_calls"))
            .and_then(Value::as_array)
            .map(|calls| {
                calls
                    .iter()
                    .filter_map(|call| {
                        let function = call.get("function")?;
                        let name = str_field(function, "name")?.to_string();
                        let arguments = function
                            .get("arguments")
                            .cloned()
                            .unwrap_or(Value::Null);
                        Some(ToolUse {
                            tool_call_id: str_field(call, "id").map(str::to_string),
                            name,
                            arguments,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let usage = body.get("usage");

        Ok(ResponseFacts {
            model: str_field(body, "model").map(str::to_string),
            finish_reason: choice.and_then(|c| str_field(c, "finish_reason")).map(str::to_string),
            system_fingerprint: str_field(body, "system_fingerprint").map(str::to_string),
            refusal: message.and_then(|m| str_field(m, "refusal")).map(str::to_string),
            input_tokens: usage.and_then(|u| u64_field(u, "prompt_tokens")),
            output_tokens: usage.and_then(|u| u64_field(u, "completion_tokens")),
            total_tokens: usage.and_then(|u| u64_field(u, "total_tokens")),
            content: message.and_then(|m| m.get("content")).map(content_text),
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
    fn can_handle_matches_chat_completions_path() {
        let adapter = OpenAiChatAdapter;
        assert!(adapter.can_handle("/v1/chat/completions", &Value::Null));
        assert!(!adapter.can_handle("/v1/responses", &Value::Null));
    }

    #[test]
    fn parse_request_extracts_system_prompt_and_tool_results() {
        let adapter = OpenAiChatAdapter;
        let body = json!({
            "model": "gpt-4o",
            "stream": true,
            "messages": [
                {"role": "system", "content": "You are a helpful bot"},
                {"role": "user", "content": "What's the weather?"},
                {"role": "assistant", "content": null, "tool_calls": [{"id": "call_1", "function": {"name": "get_weather"}}]},
                {"role": "tool", "tool_call_id": "call_1", "content": "Sunny, 75F"}
            ]
        });
        let inputs = adapter.parse_request(&body).unwrap();
        assert_eq!(inputs.system_prompt.as_deref(), Some("You are a helpful bot"));
        assert!(inputs.is_streaming);
        assert_eq!(inputs.tool_results.len(), 1);
        assert_eq!(inputs.tool_results[0].content, "Sunny, 75F");
        assert_eq!(inputs.messages.len(), 4);
    }

    #[test]
    fn parse_request_rejects_missing_messages() {
        let adapter = OpenAiChatAdapter;
        assert!(adapter.parse_request(&json!({"model": "gpt-4o"})).is_err());
    }

    #[test]
    fn parse_response_extracts_usage_and_tool_calls() {
        let adapter = OpenAiChatAdapter;
        let body = json!({
            "model": "gpt-4o",
            "system_fingerprint": "fp_123",
            "choices": [{
                "finish_reason": "tool_calls",
                "message": {
                    "content": null,
                    "tool_calls": [{"id": "call_1", "function": {"name": "get_weather", "arguments": "{}"}}]
                }
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        });
        let facts = adapter.parse_response(&body).unwrap();
        assert_eq!(facts.finish_reason.as_deref(), Some("tool_calls"));
        assert_eq!(facts.input_tokens, Some(10));
        assert_eq!(facts.tool_uses.len(), 1);
        assert_eq!(facts.tool_uses[0].name, "get_weather");
    }
}
