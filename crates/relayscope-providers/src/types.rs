use serde::{Deserialize, Serialize};

/// Normalized role of one message in a parsed request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        }
    }
}

/// One message from the request's conversation history, with structured
/// content already flattened to its text portions (non-text blocks, e.g.
/// images, are dropped for signature purposes but preserved in `raw`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub text: String,
    pub tool_call_id: Option<String>,
    pub raw: serde_json::Value,
}

/// A tool made available to the model for this request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: Option<String>,
}

/// A tool result supplied by the caller as part of this request's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: Option<String>,
    pub content: String,
}

/// Everything extracted from a request body, vendor-agnostic, that the
/// session resolver and event emitters need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInputs {
    pub messages: Vec<Message>,
    pub system_prompt: Option<String>,
    pub model: Option<String>,
    pub is_streaming: bool,
    pub tools: Vec<ToolSpec>,
    pub tool_results: Vec<ToolResult>,
    /// Set only by the OpenAI Responses adapter: the `previous_response_id`
    /// supplied by the caller, used to continue a session across stateless
    /// calls that do not resend history.
    pub continuation_key: Option<String>,
}

impl SessionInputs {
    /// A tool-use block the assistant requested is signalled via the
    /// response, not the request; this counts only inbound tool results.
    pub fn tool_result_count(&self) -> usize {
        self.tool_results.len()
    }
}

/// A tool-use block the assistant requested in its response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolUse {
    pub tool_call_id: Option<String>,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Everything extracted from a response body, normalized across vendors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFacts {
    pub model: Option<String>,
    pub finish_reason: Option<String>,
    pub system_fingerprint: Option<String>,
    pub refusal: Option<String>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
    pub content: Option<String>,
    pub tool_uses: Vec<ToolUse>,
    /// Present only for the OpenAI Responses API: the `id` of this
    /// response, stashed by the adapter so a later request's
    /// `previous_response_id` can resolve back to this session.
    pub response_id: Option<String>,
}
