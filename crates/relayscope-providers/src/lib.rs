mod anthropic;
pub mod error;
mod events;
mod extract;
mod fifo_cache;
mod openai;
mod openai_responses;
mod registry;
mod traits;
mod types;

pub use anthropic::AnthropicMessagesAdapter;
pub use error::{Error, Result};
pub use openai::OpenAiChatAdapter;
pub use openai_responses::{OpenAiResponsesAdapter, RESPONSE_ID_CACHE_CAPACITY};
pub use registry::ProviderRegistry;
pub use traits::ProviderAdapter;
pub use types::{
    Message, MessageRole, ResponseFacts, SessionInputs, ToolResult, ToolSpec, ToolUse,
};
