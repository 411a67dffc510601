use std::sync::Arc;

use serde_json::Value;

use crate::anthropic::AnthropicMessagesAdapter;
use crate::openai::OpenAiChatAdapter;
use crate::openai_responses::OpenAiResponsesAdapter;
use crate::traits::ProviderAdapter;

/// Holds the known provider adapters and dispatches by upstream request
/// path (falling back to body shape when a path alone is ambiguous, per
/// `original_source/src/providers/registry.py`'s path-first detection).
pub struct ProviderRegistry {
    adapters: Vec<Arc<dyn ProviderAdapter>>,
    /// Kept as a concrete handle alongside `adapters` so callers that need
    /// its `previous_response_id` chain (not part of `ProviderAdapter`,
    /// since no other adapter has continuation state) don't have to
    /// downcast a trait object for it.
    responses: Arc<OpenAiResponsesAdapter>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    /// The standard registry: OpenAI chat-completions, OpenAI Responses,
    /// and Anthropic Messages.
    pub fn new() -> Self {
        let responses = Arc::new(OpenAiResponsesAdapter::new());
        Self {
            adapters: vec![
                Arc::new(OpenAiChatAdapter),
                responses.clone(),
                Arc::new(AnthropicMessagesAdapter),
            ],
            responses,
        }
    }

    pub fn detect(&self, path: &str, body: &Value) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters
            .iter()
            .find(|adapter| adapter.can_handle(path, body))
            .cloned()
    }

    pub fn by_name(&self, name: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.iter().find(|a| a.name() == name).cloned()
    }

    pub fn adapters(&self) -> &[Arc<dyn ProviderAdapter>] {
        &self.adapters
    }

    /// The OpenAI Responses adapter's concrete handle, for its
    /// `previous_response_id` continuation cache.
    pub fn responses(&self) -> &Arc<OpenAiResponsesAdapter> {
        &self.responses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_each_known_path() {
        let registry = ProviderRegistry::new();
        assert_eq!(
            registry.detect("/v1/chat/completions", &json!({})).unwrap().name(),
            "openai"
        );
        assert_eq!(
            registry.detect("/v1/responses", &json!({})).unwrap().name(),
            "openai_responses"
        );
        assert_eq!(
            registry.detect("/v1/messages", &json!({})).unwrap().name(),
            "anthropic"
        );
    }

    #[test]
    fn unknown_path_detects_nothing() {
        let registry = ProviderRegistry::new();
        assert!(registry.detect("/v1/embeddings", &json!({})).is_none());
    }
}
