use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use relayscope_providers::Message;
use sha2::{Digest, Sha256};

/// Maximum number of sessions tracked before the oldest-touched one is
/// evicted.
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;
/// Sessions untouched for this many seconds are dropped on the next cleanup.
pub const DEFAULT_SESSION_TTL_SECONDS: i64 = 3_600;

const SIGNATURE_CONTENT_MAX_CHARS: usize = 100;
const SYSTEM_PROMPT_MAX_CHARS: usize = 100;

struct SessionRecord {
    signature: String,
    created_at: DateTime<Utc>,
    last_accessed: DateTime<Utc>,
    message_count: usize,
}

/// Point-in-time resolver counters, exposed for a metrics or `doctor`
/// surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionMetrics {
    pub sessions_created: u64,
    pub sessions_expired: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub active_sessions: usize,
    pub max_sessions: usize,
    pub session_ttl_seconds: i64,
}

fn truncated(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect::<String>().trim().to_string()
}

fn compute_signature(messages: &[Message], system_prompt: Option<&str>) -> String {
    let mut parts = Vec::with_capacity(messages.len() + 1);
    if let Some(prompt) = system_prompt.filter(|p| !p.is_empty()) {
        parts.push(format!("system:{}", truncated(prompt, SYSTEM_PROMPT_MAX_CHARS)));
    }
    for message in messages {
        let prefix = truncated(&message.text, SIGNATURE_CONTENT_MAX_CHARS);
        parts.push(format!("{}:{}", message.role.as_str(), prefix));
    }
    let joined = parts.join("|");
    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Finds the message slice representing the conversation state before the
/// latest user turn, which should match the signature recorded when that
/// turn was first seen.
///
/// - `[user1, assistant1, user2]` -> `[user1]`
/// - `[user1, assistant1, user2, assistant2, user3]` -> `[user1, assistant1, user2]`
/// - `[user1, user2]` -> `[user1]`
/// - `[user1]` -> `[]`
fn messages_without_last_exchange(messages: &[Message]) -> &[Message] {
    if messages.len() <= 1 {
        return &[];
    }
    let user_indices: Vec<usize> = messages
        .iter()
        .enumerate()
        .filter(|(_, m)| m.role == relayscope_providers::MessageRole::User)
        .map(|(i, _)| i)
        .collect();
    if user_indices.len() < 2 {
        return &[];
    }
    let second_last_user_index = user_indices[user_indices.len() - 2];
    &messages[..=second_last_user_index]
}

/// Detects and tracks conversation sessions across stateless HTTP calls by
/// hashing message history, per the hash-based continuation algorithm this
/// crate generalizes across providers.
pub struct SessionResolver {
    max_sessions: usize,
    session_ttl: Duration,
    order: VecDeque<String>,
    sessions: HashMap<String, SessionRecord>,
    signature_to_session: HashMap<String, String>,
    sessions_created: u64,
    sessions_expired: u64,
    cache_hits: u64,
    cache_misses: u64,
}

impl Default for SessionResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionResolver {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_TTL_SECONDS)
    }

    pub fn with_limits(max_sessions: usize, session_ttl_seconds: i64) -> Self {
        Self {
            max_sessions,
            session_ttl: Duration::seconds(session_ttl_seconds),
            order: VecDeque::new(),
            sessions: HashMap::new(),
            signature_to_session: HashMap::new(),
            sessions_created: 0,
            sessions_expired: 0,
            cache_hits: 0,
            cache_misses: 0,
        }
    }

    /// Resolves the session a conversation belongs to, minting a new id
    /// when no existing session matches. Returns `(session_id, is_new)`.
    pub fn resolve(
        &mut self,
        messages: &[Message],
        system_prompt: Option<&str>,
        now: DateTime<Utc>,
    ) -> (String, bool) {
        self.cleanup_expired(now);

        if messages.len() <= 1 {
            let session_id = relayscope_core::new_session_id();
            let signature = compute_signature(messages, system_prompt);
            self.insert_session(session_id.clone(), signature, messages.len(), now);
            self.cache_misses += 1;
            return (session_id, true);
        }

        let previous = messages_without_last_exchange(messages);
        let existing = if previous.is_empty() {
            None
        } else {
            let lookup_signature = compute_signature(previous, system_prompt);
            self.signature_to_session.get(&lookup_signature).cloned()
        };

        match existing {
            Some(session_id) => {
                let full_signature = compute_signature(messages, system_prompt);
                self.touch(&session_id, full_signature, messages.len(), now);
                self.cache_hits += 1;
                (session_id, false)
            }
            None => {
                let session_id = relayscope_core::new_session_id();
                let signature = compute_signature(messages, system_prompt);
                self.insert_session(session_id.clone(), signature, messages.len(), now);
                self.cache_misses += 1;
                (session_id, true)
            }
        }
    }

    /// Explicitly attaches this conversation to `session_id`, used when the
    /// caller already knows the session from a provider-native continuation
    /// token (e.g. OpenAI's `previous_response_id`) rather than from
    /// signature matching. Returns whether `session_id` was already tracked.
    pub fn continue_session(
        &mut self,
        session_id: &str,
        messages: &[Message],
        system_prompt: Option<&str>,
        now: DateTime<Utc>,
    ) -> bool {
        self.cleanup_expired(now);
        let signature = compute_signature(messages, system_prompt);
        if self.sessions.contains_key(session_id) {
            self.touch(session_id, signature, messages.len(), now);
            self.cache_hits += 1;
            true
        } else {
            self.insert_session(session_id.to_string(), signature, messages.len(), now);
            self.cache_misses += 1;
            false
        }
    }

    fn insert_session(
        &mut self,
        session_id: String,
        signature: String,
        message_count: usize,
        now: DateTime<Utc>,
    ) {
        if self.sessions.len() >= self.max_sessions {
            if let Some(oldest_id) = self.order.pop_front() {
                if let Some(oldest) = self.sessions.remove(&oldest_id) {
                    self.signature_to_session.remove(&oldest.signature);
                }
            }
        }
        self.signature_to_session.insert(signature.clone(), session_id.clone());
        self.sessions.insert(
            session_id.clone(),
            SessionRecord {
                signature,
                created_at: now,
                last_accessed: now,
                message_count,
            },
        );
        self.order.push_back(session_id);
        self.sessions_created += 1;
    }

    fn touch(&mut self, session_id: &str, new_signature: String, message_count: usize, now: DateTime<Utc>) {
        let Some(record) = self.sessions.get_mut(session_id) else {
            return;
        };
        let old_signature = std::mem::replace(&mut record.signature, new_signature.clone());
        record.message_count = message_count;
        record.last_accessed = now;
        self.signature_to_session.remove(&old_signature);
        self.signature_to_session.insert(new_signature, session_id.to_string());

        self.order.retain(|id| id != session_id);
        self.order.push_back(session_id.to_string());
    }

    fn cleanup_expired(&mut self, now: DateTime<Utc>) {
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, record)| now - record.last_accessed > self.session_ttl)
            .map(|(id, _)| id.clone())
            .collect();
        for session_id in expired {
            if let Some(record) = self.sessions.remove(&session_id) {
                self.signature_to_session.remove(&record.signature);
            }
            self.order.retain(|id| id != &session_id);
            self.sessions_expired += 1;
        }
    }

    pub fn metrics(&self) -> SessionMetrics {
        SessionMetrics {
            sessions_created: self.sessions_created,
            sessions_expired: self.sessions_expired,
            cache_hits: self.cache_hits,
            cache_misses: self.cache_misses,
            active_sessions: self.sessions.len(),
            max_sessions: self.max_sessions,
            session_ttl_seconds: self.session_ttl.num_seconds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relayscope_providers::MessageRole;

    fn msg(role: MessageRole, text: &str) -> Message {
        Message {
            role,
            text: text.to_string(),
            tool_call_id: None,
            raw: serde_json::Value::Null,
        }
    }

    #[test]
    fn first_message_mints_a_new_session() {
        let mut resolver = SessionResolver::new();
        let now = Utc::now();
        let (_id, is_new) = resolver.resolve(&[msg(MessageRole::User, "hello")], None, now);
        assert!(is_new);
        assert_eq!(resolver.metrics().cache_misses, 1);
    }

    #[test]
    fn continuing_conversation_resolves_to_same_session() {
        let mut resolver = SessionResolver::new();
        let now = Utc::now();

        let (first_id, _) = resolver.resolve(&[msg(MessageRole::User, "what's 2+2?")], None, now);

        let turn_two = vec![
            msg(MessageRole::User, "what's 2+2?"),
            msg(MessageRole::Assistant, "4"),
            msg(MessageRole::User, "and 3+3?"),
        ];
        let (second_id, is_new) = resolver.resolve(&turn_two, None, now);

        assert_eq!(first_id, second_id);
        assert!(!is_new);
        assert_eq!(resolver.metrics().cache_hits, 1);
    }

    #[test]
    fn unrelated_conversation_gets_its_own_session() {
        let mut resolver = SessionResolver::new();
        let now = Utc::now();

        let (first_id, _) = resolver.resolve(&[msg(MessageRole::User, "what's 2+2?")], None, now);
        let (second_id, is_new) = resolver.resolve(&[msg(MessageRole::User, "unrelated question")], None, now);

        assert_ne!(first_id, second_id);
        assert!(is_new);
    }

    #[test]
    fn expired_sessions_are_evicted_on_cleanup() {
        let mut resolver = SessionResolver::with_limits(DEFAULT_MAX_SESSIONS, 60);
        let t0 = Utc::now();
        let (first_id, _) = resolver.resolve(&[msg(MessageRole::User, "hi")], None, t0);

        let later = t0 + Duration::seconds(120);
        let turn_two = vec![
            msg(MessageRole::User, "hi"),
            msg(MessageRole::Assistant, "hello"),
            msg(MessageRole::User, "still there?"),
        ];
        let (second_id, is_new) = resolver.resolve(&turn_two, None, later);

        // The original session expired, so this reads as an unrelated new session.
        assert!(is_new);
        assert_ne!(first_id, second_id);
        assert_eq!(resolver.metrics().sessions_expired, 1);
    }

    #[test]
    fn max_sessions_evicts_oldest_tracked_session() {
        let mut resolver = SessionResolver::with_limits(2, DEFAULT_SESSION_TTL_SECONDS);
        let now = Utc::now();
        resolver.resolve(&[msg(MessageRole::User, "a")], None, now);
        resolver.resolve(&[msg(MessageRole::User, "b")], None, now);
        resolver.resolve(&[msg(MessageRole::User, "c")], None, now);
        assert_eq!(resolver.metrics().active_sessions, 2);
    }

    #[test]
    fn continue_session_attaches_messages_to_a_known_id() {
        let mut resolver = SessionResolver::new();
        let now = Utc::now();
        let known = resolver.continue_session(
            "resp-session-1",
            &[msg(MessageRole::User, "continue off a previous_response_id")],
            None,
            now,
        );
        assert!(!known);
        let known_again = resolver.continue_session(
            "resp-session-1",
            &[msg(MessageRole::User, "one more turn")],
            None,
            now,
        );
        assert!(known_again);
    }
}
