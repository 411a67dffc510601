use uuid::Uuid;

/// Mint a new opaque 128-bit identifier, hex-encoded without hyphens.
fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Mint a new session id. Used by the resolver when a message history has
/// no matching prior signature (a brand-new conversation).
pub fn new_session_id() -> String {
    new_id()
}

/// Mint a new analysis session id.
pub fn new_analysis_session_id() -> String {
    new_id()
}

/// Mint a new finding id.
pub fn new_finding_id() -> String {
    new_id()
}

/// Mint a new recommendation id.
pub fn new_recommendation_id() -> String {
    new_id()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_32_hex_chars_and_unique() {
        let a = new_session_id();
        let b = new_session_id();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
