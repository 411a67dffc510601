use sha2::{Digest, Sha256};

/// Pricing cache is refreshed at most once per this interval (seconds).
pub const PRICING_STALE_AFTER_SECS: u64 = 24 * 60 * 60;

/// Truncate a string to a maximum number of characters (used for signature
/// content prefixes and fingerprint snippets, both bounded at a fixed width
/// so memory stays O(number of items) regardless of message size).
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

/// Hex-encoded SHA-256 digest of `input`, truncated to `len` characters.
/// Used for system_prompt_id (coarse agent key) and finding fingerprints.
pub fn short_hash(input: &str, len: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let full = format!("{:x}", hasher.finalize());
    full.chars().take(len).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_leaves_short_strings_untouched() {
        assert_eq!(truncate("hello", 100), "hello");
    }

    #[test]
    fn truncate_cuts_on_char_boundaries() {
        let s = "a".repeat(150);
        assert_eq!(truncate(&s, 100).chars().count(), 100);
    }

    #[test]
    fn short_hash_is_deterministic() {
        assert_eq!(short_hash("system prompt", 16), short_hash("system prompt", 16));
        assert_eq!(short_hash("system prompt", 16).len(), 16);
    }

    #[test]
    fn short_hash_distinguishes_inputs() {
        assert_ne!(short_hash("a", 16), short_hash("b", 16));
    }
}
