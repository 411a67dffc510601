use serde_json::Value;

/// Flatten a message `content` field to its text: either a plain string,
/// or (for structured content) the concatenation of text blocks only,
/// matching the resolver's normalization rule in §4.1.
pub fn content_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(|block| {
                block
                    .get("type")
                    .and_then(Value::as_str)
                    .filter(|t| *t == "text")
                    .and_then(|_| block.get("text"))
                    .and_then(Value::as_str)
            })
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}

pub fn str_field<'a>(body: &'a Value, key: &str) -> Option<&'a str> {
    body.get(key).and_then(Value::as_str)
}

pub fn bool_field(body: &Value, key: &str) -> bool {
    body.get(key).and_then(Value::as_bool).unwrap_or(false)
}

pub fn u64_field(body: &Value, key: &str) -> Option<u64> {
    body.get(key).and_then(Value::as_u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_text_passes_through_plain_strings() {
        assert_eq!(content_text(&json!("hello")), "hello");
    }

    #[test]
    fn content_text_concatenates_text_blocks_only() {
        let content = json!([
            {"type": "text", "text": "part one "},
            {"type": "image", "source": "ignored"},
            {"type": "text", "text": "part two"}
        ]);
        assert_eq!(content_text(&content), "part one part two");
    }

    #[test]
    fn content_text_defaults_to_empty_for_missing_content() {
        assert_eq!(content_text(&Value::Null), "");
    }
}
