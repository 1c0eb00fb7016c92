//! Fenced-JSON extraction from model output
//!
//! Models are asked to answer with a ```json fenced block; everything around
//! the fence is ignored.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::warn;

static JSON_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```json\s*([\s\S]*?)\s*```").expect("fence regex compiles"));

/// Pull the contents of the first ```json fence out of the response text
pub fn extract_json_block(text: &str) -> Option<&str> {
    if text.is_empty() {
        return None;
    }
    JSON_FENCE
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().trim())
}

/// Parse an extracted JSON string, logging instead of failing
pub fn parse_json_block(block: &str) -> Option<Value> {
    if block.is_empty() {
        return None;
    }
    match serde_json::from_str(block) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(error = %err, "failed to parse JSON from model output");
            None
        }
    }
}

/// Extract and parse in one step
pub fn extract_and_parse(text: &str) -> Option<Value> {
    extract_json_block(text).and_then(parse_json_block)
}

/// Check that extracted data carries at least one property the schema asks for
pub fn has_schema_properties(data: &Value, schema: &Value) -> bool {
    let Some(data) = data.as_object() else {
        return false;
    };
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return false;
    };
    data.keys().any(|key| properties.contains_key(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_json_block_basic() {
        let text = "Here is the result:\n```json\n{\"a\": 1}\n```\nDone.";
        assert_eq!(extract_json_block(text), Some("{\"a\": 1}"));
    }

    #[test]
    fn test_extract_json_block_first_fence_wins() {
        let text = "```json\n{\"first\": true}\n```\n```json\n{\"second\": true}\n```";
        assert_eq!(extract_json_block(text), Some("{\"first\": true}"));
    }

    #[test]
    fn test_extract_json_block_missing_fence() {
        assert_eq!(extract_json_block("no fences here"), None);
        assert_eq!(extract_json_block(""), None);
    }

    #[test]
    fn test_extract_and_parse_round() {
        let text = "```json\n{\"diagnosis\": \"IDC\", \"grade\": 2}\n```";
        let value = extract_and_parse(text).unwrap();
        assert_eq!(value["diagnosis"], "IDC");
        assert_eq!(value["grade"], 2);
    }

    #[test]
    fn test_extract_and_parse_invalid_json() {
        assert_eq!(extract_and_parse("```json\n{not json}\n```"), None);
    }

    #[test]
    fn test_has_schema_properties() {
        let schema = json!({"properties": {"diagnosis": {}, "grade": {}}});
        assert!(has_schema_properties(&json!({"diagnosis": "IDC"}), &schema));
        assert!(has_schema_properties(&json!({"grade": 2, "extra": 1}), &schema));
        assert!(!has_schema_properties(&json!({"unrelated": 1}), &schema));
        assert!(!has_schema_properties(&json!("not an object"), &schema));
        assert!(!has_schema_properties(&json!({"diagnosis": "IDC"}), &json!({})));
    }
}
