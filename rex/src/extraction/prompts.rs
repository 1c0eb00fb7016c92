//! Prompt assembly for extraction calls

use serde_json::Value;

/// Build the instruction prompt wrapping the report content
pub fn build_developer_prompt(system_prompt: &str, report: &str) -> String {
    format!("<instructions>\n{system_prompt}\n</instructions>\n\n<report>\n{report}\n</report>")
}

/// Build the query prompt from a JSON schema
///
/// Lists the schema's property names up front, then the full schema in a
/// fenced block.
pub fn build_user_query(schema: &Value) -> String {
    let keys: Vec<&str> = schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|properties| properties.keys().map(String::as_str).collect())
        .unwrap_or_default();
    let schema_json = serde_json::to_string_pretty(schema).unwrap_or_default();

    format!(
        "<query>\n<json_keys>\n[{}]\n</json_keys>\n<json_schema>\n```json{}```\n</json_schema>\n</query>",
        keys.join(", "),
        schema_json
    )
}

/// Combined single-message prompt for providers without role separation
pub fn build_combined_prompt(system_prompt: &str, report: &str, schema: &Value) -> String {
    format!(
        "{}\n\n{}",
        build_developer_prompt(system_prompt, report),
        build_user_query(schema)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_developer_prompt_wraps_sections() {
        let prompt = build_developer_prompt("Extract fields.", "Patient presented with...");
        assert!(prompt.starts_with("<instructions>\nExtract fields.\n</instructions>"));
        assert!(prompt.ends_with("<report>\nPatient presented with...\n</report>"));
    }

    #[test]
    fn test_user_query_lists_schema_keys() {
        let schema = json!({
            "properties": {
                "diagnosis": { "type": "string" },
                "grade": { "type": "integer" }
            }
        });

        let query = build_user_query(&schema);
        assert!(query.contains("<json_keys>\n[diagnosis, grade]\n</json_keys>"));
        assert!(query.contains("```json{"));
        assert!(query.contains("\"diagnosis\""));
    }

    #[test]
    fn test_user_query_without_properties() {
        let query = build_user_query(&json!({}));
        assert!(query.contains("<json_keys>\n[]\n</json_keys>"));
    }

    #[test]
    fn test_combined_prompt_order() {
        let schema = json!({"properties": {"a": {}}});
        let combined = build_combined_prompt("sys", "report", &schema);
        let instructions_at = combined.find("<instructions>").unwrap();
        let query_at = combined.find("<query>").unwrap();
        assert!(instructions_at < query_at);
    }
}
