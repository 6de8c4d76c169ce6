use crate::error::ConnectorError;
use rmcp::model::CallToolResult;
use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};

/// Keys whose empty/zero values mean "this call found nothing".
const RESULT_LIST_KEYS: &[&str] = &[
    "results", "items", "emails", "messages", "folders", "events", "contacts", "records", "data",
];

const COUNT_KEYS: &[&str] = &["total_count", "count", "result_count", "item_count"];

const QUERY_FIELD_KEYS: &[&str] = &["query", "search_term", "q"];

fn build_no_results_message(key: &str, query_hint: Option<String>) -> String {
    let label = match key {
        "data" | "results" | "total_count" | "count" | "result_count" => "results".to_string(),
        other => other.replace('_', " "),
    };

    match query_hint {
        Some(query) => format!("No {} found for \"{}\".", label, query),
        None => format!("No {} found for the requested input.", label),
    }
}

fn maybe_attach_no_results_message(map: &mut JsonMap<String, JsonValue>) -> Option<String> {
    // Any non-empty result list means we have data and should not set a no-results message.
    for key in RESULT_LIST_KEYS {
        if let Some(JsonValue::Array(items)) = map.get(*key) {
            if !items.is_empty() {
                return None;
            }
        }
    }

    // Capture a query hint if the payload includes one.
    let query_hint = map
        .iter()
        .find_map(|(key, value)| {
            if QUERY_FIELD_KEYS.iter().any(|candidate| candidate == key) {
                value.as_str().map(|s| s.trim().to_string())
            } else {
                None
            }
        })
        .filter(|s| !s.is_empty());

    let mut message: Option<String> = None;

    for key in RESULT_LIST_KEYS {
        if let Some(value) = map.get(*key) {
            match value {
                JsonValue::Array(items) if items.is_empty() => {
                    message = Some(build_no_results_message(key, query_hint.clone()));
                    break;
                }
                JsonValue::Null => {
                    message = Some(build_no_results_message(key, query_hint.clone()));
                    break;
                }
                _ => {}
            }
        }
    }

    if message.is_none() {
        for key in COUNT_KEYS {
            if let Some(value) = map.get(*key) {
                if value.as_u64() == Some(0) {
                    message = Some(build_no_results_message("results", query_hint.clone()));
                    break;
                }
            }
        }
    }

    if let Some(message_text) = message.clone() {
        map.entry("message".to_string())
            .or_insert(JsonValue::String(message_text.clone()));
        map.entry("no_results".to_string())
            .or_insert(JsonValue::Bool(true));
    }

    message
}

/// Build a CallToolResult that carries only structured JSON (no text fallback).
/// This prioritizes first-class machine-readable results for modern MCP clients.
pub fn structured_result_with_text<T: Serialize>(
    data: &T,
    _text_fallback: Option<String>,
) -> Result<CallToolResult, ConnectorError> {
    let value = serde_json::to_value(data).map_err(|e| ConnectorError::Other(e.to_string()))?;

    // Convert to an object map; if it's not an object, wrap under a `data` key.
    let mut map: JsonMap<String, JsonValue> = match value {
        JsonValue::Object(m) => m,
        other => {
            let mut m = JsonMap::new();
            m.insert("data".to_string(), other);
            m
        }
    };

    maybe_attach_no_results_message(&mut map);

    Ok(CallToolResult {
        content: Vec::new(),
        structured_content: Some(JsonValue::Object(map)),
        is_error: Some(false),
        meta: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_list_gets_message() {
        let result = structured_result_with_text(&json!({"emails": [], "query": "foo"}), None)
            .expect("result");
        let content = result.structured_content.expect("structured content");
        assert_eq!(content["no_results"], json!(true));
        assert_eq!(content["message"], json!("No emails found for \"foo\"."));
    }

    #[test]
    fn test_non_empty_list_untouched() {
        let result =
            structured_result_with_text(&json!({"emails": [{"subject": "hi"}]}), None).unwrap();
        let content = result.structured_content.unwrap();
        assert!(content.get("no_results").is_none());
    }
}
