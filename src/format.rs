//! Text serialization of template documents.
//!
//! Documents are pruned of empty values before they are written, written as
//! YAML with insertion-ordered keys, and read back from YAML or JSON.

use serde_json::Value;

use crate::error::{EditorError, EditorResult, FormatError, FormatResult};
use crate::template::Document;

/// Recursively removes `""`, `null`, `[]` and `{}`.
///
/// Containers emptied by pruning are removed too. `false` and `0` are kept.
/// A value that prunes away entirely becomes `null`.
pub fn prune(value: &Value) -> Value {
    prune_value(value).unwrap_or(Value::Null)
}

fn prune_value(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::Array(items) => {
            let kept: Vec<Value> = items.iter().filter_map(prune_value).collect();
            (!kept.is_empty()).then_some(Value::Array(kept))
        }
        Value::Object(map) => {
            let kept: serde_json::Map<String, Value> = map
                .iter()
                .filter_map(|(k, v)| prune_value(v).map(|v| (k.clone(), v)))
                .collect();
            (!kept.is_empty()).then_some(Value::Object(kept))
        }
        scalar => Some(scalar.clone()),
    }
}

/// Writes `value` as YAML. Keys keep insertion order and long scalars are
/// never wrapped.
pub fn to_text(value: &Value) -> EditorResult<String> {
    serde_yaml::to_string(value).map_err(|e| EditorError::serialization(e.to_string()))
}

/// Parses YAML, falling back to JSON, and checks the result looks like a template.
///
/// A non-mapping, or a mapping with neither `id` nor `info`, is rejected.
pub fn from_text(text: &str) -> FormatResult<Value> {
    let value = match serde_yaml::from_str::<Value>(text) {
        Ok(value) => value,
        Err(yaml_err) => serde_json::from_str::<Value>(text).map_err(|json_err| {
            FormatError::parse(format!("not YAML ({}) nor JSON ({})", yaml_err, json_err))
        })?,
    };

    match &value {
        Value::Object(map) if map.contains_key("id") || map.contains_key("info") => Ok(value),
        Value::Object(_) => Err(FormatError::invalid_template(
            "document has neither an 'id' nor an 'info' key",
        )),
        _ => Err(FormatError::invalid_template("document is not a mapping")),
    }
}

/// Parses text into a typed document.
pub fn parse_document(text: &str) -> FormatResult<Document> {
    Document::from_value(from_text(text)?)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_prune_removes_empties_depth_first() {
        let value = json!({
            "id": "t",
            "info": {"name": "T", "description": "", "metadata": {}, "tags": ""},
            "http": [{
                "method": "GET",
                "headers": {},
                "body": "",
                "matchers": [{"type": "word", "words": []}],
                "nested": [[], {}, [""]]
            }]
        });

        assert_eq!(
            prune(&value),
            json!({
                "id": "t",
                "info": {"name": "T"},
                "http": [{"method": "GET", "matchers": [{"type": "word"}]}]
            })
        );
    }

    #[test]
    fn test_prune_keeps_false_and_zero() {
        let value = json!({"recursion": false, "retries": 0, "x": null});
        assert_eq!(prune(&value), json!({"recursion": false, "retries": 0}));
    }

    #[test]
    fn test_prune_is_idempotent() {
        let value = json!({"a": {"b": {"c": ""}}, "d": [1, "", {"e": []}], "f": " "});
        let once = prune(&value);
        assert_eq!(prune(&once), once);
        assert_eq!(once, json!({"d": [1], "f": " "}));
    }

    #[test]
    fn test_to_text_keeps_order_and_does_not_wrap() {
        let long = vec!["lorem"; 60].join(" ");
        let value = json!({"id": "z", "info": {"name": "N", "description": long.clone()}});
        let text = to_text(&value).unwrap();

        assert!(text.starts_with("id: z\ninfo:\n"));
        assert!(text.contains(&format!("description: {}\n", long)));
        assert_eq!(from_text(&text).unwrap(), value);
    }

    #[test]
    fn test_round_trip() {
        let value = prune(&json!({
            "id": "cve-test",
            "info": {"name": "CVE test", "severity": "high", "reference": ["https://a", "https://b"]},
            "http": [{
                "raw": ["POST /login HTTP/1.1\nHost: {{Hostname}}\n\nuser=admin"],
                "matchers": [
                    {"type": "status", "status": [200, 302]},
                    {"type": "word", "words": ["yes", "on", "123", "null"], "negative": false}
                ]
            }]
        }));

        let text = to_text(&value).unwrap();
        assert_eq!(from_text(&text).unwrap(), value);
    }

    #[test]
    fn test_from_text_accepts_json() {
        let value = from_text(r#"{"id": "j", "info": {"name": "J"}}"#).unwrap();
        assert_eq!(value["info"]["name"], json!("J"));
    }

    #[test]
    fn test_from_text_rejects_non_templates() {
        assert!(matches!(
            from_text("- a\n- b\n"),
            Err(FormatError::InvalidTemplate(_))
        ));
        assert!(matches!(
            from_text("foo: 1\n"),
            Err(FormatError::InvalidTemplate(_))
        ));
        assert!(matches!(
            from_text("id: [unclosed\n"),
            Err(FormatError::Parse(_))
        ));
    }

    #[test]
    fn test_from_text_accepts_either_key() {
        assert!(from_text("id: only-id\n").is_ok());
        assert!(from_text("info:\n  name: only-info\n").is_ok());
    }

    #[test]
    fn test_parse_document_shape_errors_are_invalid_template() {
        let err = parse_document("id: x\ninfo: {}\nhttp:\n  - matchers:\n      - negative: maybe\n")
            .unwrap_err();
        assert!(matches!(err, FormatError::InvalidTemplate(_)));
    }
}
