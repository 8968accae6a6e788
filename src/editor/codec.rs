//! Conversion between form control values and document values.
//!
//! Every editable field has a [`FieldKind`]. [`decode`] turns what a control
//! holds into the value stored in the document (`Value::Null` meaning "remove
//! the key"), and [`encode`] turns a stored value back into control text.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::CodecError;

// =============================================================================
// CONTROL VALUES
// =============================================================================

/// What a form control holds: text, or a checkbox state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlValue {
    Checked(bool),
    Text(String),
}

impl ControlValue {
    /// Text content, if this is a text control.
    pub fn text(&self) -> Option<&str> {
        match self {
            ControlValue::Text(s) => Some(s),
            ControlValue::Checked(_) => None,
        }
    }

    /// Checkbox state. Text controls count as checked for `true`/`on`/`1`.
    pub fn is_checked(&self) -> bool {
        match self {
            ControlValue::Checked(b) => *b,
            ControlValue::Text(s) => matches!(s.trim(), "true" | "on" | "1" | "checked"),
        }
    }
}

impl Default for ControlValue {
    fn default() -> Self {
        ControlValue::Text(String::new())
    }
}

impl From<&str> for ControlValue {
    fn from(value: &str) -> Self {
        ControlValue::Text(value.to_string())
    }
}

impl From<String> for ControlValue {
    fn from(value: String) -> Self {
        ControlValue::Text(value)
    }
}

impl From<bool> for ControlValue {
    fn from(value: bool) -> Self {
        ControlValue::Checked(value)
    }
}

// =============================================================================
// FIELD KINDS
// =============================================================================

/// How a field's control text maps to its stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldKind {
    /// Verbatim string.
    Text,
    /// Trimmed string; empty removes the key.
    TrimmedText,
    /// One entry per non-blank line.
    LineList,
    /// Line list whose integer lines are stored as numbers.
    IntegerList,
    /// `key: value` per line.
    HeaderMap,
    /// Line list stored as `""` when empty.
    Reference,
    /// Fuzz payloads: map when lines look like `key: value`, else list.
    FuzzValues,
    /// Free-form JSON.
    JsonBlob,
    /// Comma-separated list; empty removes the key.
    CommaList,
    /// Raw HTTP requests separated by a blank line.
    RawBlocks,
    /// Integer; empty or unparsable removes the key.
    Integer,
    /// Integer >= 1; anything else removes the key.
    PositiveInteger,
    /// Checkbox stored as `true`, or removed when unchecked.
    Flag,
    /// Checkbox stored as `true`/`false`.
    Bool,
    /// Select; empty selection removes the key.
    Choice,
}

impl FieldKind {
    /// Name used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::TrimmedText => "trimmed text",
            FieldKind::LineList => "line list",
            FieldKind::IntegerList => "integer list",
            FieldKind::HeaderMap => "header map",
            FieldKind::Reference => "reference",
            FieldKind::FuzzValues => "fuzz values",
            FieldKind::JsonBlob => "JSON",
            FieldKind::CommaList => "comma list",
            FieldKind::RawBlocks => "raw requests",
            FieldKind::Integer => "integer",
            FieldKind::PositiveInteger => "positive integer",
            FieldKind::Flag => "flag",
            FieldKind::Bool => "boolean",
            FieldKind::Choice => "choice",
        }
    }

    /// Returns true for checkbox kinds.
    pub fn is_checkbox(self) -> bool {
        matches!(self, FieldKind::Flag | FieldKind::Bool)
    }
}

// =============================================================================
// DECODE
// =============================================================================

/// Decodes a control value into the value to store. `Value::Null` removes the key.
pub fn decode(raw: &ControlValue, kind: FieldKind) -> Result<Value, CodecError> {
    match kind {
        FieldKind::Flag => Ok(if raw.is_checked() {
            Value::Bool(true)
        } else {
            Value::Null
        }),
        FieldKind::Bool => Ok(Value::Bool(raw.is_checked())),
        _ => {
            let text = raw
                .text()
                .ok_or_else(|| CodecError::invalid_value(kind.name(), "checkbox state"))?;
            decode_text(text, kind)
        }
    }
}

fn decode_text(text: &str, kind: FieldKind) -> Result<Value, CodecError> {
    let value = match kind {
        FieldKind::Text => Value::String(text.to_string()),
        FieldKind::TrimmedText | FieldKind::Choice => non_empty(text.trim()),
        FieldKind::LineList => strings(lines(text)),
        FieldKind::IntegerList => Value::Array(
            lines(text)
                .into_iter()
                .map(|line| match line.parse::<i64>() {
                    Ok(n) => Value::Number(Number::from(n)),
                    Err(_) => Value::String(line),
                })
                .collect(),
        ),
        FieldKind::HeaderMap => {
            let map: Map<String, Value> = parse_header_lines(text)
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect();
            Value::Object(map)
        }
        FieldKind::Reference => {
            let refs = lines(text);
            if refs.is_empty() {
                Value::String(String::new())
            } else {
                strings(refs)
            }
        }
        FieldKind::FuzzValues => parse_fuzz_values(text),
        // Blank text is stale too: clearing the box keeps the stored value
        FieldKind::JsonBlob => serde_json::from_str(text).map_err(|e| CodecError::StaleJson(e.to_string()))?,
        FieldKind::CommaList => {
            let items: Vec<String> = text
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if items.is_empty() {
                Value::Null
            } else {
                strings(items)
            }
        }
        FieldKind::RawBlocks => strings(
            text.split("\n\n")
                .filter(|block| !block.trim().is_empty())
                .map(str::to_string)
                .collect(),
        ),
        FieldKind::Integer => text
            .trim()
            .parse::<i64>()
            .map(|n| Value::Number(Number::from(n)))
            .unwrap_or(Value::Null),
        FieldKind::PositiveInteger => match text.trim().parse::<i64>() {
            Ok(n) if n > 0 => Value::Number(Number::from(n)),
            _ => Value::Null,
        },
        FieldKind::Flag | FieldKind::Bool => {
            Value::Bool(ControlValue::from(text).is_checked())
        }
    };
    Ok(value)
}

/// Splits on `\n`, trims, drops blank lines.
pub fn lines(text: &str) -> Vec<String> {
    text.split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses `key: value` lines at the first colon. Last write wins.
pub fn parse_header_lines(text: &str) -> IndexMap<String, String> {
    let mut headers = IndexMap::new();
    for line in text.split('\n').filter(|l| !l.trim().is_empty()) {
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    headers
}

/// Fuzz payload text: a map when any line has a colon and does not start with
/// `{{`, otherwise a list. List lines are kept verbatim.
pub fn parse_fuzz_values(text: &str) -> Value {
    let entries: Vec<&str> = text.split('\n').filter(|l| !l.trim().is_empty()).collect();
    let is_map = entries
        .iter()
        .any(|line| line.contains(':') && !line.trim().starts_with("{{"));

    if !is_map {
        return strings(entries.iter().map(|l| l.to_string()).collect());
    }

    let mut map = Map::new();
    for line in entries {
        match line.find(':') {
            Some(colon) if colon > 0 => {
                let key = line[..colon].trim().to_string();
                let value = line[colon + 1..].trim().to_string();
                map.insert(key, Value::String(value));
            }
            _ => {}
        }
    }
    Value::Object(map)
}

fn strings(items: Vec<String>) -> Value {
    Value::Array(items.into_iter().map(Value::String).collect())
}

fn non_empty(text: &str) -> Value {
    if text.is_empty() {
        Value::Null
    } else {
        Value::String(text.to_string())
    }
}

// =============================================================================
// ENCODE
// =============================================================================

/// Encodes a stored value as the control's content.
pub fn encode(value: &Value, kind: FieldKind) -> ControlValue {
    match kind {
        FieldKind::Flag | FieldKind::Bool => ControlValue::Checked(value.as_bool().unwrap_or(false)),
        _ => ControlValue::Text(encode_text(value, kind)),
    }
}

fn encode_text(value: &Value, kind: FieldKind) -> String {
    match (kind, value) {
        (_, Value::Null) => String::new(),
        (FieldKind::JsonBlob, v) => serde_json::to_string_pretty(v).unwrap_or_default(),
        (FieldKind::HeaderMap, Value::Object(map)) | (FieldKind::FuzzValues, Value::Object(map)) => map
            .iter()
            .map(|(k, v)| format!("{}: {}", k, scalar_text(v)))
            .collect::<Vec<_>>()
            .join("\n"),
        (FieldKind::CommaList, Value::Array(items)) => join(items, ", "),
        (FieldKind::RawBlocks, Value::Array(items)) => join(items, "\n\n"),
        (FieldKind::Text, Value::Array(items)) | (FieldKind::TrimmedText, Value::Array(items)) => {
            join(items, ", ")
        }
        (_, Value::Array(items)) => join(items, "\n"),
        (_, other) => scalar_text(other),
    }
}

fn join(items: &[Value], sep: &str) -> String {
    items.iter().map(scalar_text).collect::<Vec<_>>().join(sep)
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(s: &str) -> ControlValue {
        ControlValue::from(s)
    }

    #[test]
    fn test_line_list_trims_and_drops_blanks() {
        let value = decode(&text("  /a \n\n   \n/b\n"), FieldKind::LineList).unwrap();
        assert_eq!(value, json!(["/a", "/b"]));
        assert_eq!(encode(&value, FieldKind::LineList), text("/a\n/b"));
    }

    #[test]
    fn test_header_map_first_colon_last_write_wins() {
        let value = decode(
            &text("Host: a.example:8080\nX-Test: 1\nno colon here\nX-Test: 2"),
            FieldKind::HeaderMap,
        )
        .unwrap();
        assert_eq!(value, json!({"Host": "a.example:8080", "X-Test": "2"}));
        assert_eq!(
            encode(&value, FieldKind::HeaderMap),
            text("Host: a.example:8080\nX-Test: 2")
        );
    }

    #[test]
    fn test_reference_empty_is_empty_string() {
        assert_eq!(decode(&text(""), FieldKind::Reference).unwrap(), json!(""));
        assert_eq!(decode(&text(" \n "), FieldKind::Reference).unwrap(), json!(""));
        assert_eq!(
            decode(&text("https://a\nhttps://b"), FieldKind::Reference).unwrap(),
            json!(["https://a", "https://b"])
        );
    }

    #[test]
    fn test_fuzz_values_map_or_list() {
        assert_eq!(
            decode(&text("Header-X: 1\nHeader-Y: 2"), FieldKind::FuzzValues).unwrap(),
            json!({"Header-X": "1", "Header-Y": "2"})
        );
        assert_eq!(
            decode(&text("val1\nval2"), FieldKind::FuzzValues).unwrap(),
            json!(["val1", "val2"])
        );
    }

    #[test]
    fn test_fuzz_values_template_expressions_stay_a_list() {
        let value = decode(&text("{{a:b}}\n{{c}}"), FieldKind::FuzzValues).unwrap();
        assert_eq!(value, json!(["{{a:b}}", "{{c}}"]));
    }

    #[test]
    fn test_fuzz_values_list_lines_are_verbatim() {
        let value = decode(&text(" ' OR 1=1 -- \n\n\tpayload\n"), FieldKind::FuzzValues).unwrap();
        assert_eq!(value, json!([" ' OR 1=1 -- ", "\tpayload"]));
    }

    #[test]
    fn test_fuzz_values_map_ignores_lines_without_key() {
        let value = decode(&text("k: v\n:orphan\nplain"), FieldKind::FuzzValues).unwrap();
        assert_eq!(value, json!({"k": "v"}));
    }

    #[test]
    fn test_json_blob_stale_edit() {
        let err = decode(&text("{\"url\": "), FieldKind::JsonBlob).unwrap_err();
        assert!(matches!(err, CodecError::StaleJson(_)));

        let ok = decode(&text("{\"url\": \"{{BaseURL}}\"}"), FieldKind::JsonBlob).unwrap();
        assert_eq!(ok, json!({"url": "{{BaseURL}}"}));
        assert!(matches!(decode(&text("  "), FieldKind::JsonBlob), Err(CodecError::StaleJson(_))));
        assert!(matches!(decode(&text(""), FieldKind::JsonBlob), Err(CodecError::StaleJson(_))));
    }

    #[test]
    fn test_comma_list() {
        assert_eq!(
            decode(&text("id, name ,,  token"), FieldKind::CommaList).unwrap(),
            json!(["id", "name", "token"])
        );
        assert_eq!(decode(&text(" , "), FieldKind::CommaList).unwrap(), Value::Null);
        assert_eq!(
            encode(&json!(["id", "name"]), FieldKind::CommaList),
            text("id, name")
        );
    }

    #[test]
    fn test_raw_blocks_split_on_blank_line() {
        let raw = "GET / HTTP/1.1\nHost: a\n\n\n\nGET /b HTTP/1.1\nHost: a";
        let value = decode(&text(raw), FieldKind::RawBlocks).unwrap();
        assert_eq!(
            value,
            json!(["GET / HTTP/1.1\nHost: a", "GET /b HTTP/1.1\nHost: a"])
        );
    }

    #[test]
    fn test_integers() {
        assert_eq!(decode(&text("3"), FieldKind::Integer).unwrap(), json!(3));
        assert_eq!(decode(&text("x"), FieldKind::Integer).unwrap(), Value::Null);
        assert_eq!(decode(&text("0"), FieldKind::PositiveInteger).unwrap(), Value::Null);
        assert_eq!(decode(&text("2"), FieldKind::PositiveInteger).unwrap(), json!(2));
        assert_eq!(
            decode(&text("200\n3xx"), FieldKind::IntegerList).unwrap(),
            json!([200, "3xx"])
        );
    }

    #[test]
    fn test_checkboxes() {
        assert_eq!(decode(&true.into(), FieldKind::Flag).unwrap(), json!(true));
        assert_eq!(decode(&false.into(), FieldKind::Flag).unwrap(), Value::Null);
        assert_eq!(decode(&false.into(), FieldKind::Bool).unwrap(), json!(false));
        assert_eq!(encode(&Value::Null, FieldKind::Flag), ControlValue::Checked(false));
    }

    #[test]
    fn test_checkbox_state_on_text_field_is_invalid() {
        let err = decode(&true.into(), FieldKind::LineList).unwrap_err();
        assert!(matches!(err, CodecError::InvalidValue { .. }));
    }

    #[test]
    fn test_choice_empty_removes() {
        assert_eq!(decode(&text(""), FieldKind::Choice).unwrap(), Value::Null);
        assert_eq!(decode(&text("body"), FieldKind::Choice).unwrap(), json!("body"));
    }
}
