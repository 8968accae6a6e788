//! Property tests for pruning, text round trips, typed documents and
//! line-list controls.

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::{Map, Value};

use nuclei_forge::editor::codec::{decode, encode};
use nuclei_forge::editor::FieldKind;
use nuclei_forge::format::{from_text, parse_document, prune, to_text};
use nuclei_forge::Document;

fn is_reserved(s: &str) -> bool {
    matches!(s, "true" | "false" | "null" | "y" | "n" | "yes" | "no" | "on" | "off")
}

/// Plain words that YAML reads back as strings.
fn word() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,10}".prop_filter("reserved scalar", |s| !is_reserved(s))
}

fn key() -> impl Strategy<Value = String> {
    "[a-z]{1,8}".prop_filter("reserved scalar", |s| !is_reserved(s))
}

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        Just(Value::String(String::new())),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        word().prop_map(Value::String),
    ]
}

fn tree() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..5).prop_map(Value::Array),
            prop::collection::vec((key(), inner), 0..5)
                .prop_map(|entries| Value::Object(entries.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// A pruned document-shaped object: always has an `id`.
fn document() -> impl Strategy<Value = Value> {
    (word(), prop::collection::vec((key(), tree()), 0..6)).prop_map(|(id, fields)| {
        let mut map = Map::new();
        map.insert("id".to_string(), Value::String(id));
        for (key, value) in fields {
            if key != "id" {
                map.insert(key, value);
            }
        }
        prune(&Value::Object(map))
    })
}

/// Top-level keys the typed model reads itself.
const MODEL_KEYS: [&str; 10] = [
    "id", "info", "flow", "http", "dns", "network", "headless", "file", "javascript", "code",
];

fn http_request() -> impl Strategy<Value = Value> {
    (
        prop_oneof![Just("GET"), Just("POST")],
        prop::collection::vec(word(), 1..3),
        prop::collection::vec(word(), 0..3),
    )
        .prop_map(|(method, paths, words)| {
            serde_json::json!({
                "method": method,
                "path": paths,
                "matchers": [{"type": "word", "words": words}]
            })
        })
}

/// A template with an HTTP section and unknown top-level keys, in any order.
fn typed_document() -> impl Strategy<Value = Value> {
    (
        word(),
        word(),
        prop::collection::vec(http_request(), 1..3),
        prop::collection::vec((key(), tree()), 0..4),
    )
        .prop_flat_map(|(id, name, requests, extras)| {
            let mut entries = vec![
                ("id".to_string(), Value::String(id)),
                ("info".to_string(), serde_json::json!({"name": name, "severity": "low"})),
                ("http".to_string(), Value::Array(requests)),
            ];
            for (key, value) in extras {
                if !MODEL_KEYS.contains(&key.as_str()) && entries.iter().all(|(k, _)| *k != key) {
                    entries.push((key, value));
                }
            }
            Just(entries).prop_shuffle()
        })
        .prop_map(|entries| prune(&Value::Object(entries.into_iter().collect::<Map<_, _>>())))
}

fn top_level_keys(value: &Value) -> Vec<String> {
    value.as_object().map(|map| map.keys().cloned().collect()).unwrap_or_default()
}

fn line() -> impl Strategy<Value = String> {
    "[!-~]([ -~]{0,20}[!-~])?"
}

proptest! {
    #[test]
    fn prune_is_idempotent(value in tree()) {
        let once = prune(&value);
        assert_eq!(prune(&once), once);
    }

    #[test]
    fn pruned_documents_survive_text_round_trip(doc in document()) {
        let text = to_text(&doc).unwrap();
        assert_eq!(from_text(&text).unwrap(), doc);
    }

    #[test]
    fn typed_documents_keep_key_order(value in typed_document()) {
        let doc = Document::from_value(value.clone()).unwrap();
        let pruned = doc.pruned().unwrap();
        assert_eq!(top_level_keys(&pruned), top_level_keys(&value));

        let yaml = doc.canonical_yaml().unwrap();
        assert_eq!(top_level_keys(&from_text(&yaml).unwrap()), top_level_keys(&value));
    }

    #[test]
    fn canonical_yaml_is_a_fixed_point(value in typed_document()) {
        let doc = Document::from_value(value).unwrap();
        let yaml = doc.canonical_yaml().unwrap();
        let reparsed = parse_document(&yaml).unwrap();

        assert_eq!(reparsed.canonical_yaml().unwrap(), yaml);
        assert_eq!(reparsed, doc);
    }

    #[test]
    fn line_list_round_trips(lines in prop::collection::vec(line(), 1..8)) {
        let value = Value::Array(lines.into_iter().map(Value::String).collect());
        let control = encode(&value, FieldKind::LineList);
        assert_eq!(decode(&control, FieldKind::LineList).unwrap(), value);
    }
}
