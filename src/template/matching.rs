//! Matchers, extractors and the type-to-field variant tables.
//!
//! A matcher or extractor keeps its values under a key chosen by its `type`
//! (`word` → `words`, `regex` → `regex`, ...). The tables below are the single
//! source of that mapping, used both by typed (de)serialization and by
//! [`switch_type`] on raw JSON objects.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::model::Extra;

// =============================================================================
// VARIANT TABLES
// =============================================================================

/// Static `type → value field` table with a fallback field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantTable {
    /// `(type, field)` pairs, in option-list order.
    pub entries: &'static [(&'static str, &'static str)],
    /// Field used for unknown or missing types.
    pub fallback: &'static str,
    /// Fields only meaningful for one type: `(type, field)`.
    pub type_only: &'static [(&'static str, &'static str)],
}

impl VariantTable {
    /// Value field for `type_name`.
    pub fn field_for(&self, type_name: &str) -> &'static str {
        self.entries
            .iter()
            .find(|(t, _)| *t == type_name)
            .map(|(_, f)| *f)
            .unwrap_or(self.fallback)
    }

    /// Returns true if `type_name` is a known type.
    pub fn knows(&self, type_name: &str) -> bool {
        self.entries.iter().any(|(t, _)| *t == type_name)
    }

    /// Known type names.
    pub fn types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(t, _)| *t)
    }

    /// Known value fields.
    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(_, f)| *f)
    }
}

pub const MATCHER_TABLE: VariantTable = VariantTable {
    entries: &[
        ("word", "words"),
        ("regex", "regex"),
        ("binary", "binary"),
        ("status", "status"),
        ("size", "size"),
        ("dsl", "dsl"),
    ],
    fallback: "words",
    type_only: &[],
};

pub const EXTRACTOR_TABLE: VariantTable = VariantTable {
    entries: &[
        ("regex", "regex"),
        ("json", "json"),
        ("xpath", "xpath"),
        ("dsl", "dsl"),
        ("kval", "kval"),
    ],
    fallback: "regex",
    type_only: &[("regex", "group")],
};

/// Changes the `type` of a raw matcher/extractor object.
///
/// Values under the old type's field move to the new type's field (an absent
/// old field moves as `[]`), the old field is removed, and fields owned by a
/// different type are dropped.
pub fn switch_type(entry: &mut Map<String, Value>, new_type: &str, table: &VariantTable) {
    let old_type = entry
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let old_field = table.field_for(&old_type);
    let new_field = table.field_for(new_type);

    if old_field != new_field {
        let values = entry
            .remove(old_field)
            .unwrap_or_else(|| Value::Array(Vec::new()));
        entry.insert(new_field.to_string(), values);
    }

    for (owner, field) in table.type_only {
        if *owner != new_type {
            entry.remove(*field);
        }
    }

    entry.insert("type".to_string(), Value::String(new_type.to_string()));
}

/// A closed set of `type` names backed by a [`VariantTable`].
pub trait VariantKind: Copy + Sized + 'static {
    const TABLE: &'static VariantTable;
    const DEFAULT: Self;

    fn as_str(self) -> &'static str;
    fn from_name(name: &str) -> Option<Self>;

    /// Field holding this kind's values.
    fn field(self) -> &'static str {
        Self::TABLE.field_for(self.as_str())
    }
}

macro_rules! variant_kind {
    ($name:ident, $table:expr, $default:ident, { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl VariantKind for $name {
            const TABLE: &'static VariantTable = &$table;
            const DEFAULT: Self = $name::$default;

            fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

variant_kind!(MatcherKind, MATCHER_TABLE, Word, {
    Word => "word",
    Regex => "regex",
    Binary => "binary",
    Status => "status",
    Size => "size",
    Dsl => "dsl",
});

variant_kind!(ExtractorKind, EXTRACTOR_TABLE, Regex, {
    Regex => "regex",
    Json => "json",
    Xpath => "xpath",
    Dsl => "dsl",
    Kval => "kval",
});

impl MatcherKind {
    /// Status and size matchers hold integers.
    pub fn is_numeric(self) -> bool {
        matches!(self, MatcherKind::Status | MatcherKind::Size)
    }
}

// =============================================================================
// MATCHER
// =============================================================================

/// A response matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Matcher {
    pub kind: MatcherKind,
    /// Ordered values, written under `kind.field()`.
    pub values: Vec<Value>,
    pub part: Option<String>,
    pub condition: Option<String>,
    pub negative: Option<bool>,
    /// `type` outside the known set. Every other key then stays in `extra`.
    pub unknown_type: Option<String>,
    pub extra: Extra,
}

impl Matcher {
    /// Creates a matcher of `kind` with string values.
    pub fn new<I, S>(kind: MatcherKind, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind,
            values: values.into_iter().map(|v| Value::String(v.into())).collect(),
            part: None,
            condition: None,
            negative: None,
            unknown_type: None,
            extra: Extra::new(),
        }
    }

    /// Builder: Set part.
    pub fn with_part(mut self, part: impl Into<String>) -> Self {
        self.part = Some(part.into());
        self
    }

    /// Builder: Set condition.
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Builder: Mark as negative.
    pub fn negated(mut self) -> Self {
        self.negative = Some(true);
        self
    }

    /// Changes the kind; values carry over to the new field.
    pub fn switch_kind(&mut self, kind: MatcherKind) {
        self.kind = kind;
    }
}

impl TryFrom<Map<String, Value>> for Matcher {
    type Error = String;

    fn try_from(mut map: Map<String, Value>) -> Result<Self, Self::Error> {
        let (kind, unknown_type) = take_kind::<MatcherKind>(&mut map, "matcher")?;
        if unknown_type.is_some() {
            let mut matcher = Self::new(kind, Vec::<String>::new());
            matcher.unknown_type = unknown_type;
            matcher.extra = map.into_iter().collect();
            return Ok(matcher);
        }
        let values = take_values(&mut map, kind.field());
        drop_stray_fields(&mut map, MatcherKind::TABLE, "matcher");

        Ok(Self {
            kind,
            values,
            part: take(&mut map, "part")?,
            condition: take(&mut map, "condition")?,
            negative: take(&mut map, "negative")?,
            unknown_type: None,
            extra: map.into_iter().collect(),
        })
    }
}

impl From<Matcher> for Map<String, Value> {
    fn from(matcher: Matcher) -> Self {
        let mut map = Map::new();
        if let Some(name) = matcher.unknown_type {
            map.insert("type".into(), Value::String(name));
            map.extend(matcher.extra);
            return map;
        }
        map.insert("type".into(), Value::String(matcher.kind.as_str().into()));
        map.insert(matcher.kind.field().into(), Value::Array(matcher.values));
        put(&mut map, "part", matcher.part.map(Value::String));
        put(&mut map, "condition", matcher.condition.map(Value::String));
        put(&mut map, "negative", matcher.negative.map(Value::Bool));
        map.extend(matcher.extra);
        map
    }
}

// =============================================================================
// EXTRACTOR
// =============================================================================

/// A response extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Extractor {
    pub kind: ExtractorKind,
    pub values: Vec<Value>,
    pub part: Option<String>,
    /// Capture group, regex extractors only.
    pub group: Option<u64>,
    pub name: Option<String>,
    /// `type` outside the known set. Every other key then stays in `extra`.
    pub unknown_type: Option<String>,
    pub extra: Extra,
}

impl Extractor {
    /// Creates an extractor of `kind` with string values.
    pub fn new<I, S>(kind: ExtractorKind, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind,
            values: values.into_iter().map(|v| Value::String(v.into())).collect(),
            part: None,
            group: None,
            name: None,
            unknown_type: None,
            extra: Extra::new(),
        }
    }

    /// Builder: Set name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builder: Set capture group.
    pub fn with_group(mut self, group: u64) -> Self {
        self.group = Some(group);
        self
    }

    /// Changes the kind; values carry over, `group` is dropped outside regex.
    pub fn switch_kind(&mut self, kind: ExtractorKind) {
        self.kind = kind;
        if kind != ExtractorKind::Regex {
            self.group = None;
        }
    }
}

impl TryFrom<Map<String, Value>> for Extractor {
    type Error = String;

    fn try_from(mut map: Map<String, Value>) -> Result<Self, Self::Error> {
        let (kind, unknown_type) = take_kind::<ExtractorKind>(&mut map, "extractor")?;
        if unknown_type.is_some() {
            let mut extractor = Self::new(kind, Vec::<String>::new());
            extractor.unknown_type = unknown_type;
            extractor.extra = map.into_iter().collect();
            return Ok(extractor);
        }
        let values = take_values(&mut map, kind.field());
        drop_stray_fields(&mut map, ExtractorKind::TABLE, "extractor");

        Ok(Self {
            kind,
            values,
            part: take(&mut map, "part")?,
            group: take_int(&mut map, "group")?,
            name: take(&mut map, "name")?,
            unknown_type: None,
            extra: map.into_iter().collect(),
        })
    }
}

impl From<Extractor> for Map<String, Value> {
    fn from(extractor: Extractor) -> Self {
        let mut map = Map::new();
        if let Some(name) = extractor.unknown_type {
            map.insert("type".into(), Value::String(name));
            map.extend(extractor.extra);
            return map;
        }
        map.insert("type".into(), Value::String(extractor.kind.as_str().into()));
        map.insert(extractor.kind.field().into(), Value::Array(extractor.values));
        put(&mut map, "part", extractor.part.map(Value::String));
        put(&mut map, "group", extractor.group.map(Value::from));
        put(&mut map, "name", extractor.name.map(Value::String));
        map.extend(extractor.extra);
        map
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// The known kind for `type`, or the default kind plus the unrecognized name.
fn take_kind<K: VariantKind>(map: &mut Map<String, Value>, what: &str) -> Result<(K, Option<String>), String> {
    match map.remove("type") {
        None | Some(Value::Null) => Ok((K::DEFAULT, None)),
        Some(Value::String(name)) => match K::from_name(&name) {
            Some(kind) => Ok((kind, None)),
            None => {
                tracing::debug!(type_name = %name, "keeping {} of unrecognized type", what);
                Ok((K::DEFAULT, Some(name)))
            }
        },
        Some(other) => Err(format!("{} type must be a string, got {}", what, other)),
    }
}

fn take_values(map: &mut Map<String, Value>, field: &str) -> Vec<Value> {
    match map.remove(field) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(values)) => values,
        Some(single) => vec![single],
    }
}

fn take<T: DeserializeOwned>(map: &mut Map<String, Value>, key: &str) -> Result<Option<T>, String> {
    match map.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| format!("invalid '{}': {}", key, e)),
    }
}

/// An integer written either as a number or as numeric text.
fn take_int(map: &mut Map<String, Value>, key: &str) -> Result<Option<u64>, String> {
    match map.remove(key) {
        Some(Value::String(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| format!("invalid '{}': expected an integer, got '{}'", key, text)),
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| format!("invalid '{}': {}", key, e)),
    }
}

fn drop_stray_fields(map: &mut Map<String, Value>, table: &VariantTable, what: &str) {
    for field in table.fields() {
        if map.remove(field).is_some() {
            tracing::warn!(field, "dropped stray {} value field", what);
        }
    }
}

fn put(map: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        map.insert(key.to_string(), value);
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_field_lookup_and_fallback() {
        assert_eq!(MATCHER_TABLE.field_for("word"), "words");
        assert_eq!(MATCHER_TABLE.field_for("status"), "status");
        assert_eq!(MATCHER_TABLE.field_for("nonsense"), "words");
        assert_eq!(EXTRACTOR_TABLE.field_for("kval"), "kval");
        assert_eq!(EXTRACTOR_TABLE.field_for(""), "regex");
        assert!(EXTRACTOR_TABLE.knows("xpath"));
        assert!(!EXTRACTOR_TABLE.knows("word"));
    }

    #[test]
    fn test_switch_type_moves_values() {
        let mut entry = object(json!({"type": "word", "words": ["a", "b"]}));
        switch_type(&mut entry, "regex", &MATCHER_TABLE);

        assert_eq!(Value::Object(entry), json!({"type": "regex", "regex": ["a", "b"]}));
    }

    #[test]
    fn test_switch_type_without_old_values_seeds_empty_list() {
        let mut entry = object(json!({"type": "word", "part": "body"}));
        switch_type(&mut entry, "dsl", &MATCHER_TABLE);

        assert_eq!(entry.get("dsl"), Some(&json!([])));
        assert!(entry.get("words").is_none());
        assert_eq!(entry.get("part"), Some(&json!("body")));
    }

    #[test]
    fn test_switch_type_same_field_only_changes_type() {
        let mut entry = object(json!({"type": "regex", "regex": ["x"]}));
        switch_type(&mut entry, "regex", &EXTRACTOR_TABLE);
        assert_eq!(Value::Object(entry), json!({"type": "regex", "regex": ["x"]}));
    }

    #[test]
    fn test_switch_type_drops_group_outside_regex() {
        let mut entry = object(json!({"type": "regex", "regex": ["(a)"], "group": 1}));
        switch_type(&mut entry, "kval", &EXTRACTOR_TABLE);

        assert!(entry.get("group").is_none());
        assert_eq!(entry.get("kval"), Some(&json!(["(a)"])));
    }

    #[test]
    fn test_matcher_switch_kind_serializes_new_field() {
        let mut matcher = Matcher::new(MatcherKind::Word, ["a", "b"]);
        matcher.switch_kind(MatcherKind::Regex);

        let value = serde_json::to_value(&matcher).unwrap();
        assert_eq!(value, json!({"type": "regex", "regex": ["a", "b"]}));
    }

    #[test]
    fn test_extractor_switch_kind_drops_group() {
        let mut extractor = Extractor::new(ExtractorKind::Regex, ["v(\\d+)"]).with_group(1);
        extractor.switch_kind(ExtractorKind::Json);

        assert_eq!(extractor.group, None);
        let value = serde_json::to_value(&extractor).unwrap();
        assert_eq!(value, json!({"type": "json", "json": ["v(\\d+)"]}));
    }

    #[test]
    fn test_matcher_deserialize_keeps_extras_and_drops_strays() {
        let matcher: Matcher = serde_json::from_value(json!({
            "type": "word",
            "words": ["admin"],
            "regex": ["stale"],
            "condition": "and",
            "negative": false,
            "case-insensitive": true
        }))
        .unwrap();

        assert_eq!(matcher.kind, MatcherKind::Word);
        assert_eq!(matcher.values, vec![json!("admin")]);
        assert_eq!(matcher.condition.as_deref(), Some("and"));
        assert_eq!(matcher.negative, Some(false));
        assert_eq!(matcher.extra.get("case-insensitive"), Some(&json!(true)));

        let value = serde_json::to_value(&matcher).unwrap();
        assert!(value.get("regex").is_none());
    }

    #[test]
    fn test_missing_type_defaults() {
        let matcher: Matcher = serde_json::from_value(json!({"words": ["x"]})).unwrap();
        assert_eq!(matcher.kind, MatcherKind::Word);

        let extractor: Extractor = serde_json::from_value(json!({"regex": ["x"]})).unwrap();
        assert_eq!(extractor.kind, ExtractorKind::Regex);
    }

    #[test]
    fn test_unknown_type_is_kept_verbatim() {
        let source = json!({"type": "xpath", "xpath": ["/html/head/title"], "part": "body", "attribute": "href"});
        let matcher: Matcher = serde_json::from_value(source.clone()).unwrap();

        assert_eq!(matcher.unknown_type.as_deref(), Some("xpath"));
        assert!(matcher.values.is_empty());
        assert_eq!(serde_json::to_value(&matcher).unwrap(), source);

        let source = json!({"type": "json-path", "paths": ["$.a"]});
        let extractor: Extractor = serde_json::from_value(source.clone()).unwrap();
        assert_eq!(serde_json::to_value(&extractor).unwrap(), source);

        let bad: Result<Matcher, _> = serde_json::from_value(json!({"type": 3}));
        assert!(bad.is_err());
    }

    #[test]
    fn test_group_accepts_numeric_text() {
        let extractor: Extractor =
            serde_json::from_value(json!({"type": "regex", "regex": ["(a)"], "group": "2"})).unwrap();
        assert_eq!(extractor.group, Some(2));
        assert_eq!(serde_json::to_value(&extractor).unwrap().get("group"), Some(&json!(2)));

        let bad: Result<Extractor, _> = serde_json::from_value(json!({"type": "regex", "group": "two"}));
        assert!(bad.is_err());
    }

    #[test]
    fn test_status_values_keep_numbers() {
        let matcher: Matcher =
            serde_json::from_value(json!({"type": "status", "status": [200, 302]})).unwrap();
        assert!(matcher.kind.is_numeric());
        assert_eq!(matcher.values, vec![json!(200), json!(302)]);
    }
}
