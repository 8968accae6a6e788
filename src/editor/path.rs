//! Addressing editable fields inside a document.
//!
//! A [`FieldPath`] names one form control. Reads and writes go through the
//! JSON object form of the addressed entry, so every protocol shares the same
//! code path and the typed model re-validates each write.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::codec::FieldKind;
use crate::error::{EditorError, EditorResult};
use crate::template::matching::{
    switch_type, MatcherKind, VariantKind, VariantTable, EXTRACTOR_TABLE, MATCHER_TABLE,
};
use crate::template::model::{edit_as_object, to_object};
use crate::template::schema::{self, FieldSpec, CONTENT_KEY};
use crate::template::{Document, Protocol, ProtocolKind, RequestMode};

// =============================================================================
// ADDRESSES
// =============================================================================

/// One request entry: its protocol section and index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestRef {
    pub protocol: ProtocolKind,
    pub index: usize,
}

impl RequestRef {
    pub fn new(protocol: ProtocolKind, index: usize) -> Self {
        Self { protocol, index }
    }

    /// HTTP request `index`.
    pub fn http(index: usize) -> Self {
        Self::new(ProtocolKind::Http, index)
    }
}

/// Ordered sub-entry lists inside a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryList {
    Matchers,
    Extractors,
    Fuzzing,
    Steps,
    Inputs,
}

impl EntryList {
    /// Request key holding the list.
    pub fn key(self) -> &'static str {
        match self {
            EntryList::Matchers => "matchers",
            EntryList::Extractors => "extractors",
            EntryList::Fuzzing => "fuzzing",
            EntryList::Steps => "steps",
            EntryList::Inputs => "inputs",
        }
    }

    /// Singular name, for errors and logs.
    pub fn entry_name(self) -> &'static str {
        match self {
            EntryList::Matchers => "matcher",
            EntryList::Extractors => "extractor",
            EntryList::Fuzzing => "fuzzing rule",
            EntryList::Steps => "step",
            EntryList::Inputs => "input",
        }
    }

    pub fn fields(self) -> &'static [FieldSpec] {
        match self {
            EntryList::Matchers => schema::MATCHER_FIELDS,
            EntryList::Extractors => schema::EXTRACTOR_FIELDS,
            EntryList::Fuzzing => schema::FUZZ_FIELDS,
            EntryList::Steps => schema::STEP_FIELDS,
            EntryList::Inputs => schema::INPUT_FIELDS,
        }
    }

    /// Variant table for lists whose `type` selects the value field.
    pub fn variant_table(self) -> Option<&'static VariantTable> {
        match self {
            EntryList::Matchers => Some(&MATCHER_TABLE),
            EntryList::Extractors => Some(&EXTRACTOR_TABLE),
            _ => None,
        }
    }

    /// Returns true if requests of `protocol` carry this list.
    pub fn applies_to(self, protocol: ProtocolKind) -> bool {
        match self {
            EntryList::Matchers | EntryList::Extractors => protocol != ProtocolKind::Flow,
            EntryList::Fuzzing => protocol == ProtocolKind::Http,
            EntryList::Steps => protocol == ProtocolKind::Headless,
            EntryList::Inputs => protocol == ProtocolKind::Network,
        }
    }

    /// Default entry appended by an "add" action.
    pub fn default_entry(self) -> EditorResult<Value> {
        let value = match self {
            EntryList::Matchers => serde_json::to_value(schema::default_matcher())?,
            EntryList::Extractors => serde_json::to_value(schema::default_extractor())?,
            EntryList::Fuzzing => schema::default_fuzz_rule(),
            EntryList::Steps => serde_json::to_value(schema::default_step())?,
            EntryList::Inputs => serde_json::to_value(schema::default_input())?,
        };
        Ok(value)
    }
}

/// Address of one form control.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "camelCase")]
pub enum FieldPath {
    /// The template id.
    Id,
    /// A flow document's script.
    Flow,
    /// A key of the `info` block.
    Info { field: String },
    /// A plain key of a request entry.
    Request { request: RequestRef, field: String },
    /// A key of a sub-entry (matcher, extractor, fuzz rule, step, input).
    Entry {
        request: RequestRef,
        list: EntryList,
        index: usize,
        field: String,
    },
}

impl FieldPath {
    pub fn info(field: impl Into<String>) -> Self {
        FieldPath::Info {
            field: field.into(),
        }
    }

    pub fn request(request: RequestRef, field: impl Into<String>) -> Self {
        FieldPath::Request {
            request,
            field: field.into(),
        }
    }

    pub fn entry(request: RequestRef, list: EntryList, index: usize, field: impl Into<String>) -> Self {
        FieldPath::Entry {
            request,
            list,
            index,
            field: field.into(),
        }
    }

    /// The request this path lives in, if any.
    pub fn request_ref(&self) -> Option<RequestRef> {
        match self {
            FieldPath::Request { request, .. } | FieldPath::Entry { request, .. } => Some(*request),
            _ => None,
        }
    }

    /// Field key at the end of the path.
    pub fn field(&self) -> &str {
        match self {
            FieldPath::Id => "id",
            FieldPath::Flow => "flow",
            FieldPath::Info { field } | FieldPath::Request { field, .. } | FieldPath::Entry { field, .. } => field,
        }
    }
}

// =============================================================================
// SCHEMA LOOKUP
// =============================================================================

/// Resolves the schema entry for `path`, given the document's current state.
///
/// Matcher value lists switch to [`FieldKind::IntegerList`] for status and size
/// matchers.
pub fn field_spec(doc: &Document, path: &FieldPath) -> EditorResult<FieldSpec> {
    match path {
        FieldPath::Id => Ok(schema::ID_FIELD),
        FieldPath::Flow => match doc.protocol_kind() {
            Some(ProtocolKind::Flow) => Ok(schema::FLOW_FIELD),
            _ => Err(EditorError::protocol_mismatch("flow", doc.protocol_label())),
        },
        FieldPath::Info { field } => schema::find_field(schema::INFO_FIELDS, field)
            .copied()
            .ok_or_else(|| EditorError::unknown_field("info", field.as_str())),
        FieldPath::Request { request, field } => {
            if request.protocol == ProtocolKind::Http && field == schema::MODE_KEY {
                return Ok(schema::MODE_FIELD);
            }
            plain_field(doc, *request, field).copied()
        }
        FieldPath::Entry {
            request,
            list,
            index,
            field,
        } => {
            check_list(doc, *request, *list)?;
            let mut spec = schema::find_field(list.fields(), field)
                .copied()
                .ok_or_else(|| EditorError::unknown_field(list.entry_name(), field.as_str()))?;

            if *list == EntryList::Matchers && field == CONTENT_KEY {
                let entry = read_entry(doc, *request, *list, *index)?;
                let kind = entry
                    .get("type")
                    .and_then(Value::as_str)
                    .and_then(MatcherKind::from_name)
                    .unwrap_or(MatcherKind::DEFAULT);
                spec.kind = schema::matcher_content_kind(kind);
            }
            Ok(spec)
        }
    }
}

/// Schema entry of a plain request field, valid in the request's current mode.
fn plain_field(doc: &Document, request: RequestRef, field: &str) -> EditorResult<&'static FieldSpec> {
    let mode = request_mode(doc, request)?;
    if let Some(spec) = schema::request_field(request.protocol, mode, field) {
        return Ok(spec);
    }
    let other_mode = RequestMode::ALL
        .iter()
        .any(|m| schema::request_field(request.protocol, *m, field).is_some());
    if other_mode {
        Err(EditorError::mode_mismatch(field, mode.as_str()))
    } else {
        Err(EditorError::unknown_field(request.protocol.key(), field))
    }
}

/// Fails unless `list` can be edited on the request as it stands.
/// Fuzzing rules only exist in fuzzing mode.
fn check_list(doc: &Document, request: RequestRef, list: EntryList) -> EditorResult<()> {
    if !list.applies_to(request.protocol) {
        return Err(EditorError::unknown_field(request.protocol.key(), list.key()));
    }
    if list == EntryList::Fuzzing {
        let mode = request_mode(doc, request)?;
        if mode != RequestMode::Fuzzing {
            return Err(EditorError::mode_mismatch(list.key(), mode.as_str()));
        }
    }
    Ok(())
}

// =============================================================================
// READ
// =============================================================================

fn mode_of(req: &Map<String, Value>) -> RequestMode {
    if req.contains_key("raw") {
        RequestMode::Raw
    } else if req.contains_key("fuzzing") {
        RequestMode::Fuzzing
    } else {
        RequestMode::Standard
    }
}

/// Mode of the request at `request`. Only HTTP requests leave standard mode.
pub fn request_mode(doc: &Document, request: RequestRef) -> EditorResult<RequestMode> {
    if request.protocol != ProtocolKind::Http {
        return Ok(RequestMode::Standard);
    }
    Ok(mode_of(&read_request(doc, request)?))
}

fn section<'a>(doc: &'a Document, request: RequestRef) -> EditorResult<&'a Protocol> {
    doc.section(request.protocol)
        .ok_or_else(|| EditorError::request_not_found(request.protocol.key(), request.index))
}

fn section_mut(doc: &mut Document, request: RequestRef) -> EditorResult<&mut Protocol> {
    doc.section_mut(request.protocol)
        .ok_or_else(|| EditorError::request_not_found(request.protocol.key(), request.index))
}

/// The request at `request` in object form.
pub fn read_request(doc: &Document, request: RequestRef) -> EditorResult<Map<String, Value>> {
    section(doc, request)?.request_value(request.index)
}

/// Entries of `list` in a request, in object form.
pub fn read_entries(doc: &Document, request: RequestRef, list: EntryList) -> EditorResult<Vec<Map<String, Value>>> {
    let req = read_request(doc, request)?;
    let entries = match req.get(list.key()) {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::Object(map) => map.clone(),
                _ => Map::new(),
            })
            .collect(),
        _ => Vec::new(),
    };
    Ok(entries)
}

fn read_entry(doc: &Document, request: RequestRef, list: EntryList, index: usize) -> EditorResult<Map<String, Value>> {
    read_entries(doc, request, list)?
        .into_iter()
        .nth(index)
        .ok_or_else(|| EditorError::entry_not_found(list.entry_name(), request.index, index))
}

/// Key the entry stores `field` under. `content` resolves through the variant table.
fn entry_key(list: EntryList, entry: &Map<String, Value>, field: &str) -> String {
    match (list.variant_table(), field) {
        (Some(table), CONTENT_KEY) => {
            let kind = entry.get("type").and_then(Value::as_str).unwrap_or_default();
            table.field_for(kind).to_string()
        }
        _ => field.to_string(),
    }
}

/// Current stored value at `path`; `Value::Null` when absent.
pub fn read_field(doc: &Document, path: &FieldPath) -> EditorResult<Value> {
    let value = match path {
        FieldPath::Id => Value::String(doc.id.clone()),
        FieldPath::Flow => match &doc.protocol {
            Some(Protocol::Flow(flow)) => flow.script.clone().map(Value::String).unwrap_or(Value::Null),
            _ => Value::Null,
        },
        FieldPath::Info { field } => to_object(&doc.info)?.remove(field).unwrap_or(Value::Null),
        FieldPath::Request { request, field } => {
            if request.protocol == ProtocolKind::Http && field == schema::MODE_KEY {
                Value::String(request_mode(doc, *request)?.as_str().to_string())
            } else {
                read_request(doc, *request)?.remove(field).unwrap_or(Value::Null)
            }
        }
        FieldPath::Entry {
            request,
            list,
            index,
            field,
        } => {
            let mut entry = read_entry(doc, *request, *list, *index)?;
            let key = entry_key(*list, &entry, field);
            entry.remove(&key).unwrap_or(Value::Null)
        }
    };
    Ok(value)
}

// =============================================================================
// WRITE
// =============================================================================

fn set_or_remove(map: &mut Map<String, Value>, key: &str, value: Value) {
    if value.is_null() {
        map.remove(key);
    } else {
        map.insert(key.to_string(), value);
    }
}

/// Edits entry `index` of `list` in its object form.
fn edit_entry<R>(
    doc: &mut Document,
    request: RequestRef,
    list: EntryList,
    index: usize,
    f: impl FnOnce(&mut Map<String, Value>) -> R,
) -> EditorResult<R> {
    let missing = EditorError::entry_not_found(list.entry_name(), request.index, index);
    section_mut(doc, request)?
        .edit_request(request.index, |req| {
            req.get_mut(list.key())
                .and_then(Value::as_array_mut)
                .and_then(|items| items.get_mut(index))
                .and_then(Value::as_object_mut)
                .map(f)
        })?
        .ok_or(missing)
}

/// Stores `value` at `path`. `Value::Null` removes the key.
pub fn write_field(doc: &mut Document, path: &FieldPath, value: Value) -> EditorResult<()> {
    match path {
        FieldPath::Id => {
            doc.id = value.as_str().unwrap_or_default().to_string();
            Ok(())
        }
        FieldPath::Flow => {
            let actual = doc.protocol_label();
            match &mut doc.protocol {
                Some(Protocol::Flow(flow)) => {
                    flow.script = value.as_str().map(str::to_string);
                    Ok(())
                }
                _ => Err(EditorError::protocol_mismatch("flow", actual)),
            }
        }
        FieldPath::Info { field } => edit_as_object(&mut doc.info, |info| set_or_remove(info, field, value)),
        FieldPath::Request { request, field } => {
            plain_field(doc, *request, field)?;
            section_mut(doc, *request)?.edit_request(request.index, |req| set_or_remove(req, field, value))
        }
        FieldPath::Entry {
            request,
            list,
            index,
            field,
        } => edit_entry(doc, *request, *list, *index, |entry| {
            let key = entry_key(*list, entry, field);
            set_or_remove(entry, &key, value);
        }),
    }
}

/// Changes the `type` of a matcher or extractor, carrying its values over.
pub fn switch_entry_type(
    doc: &mut Document,
    request: RequestRef,
    list: EntryList,
    index: usize,
    new_type: &str,
) -> EditorResult<()> {
    let table = list
        .variant_table()
        .ok_or_else(|| EditorError::unknown_field(list.entry_name(), "type"))?;
    if !table.knows(new_type) {
        return Err(crate::error::CodecError::invalid_value("type", new_type).into());
    }
    edit_entry(doc, request, list, index, |entry| switch_type(entry, new_type, table))
}

/// Appends `entry` to `list`, returning its index.
///
/// The next list is built first and then swapped in.
pub fn push_entry(doc: &mut Document, request: RequestRef, list: EntryList, entry: Value) -> EditorResult<usize> {
    check_list(doc, request, list)?;
    section_mut(doc, request)?.edit_request(request.index, |req| {
        let mut next = match req.get(list.key()) {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        };
        next.push(entry);
        let index = next.len() - 1;
        req.insert(list.key().to_string(), Value::Array(next));
        index
    })
}

/// Removes entry `index` from `list`, returning the remaining count.
pub fn remove_entry(doc: &mut Document, request: RequestRef, list: EntryList, index: usize) -> EditorResult<usize> {
    let missing = EditorError::entry_not_found(list.entry_name(), request.index, index);
    section_mut(doc, request)?
        .edit_request(request.index, |req| {
            let items = match req.get(list.key()) {
                Some(Value::Array(items)) if index < items.len() => items,
                _ => return None,
            };
            let next: Vec<Value> = items
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != index)
                .map(|(_, v)| v.clone())
                .collect();
            let remaining = next.len();
            req.insert(list.key().to_string(), Value::Array(next));
            Some(remaining)
        })?
        .ok_or(missing)
}

/// Number of requests in the section for `protocol`.
pub fn request_count(doc: &Document, protocol: ProtocolKind) -> usize {
    doc.section(protocol).map_or(0, Protocol::len)
}

// =============================================================================
// TESTS
// =============================================================================
