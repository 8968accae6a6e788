//! Data models for scanner template documents.
//!
//! A [`Document`] is the structured body of one template. Its protocol section
//! is an explicit sum type; unknown keys at every level are kept in `extra`
//! maps so that imported templates survive a load/save cycle unchanged.

use indexmap::IndexMap;
use serde::de::{DeserializeOwned, Error as _};
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use super::matching::{Extractor, Matcher};
use crate::error::{EditorError, EditorResult, FormatError, FormatResult};
use crate::format;

/// Ordered map of keys this model does not know about.
pub type Extra = IndexMap<String, Value>;

// =============================================================================
// PROTOCOL KIND
// =============================================================================

/// Protocol section keys, in the order they are written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    Http,
    Dns,
    Network,
    Headless,
    File,
    Javascript,
    Code,
    Flow,
}

impl ProtocolKind {
    /// Every protocol that holds request entries (everything but `Flow`).
    pub const REQUEST_KINDS: [ProtocolKind; 7] = [
        ProtocolKind::Http,
        ProtocolKind::Dns,
        ProtocolKind::Network,
        ProtocolKind::Headless,
        ProtocolKind::File,
        ProtocolKind::Javascript,
        ProtocolKind::Code,
    ];

    /// Top-level document key.
    pub fn key(self) -> &'static str {
        match self {
            ProtocolKind::Http => "http",
            ProtocolKind::Dns => "dns",
            ProtocolKind::Network => "network",
            ProtocolKind::Headless => "headless",
            ProtocolKind::File => "file",
            ProtocolKind::Javascript => "javascript",
            ProtocolKind::Code => "code",
            ProtocolKind::Flow => "flow",
        }
    }

    /// Display label used in listings and section headers.
    pub fn label(self) -> &'static str {
        match self {
            ProtocolKind::Http => "HTTP",
            ProtocolKind::Dns => "DNS",
            ProtocolKind::Network => "Network",
            ProtocolKind::Headless => "Headless",
            ProtocolKind::File => "File",
            ProtocolKind::Javascript => "JavaScript",
            ProtocolKind::Code => "Code",
            ProtocolKind::Flow => "Flow",
        }
    }

    /// Parses a document key.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "http" => Some(ProtocolKind::Http),
            "dns" => Some(ProtocolKind::Dns),
            "network" => Some(ProtocolKind::Network),
            "headless" => Some(ProtocolKind::Headless),
            "file" => Some(ProtocolKind::File),
            "javascript" => Some(ProtocolKind::Javascript),
            "code" => Some(ProtocolKind::Code),
            "flow" => Some(ProtocolKind::Flow),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// INFO BLOCK
// =============================================================================

/// Template severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Low,
    Medium,
    High,
    Critical,
    Unknown,
}

impl Severity {
    /// Serialized name.
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
            Severity::Unknown => "unknown",
        }
    }

    /// Parses a severity name, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "info" => Some(Severity::Info),
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            "unknown" => Some(Severity::Unknown),
            _ => None,
        }
    }
}

/// Reads `severity`, treating an empty string as absent.
fn severity_or_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Severity>, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(name) => Severity::from_name(name)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("unknown severity '{}'", name))),
    }
}

/// Reads an integer written as a number or as numeric text. Empty text is absent.
fn int_or_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Int(n)) => Ok(Some(n)),
        Some(Raw::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(Raw::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("expected an integer, got '{}'", text))),
    }
}

/// A value written either as a single string or as a list of strings.
///
/// Used for `author`, `tags` and `reference`, which appear in both shapes in
/// the wild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl Default for StringOrList {
    fn default() -> Self {
        StringOrList::One(String::new())
    }
}

impl StringOrList {
    /// Returns true for `""` and `[]`.
    pub fn is_empty(&self) -> bool {
        match self {
            StringOrList::One(s) => s.is_empty(),
            StringOrList::Many(v) => v.is_empty(),
        }
    }

    /// Returns true if any entry contains `needle` (already lowercased).
    pub fn contains_lowercase(&self, needle: &str) -> bool {
        match self {
            StringOrList::One(s) => s.to_lowercase().contains(needle),
            StringOrList::Many(v) => v.iter().any(|s| s.to_lowercase().contains(needle)),
        }
    }
}

impl From<&str> for StringOrList {
    fn from(value: &str) -> Self {
        StringOrList::One(value.to_string())
    }
}

/// The `info` block of a template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Info {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub author: StringOrList,

    #[serde(
        default,
        deserialize_with = "severity_or_empty",
        skip_serializing_if = "Option::is_none"
    )]
    pub severity: Option<Severity>,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub tags: StringOrList,

    /// Either one URL or a list of URLs. Empty is written as `""`.
    #[serde(default)]
    pub reference: StringOrList,

    #[serde(default)]
    pub metadata: Extra,

    #[serde(flatten)]
    pub extra: Extra,
}

// =============================================================================
// REQUEST ENTRIES
// =============================================================================

/// Mutually exclusive ways of describing an HTTP request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestMode {
    #[default]
    Standard,
    Raw,
    Fuzzing,
}

impl RequestMode {
    pub const ALL: [RequestMode; 3] = [RequestMode::Standard, RequestMode::Raw, RequestMode::Fuzzing];

    /// Serialized name.
    pub fn as_str(self) -> &'static str {
        match self {
            RequestMode::Standard => "standard",
            RequestMode::Raw => "raw",
            RequestMode::Fuzzing => "fuzzing",
        }
    }

    /// Parses a mode name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "standard" => Some(RequestMode::Standard),
            "raw" => Some(RequestMode::Raw),
            "fuzzing" => Some(RequestMode::Fuzzing),
            _ => None,
        }
    }
}

/// Default request text seeded when a request first enters raw mode.
pub const DEFAULT_RAW_REQUEST: &str = "POST /path HTTP/1.1\nHost: {{Hostname}}\nContent-Type: application/x-www-form-urlencoded\n\nkey=value";

/// One HTTP request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<String>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub headers: IndexMap<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    /// Present (even when empty) only in raw mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Vec<String>>,

    /// Present (even when empty) only in fuzzing mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuzzing: Option<Vec<FuzzRule>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matchers: Vec<Matcher>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extractors: Vec<Extractor>,

    #[serde(flatten)]
    pub extra: Extra,
}

impl HttpRequest {
    /// Creates a standard-mode request for `method` and `path`.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: Some(method.into()),
            path: vec![path.into()],
            ..Default::default()
        }
    }

    /// Current request mode. Raw wins over fuzzing.
    pub fn mode(&self) -> RequestMode {
        if self.raw.is_some() {
            RequestMode::Raw
        } else if self.fuzzing.is_some() {
            RequestMode::Fuzzing
        } else {
            RequestMode::Standard
        }
    }

    /// Moves the request into `mode`, clearing fields owned by the other modes.
    ///
    /// The first entry into raw or fuzzing seeds a skeleton value.
    pub fn enter_mode(&mut self, mode: RequestMode) {
        match mode {
            RequestMode::Raw => {
                if self.raw.as_ref().map_or(true, |r| r.is_empty()) {
                    self.raw = Some(vec![DEFAULT_RAW_REQUEST.to_string()]);
                }
                self.method = None;
                self.path.clear();
                self.body = None;
                self.headers.clear();
                self.fuzzing = None;
            }
            RequestMode::Fuzzing => {
                if self.fuzzing.is_none() {
                    self.fuzzing = Some(Vec::new());
                }
                self.raw = None;
            }
            RequestMode::Standard => {
                if self.method.is_none() {
                    self.method = Some("GET".to_string());
                }
                if self.path.is_empty() {
                    self.path = vec!["{{BaseURL}}".to_string()];
                }
                self.raw = None;
                self.fuzzing = None;
            }
        }
    }
}

/// A DAST fuzzing instruction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FuzzRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<String>,

    #[serde(rename = "keys-regex", default, skip_serializing_if = "Vec::is_empty")]
    pub keys_regex: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preconditions: Vec<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub analyzers: Vec<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuzz: Option<FuzzValues>,

    #[serde(flatten)]
    pub extra: Extra,
}

/// Fuzz payloads: a plain list, or a map of key to payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FuzzValues {
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

/// One DNS request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DnsRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub record_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recursion: Option<bool>,

    #[serde(default, deserialize_with = "int_or_text", skip_serializing_if = "Option::is_none")]
    pub retries: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matchers: Vec<Matcher>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extractors: Vec<Extractor>,

    #[serde(flatten)]
    pub extra: Extra,
}

/// One network (TCP) request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkRequest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub host: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<NetworkInput>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matchers: Vec<Matcher>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extractors: Vec<Extractor>,

    #[serde(flatten)]
    pub extra: Extra,
}

/// Data written to a network connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkInput {
    #[serde(default)]
    pub data: String,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(flatten)]
    pub extra: Extra,
}

/// One headless browser request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadlessRequest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<HeadlessStep>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matchers: Vec<Matcher>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extractors: Vec<Extractor>,

    #[serde(flatten)]
    pub extra: Extra,
}

/// A browser action with free-form JSON arguments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadlessStep {
    #[serde(default)]
    pub action: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,

    #[serde(flatten)]
    pub extra: Extra,
}

/// One file-scanning request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileRequest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<String>,

    #[serde(rename = "max-size", default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matchers: Vec<Matcher>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extractors: Vec<Extractor>,

    #[serde(flatten)]
    pub extra: Extra,
}

/// One JavaScript protocol request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JavascriptRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matchers: Vec<Matcher>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extractors: Vec<Extractor>,

    #[serde(flatten)]
    pub extra: Extra,
}

/// One code protocol request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeRequest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub engine: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matchers: Vec<Matcher>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extractors: Vec<Extractor>,

    #[serde(flatten)]
    pub extra: Extra,
}

// =============================================================================
// PROTOCOL SECTION
// =============================================================================

/// The protocol section of a document.
#[derive(Debug, Clone, PartialEq)]
pub enum Protocol {
    Http(Vec<HttpRequest>),
    Dns(Vec<DnsRequest>),
    Network(Vec<NetworkRequest>),
    Headless(Vec<HeadlessRequest>),
    File(Vec<FileRequest>),
    Javascript(Vec<JavascriptRequest>),
    Code(Vec<CodeRequest>),
    Flow(FlowSection),
}

/// A flow script driving several protocol sections.
///
/// `sections` never contains a nested `Protocol::Flow`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowSection {
    pub script: Option<String>,
    pub sections: Vec<Protocol>,
}

/// Runs `$body` with `$reqs` bound to the request vector of a non-flow section.
macro_rules! with_requests {
    ($section:expr, $reqs:ident => $body:expr, flow => $flow:expr) => {
        match $section {
            Protocol::Http($reqs) => $body,
            Protocol::Dns($reqs) => $body,
            Protocol::Network($reqs) => $body,
            Protocol::Headless($reqs) => $body,
            Protocol::File($reqs) => $body,
            Protocol::Javascript($reqs) => $body,
            Protocol::Code($reqs) => $body,
            Protocol::Flow(_) => $flow,
        }
    };
}

impl Protocol {
    /// Creates an empty section for `kind`.
    pub fn empty(kind: ProtocolKind) -> Self {
        match kind {
            ProtocolKind::Http => Protocol::Http(Vec::new()),
            ProtocolKind::Dns => Protocol::Dns(Vec::new()),
            ProtocolKind::Network => Protocol::Network(Vec::new()),
            ProtocolKind::Headless => Protocol::Headless(Vec::new()),
            ProtocolKind::File => Protocol::File(Vec::new()),
            ProtocolKind::Javascript => Protocol::Javascript(Vec::new()),
            ProtocolKind::Code => Protocol::Code(Vec::new()),
            ProtocolKind::Flow => Protocol::Flow(FlowSection::default()),
        }
    }

    /// The section's kind.
    pub fn kind(&self) -> ProtocolKind {
        match self {
            Protocol::Http(_) => ProtocolKind::Http,
            Protocol::Dns(_) => ProtocolKind::Dns,
            Protocol::Network(_) => ProtocolKind::Network,
            Protocol::Headless(_) => ProtocolKind::Headless,
            Protocol::File(_) => ProtocolKind::File,
            Protocol::Javascript(_) => ProtocolKind::Javascript,
            Protocol::Code(_) => ProtocolKind::Code,
            Protocol::Flow(_) => ProtocolKind::Flow,
        }
    }

    /// Number of request entries (sum over sections for a flow).
    pub fn len(&self) -> usize {
        with_requests!(self, reqs => reqs.len(), flow => match self {
            Protocol::Flow(flow) => flow.sections.iter().map(Protocol::len).sum(),
            _ => 0,
        })
    }

    /// Returns true if the section has no request entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serializes request `index` to a JSON object.
    pub fn request_value(&self, index: usize) -> EditorResult<Map<String, Value>> {
        let kind = self.kind();
        with_requests!(self, reqs => {
            let req = reqs
                .get(index)
                .ok_or_else(|| EditorError::request_not_found(kind.key(), index))?;
            to_object(req)
        }, flow => Err(EditorError::protocol_mismatch("a request section", kind.key())))
    }

    /// Applies `f` to request `index` in its JSON object form, then converts back.
    ///
    /// The request is only replaced if the edited object still deserializes.
    pub fn edit_request<R>(
        &mut self,
        index: usize,
        f: impl FnOnce(&mut Map<String, Value>) -> R,
    ) -> EditorResult<R> {
        let kind = self.kind();
        with_requests!(self, reqs => {
            let req = reqs
                .get_mut(index)
                .ok_or_else(|| EditorError::request_not_found(kind.key(), index))?;
            edit_as_object(req, f)
        }, flow => Err(EditorError::protocol_mismatch("a request section", kind.key())))
    }

    /// Appends a request and returns its index.
    pub fn push_request(&mut self, request: Value) -> EditorResult<usize> {
        let kind = self.kind();
        with_requests!(self, reqs => {
            reqs.push(serde_json::from_value(request)?);
            Ok(reqs.len() - 1)
        }, flow => Err(EditorError::protocol_mismatch("a request section", kind.key())))
    }

    /// Removes request `index`, returning the new request count.
    pub fn remove_request(&mut self, index: usize) -> EditorResult<usize> {
        let kind = self.kind();
        with_requests!(self, reqs => {
            if index >= reqs.len() {
                return Err(EditorError::request_not_found(kind.key(), index));
            }
            reqs.remove(index);
            Ok(reqs.len())
        }, flow => Err(EditorError::protocol_mismatch("a request section", kind.key())))
    }

    /// Iterates over the request sections: itself, or a flow's sections.
    pub fn sections(&self) -> Vec<&Protocol> {
        match self {
            Protocol::Flow(flow) => flow.sections.iter().collect(),
            other => vec![other],
        }
    }
}

// =============================================================================
// DOCUMENT
// =============================================================================

/// The structured body of one template.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub id: String,
    pub info: Info,
    pub protocol: Option<Protocol>,
    pub extra: Extra,
    /// Top-level key order read from the source, when it differs from the
    /// written order. Keys missing here are written after these.
    pub key_order: Vec<String>,
}

impl Document {
    /// Creates a document with the given id and display name and no protocol.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            info: Info {
                name: name.into(),
                severity: Some(Severity::Info),
                ..Default::default()
            },
            protocol: None,
            extra: Extra::new(),
            key_order: Vec::new(),
        }
    }

    /// Builder: Set the protocol section.
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    /// Builder: Set severity.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.info.severity = Some(severity);
        self
    }

    /// Builder: Set author.
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.info.author = StringOrList::One(author.into());
        self
    }

    /// Name shown for this document: `info.name`, or the id when that is empty.
    pub fn display_name(&self) -> &str {
        if self.info.name.is_empty() {
            &self.id
        } else {
            &self.info.name
        }
    }

    /// Kind of the protocol section, if any.
    pub fn protocol_kind(&self) -> Option<ProtocolKind> {
        self.protocol.as_ref().map(Protocol::kind)
    }

    /// Label used in template listings. Documents without a section list as HTTP.
    pub fn protocol_label(&self) -> &'static str {
        self.protocol_kind().unwrap_or(ProtocolKind::Http).label()
    }

    /// The request section for `kind`, looking inside a flow when needed.
    pub fn section(&self, kind: ProtocolKind) -> Option<&Protocol> {
        match self.protocol.as_ref()? {
            Protocol::Flow(flow) => flow.sections.iter().find(|s| s.kind() == kind),
            section if section.kind() == kind => Some(section),
            _ => None,
        }
    }

    /// Mutable access to the request section for `kind`.
    pub fn section_mut(&mut self, kind: ProtocolKind) -> Option<&mut Protocol> {
        match self.protocol.as_mut()? {
            Protocol::Flow(flow) => flow.sections.iter_mut().find(|s| s.kind() == kind),
            section if section.kind() == kind => Some(section),
            _ => None,
        }
    }

    /// Request sections in document order.
    pub fn sections(&self) -> Vec<&Protocol> {
        self.protocol.as_ref().map(Protocol::sections).unwrap_or_default()
    }

    /// Mutable access to HTTP request `index`.
    pub fn http_request_mut(&mut self, index: usize) -> EditorResult<&mut HttpRequest> {
        let actual = self.protocol_label();
        match self.section_mut(ProtocolKind::Http) {
            Some(Protocol::Http(reqs)) => reqs
                .get_mut(index)
                .ok_or_else(|| EditorError::request_not_found("http", index)),
            _ => Err(EditorError::protocol_mismatch("http", actual)),
        }
    }

    /// Converts the document to its JSON value form (unpruned).
    pub fn to_value(&self) -> EditorResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Builds a document from a parsed value.
    pub fn from_value(value: Value) -> FormatResult<Self> {
        serde_json::from_value(value).map_err(|e| FormatError::invalid_template(e.to_string()))
    }

    /// Returns the pruned JSON value form.
    pub fn pruned(&self) -> EditorResult<Value> {
        Ok(format::prune(&self.to_value()?))
    }

    /// Canonical YAML: pruned, insertion ordered, unwrapped.
    pub fn canonical_yaml(&self) -> EditorResult<String> {
        format::to_text(&self.pruned()?)
    }
}

/// Top-level keys in the order [`RawDocument`] writes them. Others follow.
const WRITTEN_ORDER: [&str; 10] = [
    "id", "info", "flow", "http", "dns", "network", "headless", "file", "javascript", "code",
];

/// `seen` if it differs from the order the document would be written in, else empty.
fn source_order(seen: Vec<String>) -> Vec<String> {
    let rank = |key: &String| {
        WRITTEN_ORDER
            .iter()
            .position(|k| k == key)
            .unwrap_or(WRITTEN_ORDER.len())
    };
    let mut written = seen.clone();
    written.sort_by_key(rank);
    if written == seen {
        Vec::new()
    } else {
        seen
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let raw = RawDocument::from(self.clone());
        if self.key_order.is_empty() {
            return raw.serialize(serializer);
        }

        let map = match serde_json::to_value(&raw).map_err(S::Error::custom)? {
            Value::Object(map) => map,
            other => return other.serialize(serializer),
        };
        let mut ordered = Map::new();
        for key in &self.key_order {
            if let Some(value) = map.get(key) {
                ordered.insert(key.clone(), value.clone());
            }
        }
        for (key, value) in map {
            if !ordered.contains_key(&key) {
                ordered.insert(key, value);
            }
        }
        ordered.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        let seen: Vec<String> = map.keys().cloned().collect();
        let raw: RawDocument = serde_json::from_value(Value::Object(map)).map_err(D::Error::custom)?;

        let mut document = Document::from(raw);
        document.key_order = source_order(seen);
        Ok(document)
    }
}

/// Wire shape of a document: one optional key per protocol.
#[derive(Serialize, Deserialize)]
struct RawDocument {
    #[serde(default)]
    id: String,

    #[serde(default)]
    info: Info,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    flow: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    http: Option<Vec<HttpRequest>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    dns: Option<Vec<DnsRequest>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    network: Option<Vec<NetworkRequest>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    headless: Option<Vec<HeadlessRequest>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    file: Option<Vec<FileRequest>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    javascript: Option<Vec<JavascriptRequest>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    code: Option<Vec<CodeRequest>>,

    #[serde(flatten)]
    extra: Extra,
}

impl From<RawDocument> for Document {
    fn from(raw: RawDocument) -> Self {
        let mut sections = Vec::new();
        if let Some(reqs) = raw.http {
            sections.push(Protocol::Http(reqs));
        }
        if let Some(reqs) = raw.dns {
            sections.push(Protocol::Dns(reqs));
        }
        if let Some(reqs) = raw.network {
            sections.push(Protocol::Network(reqs));
        }
        if let Some(reqs) = raw.headless {
            sections.push(Protocol::Headless(reqs));
        }
        if let Some(reqs) = raw.file {
            sections.push(Protocol::File(reqs));
        }
        if let Some(reqs) = raw.javascript {
            sections.push(Protocol::Javascript(reqs));
        }
        if let Some(reqs) = raw.code {
            sections.push(Protocol::Code(reqs));
        }

        let protocol = if raw.flow.is_some() || sections.len() > 1 {
            Some(Protocol::Flow(FlowSection {
                script: raw.flow,
                sections,
            }))
        } else {
            sections.pop()
        };

        Document {
            id: raw.id,
            info: raw.info,
            protocol,
            extra: raw.extra,
            key_order: Vec::new(),
        }
    }
}

impl From<Document> for RawDocument {
    fn from(doc: Document) -> Self {
        let mut raw = RawDocument {
            id: doc.id,
            info: doc.info,
            flow: None,
            http: None,
            dns: None,
            network: None,
            headless: None,
            file: None,
            javascript: None,
            code: None,
            extra: doc.extra,
        };

        let sections = match doc.protocol {
            Some(Protocol::Flow(flow)) => {
                raw.flow = flow.script;
                flow.sections
            }
            Some(section) => vec![section],
            None => Vec::new(),
        };

        for section in sections {
            match section {
                Protocol::Http(r) => raw.http.get_or_insert_with(Vec::new).extend(r),
                Protocol::Dns(r) => raw.dns.get_or_insert_with(Vec::new).extend(r),
                Protocol::Network(r) => raw.network.get_or_insert_with(Vec::new).extend(r),
                Protocol::Headless(r) => raw.headless.get_or_insert_with(Vec::new).extend(r),
                Protocol::File(r) => raw.file.get_or_insert_with(Vec::new).extend(r),
                Protocol::Javascript(r) => raw.javascript.get_or_insert_with(Vec::new).extend(r),
                Protocol::Code(r) => raw.code.get_or_insert_with(Vec::new).extend(r),
                Protocol::Flow(_) => {
                    tracing::warn!("nested flow section dropped during serialization");
                }
            }
        }

        raw
    }
}

// =============================================================================
// OBJECT-FORM EDITING
// =============================================================================

/// Serializes `item` to a JSON object.
pub(crate) fn to_object<T: Serialize>(item: &T) -> EditorResult<Map<String, Value>> {
    match serde_json::to_value(item)? {
        Value::Object(map) => Ok(map),
        other => Err(EditorError::serialization(format!(
            "expected an object, got {}",
            other
        ))),
    }
}

/// Edits `item` through its JSON object form.
///
/// `f` works on a copy; `item` is replaced only when the result converts back.
pub(crate) fn edit_as_object<T, R>(
    item: &mut T,
    f: impl FnOnce(&mut Map<String, Value>) -> R,
) -> EditorResult<R>
where
    T: Serialize + DeserializeOwned,
{
    let mut map = to_object(item)?;
    let result = f(&mut map);
    *item = serde_json::from_value(Value::Object(map))?;
    Ok(result)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_section_detection() {
        let doc = Document::from_value(json!({
            "id": "a",
            "info": {"name": "A"},
            "dns": [{"name": "{{FQDN}}", "type": "A"}]
        }))
        .unwrap();

        assert_eq!(doc.protocol_kind(), Some(ProtocolKind::Dns));
        assert_eq!(doc.protocol_label(), "DNS");
        match doc.protocol.unwrap() {
            Protocol::Dns(reqs) => assert_eq!(reqs[0].record_type.as_deref(), Some("A")),
            other => panic!("unexpected section {:?}", other),
        }
    }

    #[test]
    fn test_flow_detection_from_script_or_many_sections() {
        let scripted = Document::from_value(json!({
            "id": "f", "info": {}, "flow": "http(1)", "http": []
        }))
        .unwrap();
        assert_eq!(scripted.protocol_kind(), Some(ProtocolKind::Flow));

        let multi = Document::from_value(json!({
            "id": "m", "info": {}, "http": [], "dns": []
        }))
        .unwrap();
        match &multi.protocol {
            Some(Protocol::Flow(flow)) => {
                assert!(flow.script.is_none());
                assert_eq!(flow.sections.len(), 2);
            }
            other => panic!("unexpected section {:?}", other),
        }
        assert!(multi.section(ProtocolKind::Dns).is_some());
        assert!(multi.section(ProtocolKind::Code).is_none());
    }

    #[test]
    fn test_unknown_keys_survive() {
        let value = json!({
            "id": "x",
            "info": {"name": "X", "classification": {"cve-id": "CVE-1"}},
            "variables": {"a": "b"},
            "http": [{"method": "GET", "path": ["/"], "stop-at-first-match": true}]
        });
        let doc = Document::from_value(value).unwrap();
        assert!(doc.extra.contains_key("variables"));
        assert!(doc.info.extra.contains_key("classification"));

        let back = doc.to_value().unwrap();
        assert_eq!(back["http"][0]["stop-at-first-match"], json!(true));
        assert_eq!(back["info"]["classification"]["cve-id"], json!("CVE-1"));
    }

    #[test]
    fn test_top_level_key_order_survives() {
        let text = "id: x\ninfo:\n  name: X\nvariables:\n  a: b\nhttp:\n- method: GET\n";
        let doc = format::parse_document(text).unwrap();
        assert_eq!(doc.canonical_yaml().unwrap(), text);

        let stored = serde_json::to_string(&doc).unwrap();
        let back: Document = serde_json::from_str(&stored).unwrap();
        assert_eq!(back, doc);

        let written = Document::from_value(json!({"id": "y", "info": {"name": "Y"}, "http": [{}], "variables": {}}))
            .unwrap();
        assert!(written.key_order.is_empty());
    }

    #[test]
    fn test_dns_retries_accept_text() {
        let req: DnsRequest = serde_json::from_value(json!({"name": "{{FQDN}}", "retries": "5"})).unwrap();
        assert_eq!(req.retries, Some(5));
        assert_eq!(serde_json::to_value(&req).unwrap()["retries"], json!(5));

        let blank: DnsRequest = serde_json::from_value(json!({"retries": ""})).unwrap();
        assert_eq!(blank.retries, None);
        assert!(serde_json::from_value::<DnsRequest>(json!({"retries": "many"})).is_err());
    }

    #[test]
    fn test_reference_accepts_both_shapes() {
        let one: Info = serde_json::from_value(json!({"reference": "https://a"})).unwrap();
        assert_eq!(one.reference, StringOrList::One("https://a".into()));

        let many: Info = serde_json::from_value(json!({"reference": ["https://a", "https://b"]})).unwrap();
        assert_eq!(
            many.reference,
            StringOrList::Many(vec!["https://a".into(), "https://b".into()])
        );
    }

    #[test]
    fn test_severity_is_lenient() {
        let info: Info = serde_json::from_value(json!({"severity": "High"})).unwrap();
        assert_eq!(info.severity, Some(Severity::High));

        let empty: Info = serde_json::from_value(json!({"severity": ""})).unwrap();
        assert_eq!(empty.severity, None);

        assert!(serde_json::from_value::<Info>(json!({"severity": "severe"})).is_err());
    }

    #[test]
    fn test_http_mode_transitions() {
        let mut req = HttpRequest::new("GET", "{{BaseURL}}");
        assert_eq!(req.mode(), RequestMode::Standard);

        req.enter_mode(RequestMode::Fuzzing);
        assert_eq!(req.mode(), RequestMode::Fuzzing);
        assert_eq!(req.method.as_deref(), Some("GET"));
        assert_eq!(req.fuzzing, Some(Vec::new()));

        req.enter_mode(RequestMode::Raw);
        assert_eq!(req.mode(), RequestMode::Raw);
        assert!(req.method.is_none());
        assert!(req.path.is_empty());
        assert!(req.fuzzing.is_none());
        assert_eq!(req.raw.as_deref(), Some(&[DEFAULT_RAW_REQUEST.to_string()][..]));

        req.enter_mode(RequestMode::Standard);
        assert_eq!(req.mode(), RequestMode::Standard);
        assert_eq!(req.method.as_deref(), Some("GET"));
        assert_eq!(req.path, vec!["{{BaseURL}}".to_string()]);
        assert!(req.raw.is_none());
    }

    #[test]
    fn test_raw_mode_keeps_existing_raw_text() {
        let mut req = HttpRequest {
            raw: Some(vec!["GET / HTTP/1.1".into()]),
            ..Default::default()
        };
        req.enter_mode(RequestMode::Raw);
        assert_eq!(req.raw, Some(vec!["GET / HTTP/1.1".to_string()]));
    }

    #[test]
    fn test_edit_request_through_object() {
        let mut section = Protocol::Http(vec![HttpRequest::new("GET", "/")]);
        section
            .edit_request(0, |map| {
                map.insert("body".into(), json!("a=b"));
            })
            .unwrap();

        match &section {
            Protocol::Http(reqs) => assert_eq!(reqs[0].body.as_deref(), Some("a=b")),
            _ => unreachable!(),
        }
        assert!(section.edit_request(3, |_| ()).is_err());
    }

    #[test]
    fn test_flow_serializes_script_and_sections() {
        let doc = Document::new("f", "F").with_protocol(Protocol::Flow(FlowSection {
            script: Some("http(1) && dns(1)".into()),
            sections: vec![
                Protocol::Http(vec![HttpRequest::new("GET", "/")]),
                Protocol::Dns(vec![DnsRequest::default()]),
            ],
        }));
        let value = doc.to_value().unwrap();
        assert_eq!(value["flow"], json!("http(1) && dns(1)"));
        assert!(value["http"].is_array());
        assert!(value["dns"].is_array());
    }
}
