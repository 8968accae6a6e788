//! Static schema: option lists, presets, default entries and form field tables.

use serde_json::{json, Value};

use super::matching::{Extractor, ExtractorKind, Matcher, MatcherKind, VariantKind};
use super::model::{
    CodeRequest, DnsRequest, Document, FileRequest, FlowSection, HeadlessRequest, HeadlessStep,
    HttpRequest, JavascriptRequest, NetworkInput, NetworkRequest, Protocol, ProtocolKind,
    RequestMode,
};
use crate::editor::codec::FieldKind;

// =============================================================================
// OPTION LISTS
// =============================================================================

pub const SEVERITIES: &[&str] = &["info", "low", "medium", "high", "critical", "unknown"];
pub const HTTP_METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "HEAD", "OPTIONS", "PATCH"];
pub const MATCHER_TYPES: &[&str] = &["word", "regex", "binary", "status", "size", "dsl"];
pub const EXTRACTOR_TYPES: &[&str] = &["regex", "json", "xpath", "dsl", "kval"];
pub const MATCHER_CONDITIONS: &[&str] = &["or", "and"];
pub const MATCHER_PARTS: &[&str] = &["body", "header", "all", "response", "request"];
pub const REQUEST_MODES: &[&str] = &["standard", "raw", "fuzzing"];
pub const DNS_TYPES: &[&str] = &["A", "NS", "CNAME", "SOA", "PTR", "MX", "TXT", "AAAA"];
pub const DNS_CLASSES: &[&str] = &["inet", "cs", "ch", "hs", "any"];
pub const NETWORK_INPUT_TYPES: &[&str] = &["text", "hex"];
pub const HEADLESS_ACTIONS: &[&str] = &[
    "navigate", "script", "click", "rightclick", "text", "screenshot", "time", "select", "files",
    "waitload", "waitfcp", "waitfmp", "waitdom", "waitidle", "waitstable", "waitdialog",
    "getresource", "extract", "setmethod", "addheader", "setheader", "deleteheader", "setbody",
    "waitevent", "keyboard", "debug", "sleep",
];
pub const CODE_ENGINES: &[&str] = &["sh", "bash", "py", "python3", "go", "ps", "powershell"];
pub const FUZZ_PARTS: &[&str] = &["query", "path", "header", "cookie", "body", "request"];
pub const FUZZ_TYPES: &[&str] = &["replace", "prefix", "postfix", "infix", "replace-regex"];
pub const FUZZ_MODES: &[&str] = &["single", "multiple"];
pub const FUZZ_ATTACKS: &[&str] = &["battering-ram", "pitchfork", "sniper", "clusterbomb"];

// =============================================================================
// FIELD TABLES
// =============================================================================

/// One editable form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Document key the field writes to.
    pub key: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    /// Select options; empty for free-form fields.
    pub options: &'static [&'static str],
}

const fn field(key: &'static str, label: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        key,
        label,
        kind,
        options: &[],
    }
}

const fn choice(key: &'static str, label: &'static str, options: &'static [&'static str]) -> FieldSpec {
    FieldSpec {
        key,
        label,
        kind: FieldKind::Choice,
        options,
    }
}

/// Key of the pseudo field holding a matcher/extractor value list.
pub const CONTENT_KEY: &str = "content";

/// Key of the pseudo field selecting an HTTP request mode.
pub const MODE_KEY: &str = "mode";

pub const ID_FIELD: FieldSpec = field("id", "Template ID", FieldKind::Text);
pub const FLOW_FIELD: FieldSpec = field("flow", "Flow", FieldKind::Text);
pub const MODE_FIELD: FieldSpec = choice(MODE_KEY, "Request Mode", REQUEST_MODES);

pub const INFO_FIELDS: &[FieldSpec] = &[
    field("name", "Name", FieldKind::Text),
    field("author", "Author", FieldKind::Text),
    choice("severity", "Severity", SEVERITIES),
    field("description", "Description", FieldKind::Text),
    field("tags", "Tags", FieldKind::Text),
    field("reference", "Reference (one per line)", FieldKind::Reference),
];

const HTTP_STANDARD_FIELDS: &[FieldSpec] = &[
    choice("method", "Method", HTTP_METHODS),
    field("path", "Path (one per line)", FieldKind::LineList),
    field("body", "Body", FieldKind::Text),
    field("headers", "Headers (Key: Value)", FieldKind::HeaderMap),
];

const HTTP_RAW_FIELDS: &[FieldSpec] = &[field("raw", "Raw HTTP Request", FieldKind::RawBlocks)];

const DNS_FIELDS: &[FieldSpec] = &[
    field("name", "Name", FieldKind::Text),
    choice("type", "Type", DNS_TYPES),
    choice("class", "Class", DNS_CLASSES),
    field("retries", "Retries", FieldKind::Integer),
    field("recursion", "Recursion", FieldKind::Bool),
];

const NETWORK_FIELDS: &[FieldSpec] = &[field("host", "Host (one per line)", FieldKind::LineList)];

const FILE_FIELDS: &[FieldSpec] = &[
    field("extensions", "Extensions (one per line)", FieldKind::LineList),
    field("max-size", "Max Size", FieldKind::TrimmedText),
];

const JAVASCRIPT_FIELDS: &[FieldSpec] = &[
    field("code", "Code", FieldKind::Text),
    field("args", "Args (JSON)", FieldKind::JsonBlob),
];

const CODE_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        key: "engine",
        label: "Engine",
        kind: FieldKind::LineList,
        options: CODE_ENGINES,
    },
    field("source", "Source", FieldKind::Text),
];

/// Plain fields of a request, for the given HTTP mode. Headless requests have none.
pub fn request_fields(kind: ProtocolKind, mode: RequestMode) -> &'static [FieldSpec] {
    match kind {
        ProtocolKind::Http => match mode {
            RequestMode::Standard => HTTP_STANDARD_FIELDS,
            RequestMode::Raw => HTTP_RAW_FIELDS,
            RequestMode::Fuzzing => &[],
        },
        ProtocolKind::Dns => DNS_FIELDS,
        ProtocolKind::Network => NETWORK_FIELDS,
        ProtocolKind::File => FILE_FIELDS,
        ProtocolKind::Javascript => JAVASCRIPT_FIELDS,
        ProtocolKind::Code => CODE_FIELDS,
        ProtocolKind::Headless | ProtocolKind::Flow => &[],
    }
}

/// Looks up a plain request field by key in one mode's table.
pub fn request_field(kind: ProtocolKind, mode: RequestMode, key: &str) -> Option<&'static FieldSpec> {
    find_field(request_fields(kind, mode), key)
}

pub const MATCHER_FIELDS: &[FieldSpec] = &[
    choice("type", "Type", MATCHER_TYPES),
    field(CONTENT_KEY, "Content (one per line)", FieldKind::LineList),
    choice("part", "Part", MATCHER_PARTS),
    choice("condition", "Condition", MATCHER_CONDITIONS),
    field("negative", "Negative", FieldKind::Flag),
];

pub const EXTRACTOR_FIELDS: &[FieldSpec] = &[
    choice("type", "Type", EXTRACTOR_TYPES),
    field(CONTENT_KEY, "Content (one per line)", FieldKind::LineList),
    choice("part", "Part", MATCHER_PARTS),
    field("group", "Group", FieldKind::PositiveInteger),
    field("name", "Name", FieldKind::TrimmedText),
];

pub const FUZZ_FIELDS: &[FieldSpec] = &[
    choice("part", "Part", FUZZ_PARTS),
    choice("type", "Type", FUZZ_TYPES),
    choice("mode", "Mode", FUZZ_MODES),
    field("keys", "Keys (comma-separated)", FieldKind::CommaList),
    field("keys-regex", "Keys Regex (comma-separated)", FieldKind::CommaList),
    field("preconditions", "Preconditions (one per line)", FieldKind::LineList),
    choice("attack", "Attack Type", FUZZ_ATTACKS),
    field("analyzers", "Analyzers (one per line)", FieldKind::LineList),
    field("fuzz", "Fuzz Values", FieldKind::FuzzValues),
];

pub const STEP_FIELDS: &[FieldSpec] = &[
    choice("action", "Action", HEADLESS_ACTIONS),
    field("args", "Args (JSON)", FieldKind::JsonBlob),
];

pub const INPUT_FIELDS: &[FieldSpec] = &[
    field("data", "Data", FieldKind::Text),
    choice("type", "Type", NETWORK_INPUT_TYPES),
];

/// Codec kind for a matcher's value list.
pub fn matcher_content_kind(kind: MatcherKind) -> FieldKind {
    if kind.is_numeric() {
        FieldKind::IntegerList
    } else {
        FieldKind::LineList
    }
}

/// Finds `key` in `fields`.
pub fn find_field(fields: &'static [FieldSpec], key: &str) -> Option<&'static FieldSpec> {
    fields.iter().find(|f| f.key == key)
}

// =============================================================================
// DEFAULT ENTRIES
// =============================================================================

/// Matcher added by "Add Matcher".
pub fn default_matcher() -> Matcher {
    Matcher::new(MatcherKind::DEFAULT, ["error"])
}

/// Extractor added by "Add Extractor".
pub fn default_extractor() -> Extractor {
    Extractor::new(ExtractorKind::DEFAULT, ["[a-z]+"])
}

/// Fuzz rule added by "Add Fuzzing Rule".
pub fn default_fuzz_rule() -> Value {
    json!({"part": "query", "type": "postfix", "mode": "single", "fuzz": []})
}

/// Headless step added by "Add Step".
pub fn default_step() -> HeadlessStep {
    HeadlessStep {
        action: "navigate".to_string(),
        args: Some(json!({})),
        ..Default::default()
    }
}

/// Network input added by "Add Input".
pub fn default_input() -> NetworkInput {
    NetworkInput::default()
}

/// Request added by "Add Request" for `kind`.
pub fn default_request(kind: ProtocolKind) -> Protocol {
    match kind {
        ProtocolKind::Http => Protocol::Http(vec![HttpRequest::new("GET", "{{BaseURL}}")]),
        ProtocolKind::Dns => Protocol::Dns(vec![DnsRequest {
            name: Some("{{FQDN}}".into()),
            record_type: Some("A".into()),
            class: Some("inet".into()),
            recursion: Some(true),
            retries: Some(3),
            ..Default::default()
        }]),
        ProtocolKind::Network => Protocol::Network(vec![NetworkRequest {
            host: vec!["{{Hostname}}".into()],
            inputs: vec![default_input()],
            ..Default::default()
        }]),
        ProtocolKind::Headless => Protocol::Headless(vec![HeadlessRequest {
            steps: vec![HeadlessStep {
                action: "navigate".into(),
                args: Some(json!({"url": "{{BaseURL}}"})),
                ..Default::default()
            }],
            ..Default::default()
        }]),
        ProtocolKind::File => Protocol::File(vec![FileRequest {
            extensions: vec!["all".into()],
            ..Default::default()
        }]),
        ProtocolKind::Javascript => Protocol::Javascript(vec![JavascriptRequest {
            code: Some(String::new()),
            args: Some(json!({})),
            ..Default::default()
        }]),
        ProtocolKind::Code => Protocol::Code(vec![CodeRequest {
            engine: vec!["sh".into(), "bash".into()],
            source: Some(String::new()),
            ..Default::default()
        }]),
        ProtocolKind::Flow => Protocol::Flow(FlowSection::default()),
    }
}

// =============================================================================
// PRESETS
// =============================================================================

/// Protocol choices offered when creating a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    Http,
    Headless,
    Network,
    Dns,
    File,
    Javascript,
    Code,
    Flow,
    MultiProtocol,
}

impl Preset {
    pub const ALL: [Preset; 9] = [
        Preset::Http,
        Preset::Headless,
        Preset::Network,
        Preset::Dns,
        Preset::File,
        Preset::Javascript,
        Preset::Code,
        Preset::Flow,
        Preset::MultiProtocol,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Preset::Http => "HTTP",
            Preset::Headless => "Headless",
            Preset::Network => "Network",
            Preset::Dns => "DNS",
            Preset::File => "File",
            Preset::Javascript => "JavaScript",
            Preset::Code => "Code",
            Preset::Flow => "Flow",
            Preset::MultiProtocol => "Multi-protocol",
        }
    }

    /// Parses a label or document key, ignoring case.
    pub fn from_label(label: &str) -> Option<Self> {
        let wanted = label.trim().to_lowercase();
        Self::ALL.into_iter().find(|p| {
            p.label().to_lowercase() == wanted
                || p.protocol_kind().map_or(false, |k| k.key() == wanted)
        })
    }

    /// Protocol kind of a single-section preset.
    pub fn protocol_kind(self) -> Option<ProtocolKind> {
        match self {
            Preset::Http => Some(ProtocolKind::Http),
            Preset::Headless => Some(ProtocolKind::Headless),
            Preset::Network => Some(ProtocolKind::Network),
            Preset::Dns => Some(ProtocolKind::Dns),
            Preset::File => Some(ProtocolKind::File),
            Preset::Javascript => Some(ProtocolKind::Javascript),
            Preset::Code => Some(ProtocolKind::Code),
            Preset::Flow | Preset::MultiProtocol => None,
        }
    }

    /// Protocol section a new template of this preset starts with.
    pub fn protocol(self) -> Protocol {
        match self.protocol_kind() {
            Some(ProtocolKind::Http) => {
                let mut request = HttpRequest::new("GET", "{{BaseURL}}");
                request.body = Some(String::new());
                Protocol::Http(vec![request])
            }
            Some(kind) => default_request(kind),
            None => Protocol::Flow(FlowSection {
                script: (self == Preset::Flow).then(String::new),
                sections: vec![
                    Protocol::empty(ProtocolKind::Http),
                    Protocol::empty(ProtocolKind::Network),
                    Protocol::empty(ProtocolKind::Dns),
                ],
            }),
        }
    }
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Lowercases `name` and replaces every character outside `[a-z0-9]` with `-`.
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '-' })
        .collect()
}

/// A new document for `preset`, with the id derived from `name`.
pub fn new_document(name: &str, preset: Preset) -> Document {
    Document::new(slugify(name), name).with_protocol(preset.protocol())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::prune;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("My Test_Template 2"), "my-test-template-2");
        assert_eq!(slugify("SQLi!"), "sqli-");
    }

    #[test]
    fn test_preset_from_label() {
        assert_eq!(Preset::from_label("HTTP"), Some(Preset::Http));
        assert_eq!(Preset::from_label("javascript"), Some(Preset::Javascript));
        assert_eq!(Preset::from_label("Multi-protocol"), Some(Preset::MultiProtocol));
        assert_eq!(Preset::from_label("smtp"), None);
    }

    #[test]
    fn test_dns_preset() {
        let doc = new_document("Zone", Preset::Dns);
        assert_eq!(doc.id, "zone");
        assert_eq!(doc.protocol_kind(), Some(ProtocolKind::Dns));

        let value = doc.to_value().unwrap();
        assert_eq!(value["dns"][0]["type"], "A");
        assert_eq!(value["dns"][0]["retries"], 3);
        assert_eq!(value["dns"][0]["recursion"], true);
    }

    #[test]
    fn test_flow_presets_differ_only_in_script() {
        let flow = new_document("F", Preset::Flow);
        let multi = new_document("M", Preset::MultiProtocol);

        match (&flow.protocol, &multi.protocol) {
            (Some(Protocol::Flow(a)), Some(Protocol::Flow(b))) => {
                assert_eq!(a.script.as_deref(), Some(""));
                assert!(b.script.is_none());
                assert_eq!(a.sections.len(), 3);
                assert_eq!(b.sections.len(), 3);
            }
            other => panic!("unexpected sections {:?}", other),
        }
    }

    #[test]
    fn test_new_http_document_prunes_to_essentials() {
        let doc = new_document("Login Check", Preset::Http);
        let pruned = prune(&doc.to_value().unwrap());

        assert_eq!(
            pruned,
            serde_json::json!({
                "id": "login-check",
                "info": {"name": "Login Check", "severity": "info"},
                "http": [{"method": "GET", "path": ["{{BaseURL}}"]}]
            })
        );
    }

    #[test]
    fn test_field_lookup() {
        assert_eq!(
            request_field(ProtocolKind::Http, RequestMode::Raw, "raw").map(|f| f.kind),
            Some(FieldKind::RawBlocks)
        );
        assert!(request_field(ProtocolKind::Http, RequestMode::Standard, "raw").is_none());
        assert!(request_field(ProtocolKind::Http, RequestMode::Raw, "method").is_none());
        assert!(request_field(ProtocolKind::Http, RequestMode::Fuzzing, "path").is_none());
        assert_eq!(
            request_field(ProtocolKind::Dns, RequestMode::Standard, "recursion").map(|f| f.kind),
            Some(FieldKind::Bool)
        );
        assert!(request_field(ProtocolKind::Headless, RequestMode::Standard, "steps").is_none());
        assert_eq!(matcher_content_kind(MatcherKind::Status), FieldKind::IntegerList);
    }
}
