//! Template document module.
//!
//! Provides the typed document model, matcher/extractor variants and the
//! static schema that drives form rendering and new-template presets.

pub mod matching;
pub mod model;
pub mod schema;

// Re-exports for convenience
pub use matching::{Extractor, ExtractorKind, Matcher, MatcherKind, VariantKind, VariantTable};
pub use model::{
    CodeRequest, DnsRequest, Document, FileRequest, FlowSection, FuzzRule, FuzzValues,
    HeadlessRequest, HeadlessStep, HttpRequest, Info, JavascriptRequest, NetworkInput,
    NetworkRequest, Protocol, ProtocolKind, RequestMode, Severity, StringOrList,
};
pub use schema::Preset;
