//! Error types for the template editor engine.

use thiserror::Error;

/// Result type alias for editor operations.
pub type EditorResult<T> = Result<T, EditorError>;

/// Result type alias for text parsing operations.
pub type FormatResult<T> = Result<T, FormatError>;

/// Errors raised while turning text into a template document.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormatError {
    /// Text is neither valid YAML nor valid JSON.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Text parses but is not a template (missing `id`/`info`, or bad shape).
    #[error("Invalid template: {0}")]
    InvalidTemplate(String),
}

impl FormatError {
    /// Creates a Parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Creates an InvalidTemplate error.
    pub fn invalid_template(msg: impl Into<String>) -> Self {
        Self::InvalidTemplate(msg.into())
    }
}

/// Errors raised while decoding a form control value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    /// JSON blob text does not currently parse. The edit is deferred.
    #[error("JSON blob does not parse yet: {0}")]
    StaleJson(String),

    /// The control value is not usable for this field kind.
    #[error("Invalid value for {kind}: {value:?}")]
    InvalidValue { kind: &'static str, value: String },
}

impl CodecError {
    /// Creates an InvalidValue error.
    pub fn invalid_value(kind: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            kind,
            value: value.into(),
        }
    }
}

/// Errors raised by a key-value store write.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Storage error: {0}")]
pub struct StorageError(pub String);

impl StorageError {
    /// Creates a storage error from any message.
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Errors that can occur during editor and collection operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditorError {
    /// Text could not be turned into a template.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// A control value could not be decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A store write failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Template not found in the collection.
    #[error("Template not found: {0}")]
    TemplateNotFound(u64),

    /// Request index out of range for the addressed protocol section.
    #[error("Request {index} not found in {protocol} section")]
    RequestNotFound { protocol: String, index: usize },

    /// Sub-entry (matcher, extractor, rule, step, input) index out of range.
    #[error("{kind} {index} not found in request {request}")]
    EntryNotFound {
        kind: &'static str,
        request: usize,
        index: usize,
    },

    /// The edit addresses a field the request's protocol does not have.
    #[error("Field '{field}' is not editable on {protocol} requests")]
    UnknownField { protocol: String, field: String },

    /// The field exists on HTTP requests but not in the request's current mode.
    #[error("Field '{field}' is not available in {mode} mode")]
    ModeMismatch { field: String, mode: &'static str },

    /// The operation does not apply to the document's protocol.
    #[error("Operation requires {expected}, document is {actual}")]
    ProtocolMismatch { expected: String, actual: String },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EditorError {
    /// Creates a RequestNotFound error.
    pub fn request_not_found(protocol: impl Into<String>, index: usize) -> Self {
        Self::RequestNotFound {
            protocol: protocol.into(),
            index,
        }
    }

    /// Creates an EntryNotFound error.
    pub fn entry_not_found(kind: &'static str, request: usize, index: usize) -> Self {
        Self::EntryNotFound {
            kind,
            request,
            index,
        }
    }

    /// Creates an UnknownField error.
    pub fn unknown_field(protocol: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnknownField {
            protocol: protocol.into(),
            field: field.into(),
        }
    }

    /// Creates a ModeMismatch error.
    pub fn mode_mismatch(field: impl Into<String>, mode: &'static str) -> Self {
        Self::ModeMismatch {
            field: field.into(),
            mode,
        }
    }

    /// Creates a ProtocolMismatch error.
    pub fn protocol_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::ProtocolMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a Serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }
}

impl From<serde_json::Error> for EditorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
