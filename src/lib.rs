//! NucleiForge - Template document engine for a visual nuclei template editor.
//!
//! This crate holds everything behind the editor's form and YAML panes:
//!
//! - **Typed documents**: protocol sections, matchers and extractors as tagged variants
//! - **Form editing**: control values decode into typed fields, edits return only the fragments to redraw
//! - **Canonical YAML**: documents are pruned of empty values and written with stable key order
//! - **Collections**: stored templates with conflict-aware import and export
//!
//! # Example
//!
//! ```rust
//! use nuclei_forge::{ControlValue, EditorSession, FieldPath, MemoryStore, Preset, TemplateManager};
//!
//! let mut manager = TemplateManager::new(MemoryStore::new());
//! let id = manager.create("Admin Panel", Preset::Http).internal_id;
//!
//! // Edit through the form, the way a browser control would
//! let mut session = EditorSession::open(&manager, id).unwrap();
//! session
//!     .on_field_edit(&FieldPath::info("severity"), &ControlValue::from("high"))
//!     .unwrap();
//! session.commit(&mut manager).unwrap();
//!
//! let (filename, yaml) = manager.export_template(id).unwrap();
//! assert_eq!(filename, "admin-panel.yaml");
//! assert!(yaml.contains("severity: high"));
//! ```

pub mod error;
pub mod format;

// Template document module
pub mod template;

// Form editing module
pub mod editor;

// Template collection module
pub mod collection;

// Re-exports for convenience
pub use collection::{
    Conflict, ConflictResolver, Decision, ImportFile, ImportReport, KeyValueStore, ManagerConfig, MemoryStore,
    Template, TemplateManager, TemplateStats,
};
pub use editor::{ControlValue, EditOutcome, EditorSession, EntryList, FieldPath, Fragment, RequestRef};
pub use error::{CodecError, EditorError, EditorResult, FormatError, FormatResult, StorageError};
pub use template::{Document, Extractor, Matcher, Preset, Protocol, ProtocolKind, Severity};

#[cfg(feature = "wasm")]
pub use collection::wasm::{JsEditorSession, JsTemplateManager};
