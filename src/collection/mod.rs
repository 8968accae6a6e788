//! Template collection module.
//!
//! This module provides:
//! - `model`: stored template records, stats and the session snapshot
//! - `storage`: the key-value store seam and collection persistence
//! - `import`: conflict-aware merging of imported files
//! - `manager`: TemplateManager with CRUD, search, stats and export
//! - `wasm`: WASM bindings for browser usage (JsTemplateManager, JsEditorSession)

pub mod import;
pub mod manager;
pub mod model;
pub mod storage;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-exports for convenience
pub use import::{
    merge_imports, Always, Conflict, ConflictResolver, Decision, ImportFailure, ImportFile, ImportReport,
};
pub use manager::TemplateManager;
pub use model::{ManagerConfig, Page, SessionSnapshot, Template, TemplateStats};
pub use storage::{KeyValueStore, MemoryStore};

#[cfg(feature = "wasm")]
pub use wasm::{JsEditorSession, JsTemplateManager};
