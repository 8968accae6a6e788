//! WASM bindings for the template collection and the editor session.
//!
//! This module provides JavaScript-friendly wrappers around
//! `TemplateManager` and `EditorSession` for use in browser environments.
//! The collection is persisted to `localStorage` when it is available.

use js_sys::{Function, Reflect};
use serde::Serialize;
use serde_wasm_bindgen::{from_value, Serializer};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use super::import::{Conflict, ConflictResolver, Decision, ImportFile, ImportReport};
use super::manager::TemplateManager;
use super::model::{Page, Template};
use super::storage::KeyValueStore;
use crate::editor::{ControlValue, EditorSession, EntryList, FieldPath, InnerTab, RequestRef};
use crate::error::{EditorError, StorageError};
use crate::format;
use crate::template::{Preset, ProtocolKind, RequestMode};

/// Serialize a value to JsValue with maps as plain JS objects (not Map).
fn to_js_value<T: Serialize>(value: &T) -> Result<JsValue, serde_wasm_bindgen::Error> {
    value.serialize(&Serializer::new().serialize_maps_as_objects(true))
}

// =============================================================================
// ERROR CONVERSION
// =============================================================================

impl From<EditorError> for JsValue {
    fn from(err: EditorError) -> Self {
        JsValue::from_str(&err.to_string())
    }
}

/// Helper macro for Result conversion
macro_rules! js_result {
    ($expr:expr) => {
        $expr.map_err(|e: EditorError| JsValue::from_str(&e.to_string()))
    };
}

// =============================================================================
// BROWSER STORAGE
// =============================================================================

/// `localStorage` adapter. Without one, reads come back empty and writes fail.
pub struct LocalStorage {
    storage: Option<JsValue>,
}

impl LocalStorage {
    pub fn from_global() -> Self {
        let storage = Reflect::get(&js_sys::global(), &JsValue::from_str("localStorage"))
            .ok()
            .filter(|s| !s.is_undefined() && !s.is_null());
        if storage.is_none() {
            tracing::warn!("localStorage is unavailable, templates will not persist");
        }
        Self { storage }
    }

    fn method(&self, name: &str) -> Option<(&JsValue, Function)> {
        let storage = self.storage.as_ref()?;
        let method = Reflect::get(storage, &JsValue::from_str(name)).ok()?;
        Some((storage, method.dyn_into::<Function>().ok()?))
    }
}

impl KeyValueStore for LocalStorage {
    fn get(&self, key: &str) -> Option<String> {
        let (storage, get_item) = self.method("getItem")?;
        get_item.call1(storage, &JsValue::from_str(key)).ok()?.as_string()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let (storage, set_item) = self
            .method("setItem")
            .ok_or_else(|| StorageError::new("localStorage is unavailable"))?;
        set_item
            .call2(storage, &JsValue::from_str(key), &JsValue::from_str(value))
            .map(|_| ())
            .map_err(|e| StorageError::new(format!("setItem failed: {:?}", e)))
    }
}

// =============================================================================
// IMPORT HELPERS
// =============================================================================

/// Resolver backed by a JS callback: `(conflicts) => ['override' | 'rename' | 'skip', ...]`.
struct JsResolver(Function);

impl ConflictResolver for JsResolver {
    fn decide(&mut self, conflicts: &[Conflict]) -> Vec<Decision> {
        let decided = to_js_value(&conflicts)
            .map_err(JsValue::from)
            .and_then(|arg| self.0.call1(&JsValue::NULL, &arg))
            .and_then(|out| from_value::<Vec<Decision>>(out).map_err(JsValue::from));
        match decided {
            Ok(decisions) => decisions,
            Err(err) => {
                tracing::warn!(error = ?err, "conflict callback failed, renaming all");
                Vec::new()
            }
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsImportFailure {
    filename: String,
    error: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsImportReport {
    imported: Vec<Template>,
    conflicts: usize,
    failures: Vec<JsImportFailure>,
    first_imported_id: Option<u64>,
}

impl From<ImportReport> for JsImportReport {
    fn from(report: ImportReport) -> Self {
        Self {
            first_imported_id: report.first_imported_id(),
            imported: report.imported,
            conflicts: report.conflicts,
            failures: report
                .failures
                .into_iter()
                .map(|f| JsImportFailure {
                    filename: f.filename,
                    error: f.error.to_string(),
                })
                .collect(),
        }
    }
}

fn preset_from(label: &str) -> Result<Preset, JsValue> {
    Preset::from_label(label).ok_or_else(|| JsValue::from_str(&format!("unknown protocol preset: {}", label)))
}

fn protocol_from(key: &str) -> Result<ProtocolKind, JsValue> {
    ProtocolKind::from_key(key).ok_or_else(|| JsValue::from_str(&format!("unknown protocol: {}", key)))
}

// =============================================================================
// TEMPLATE MANAGER
// =============================================================================

/// JavaScript-friendly wrapper around TemplateManager.
///
/// # Example (JavaScript)
/// ```js
/// const manager = new JsTemplateManager();
/// const template = manager.create('SQL Injection', 'HTTP');
/// const { filename, yaml } = manager.exportTemplate(template.internalId);
/// ```
#[wasm_bindgen]
pub struct JsTemplateManager {
    inner: TemplateManager<LocalStorage>,
}

#[wasm_bindgen]
impl JsTemplateManager {
    /// Loads the collection from `localStorage`.
    #[wasm_bindgen(constructor)]
    pub fn new() -> JsTemplateManager {
        JsTemplateManager {
            inner: TemplateManager::new(LocalStorage::from_global()),
        }
    }

    /// Creates a template from a protocol preset label such as `HTTP` or `Multi-Protocol`.
    pub fn create(&mut self, name: &str, preset: &str) -> Result<JsValue, JsValue> {
        let preset = preset_from(preset)?;
        Ok(to_js_value(self.inner.create(name, preset))?)
    }

    /// Gets a template by internal id, or `undefined`.
    pub fn get(&self, internal_id: u64) -> Result<JsValue, JsValue> {
        match self.inner.get(internal_id) {
            Some(template) => Ok(to_js_value(template)?),
            None => Ok(JsValue::UNDEFINED),
        }
    }

    /// Replaces a template's content with a document object.
    pub fn update(&mut self, internal_id: u64, content: JsValue) -> Result<JsValue, JsValue> {
        let content = from_value(content)?;
        let template = js_result!(self.inner.update(internal_id, content))?;
        Ok(to_js_value(template)?)
    }

    pub fn delete(&mut self, internal_id: u64) -> bool {
        self.inner.delete(internal_id)
    }

    pub fn duplicate(&mut self, internal_id: u64) -> Result<JsValue, JsValue> {
        let template = js_result!(self.inner.duplicate(internal_id))?;
        Ok(to_js_value(template)?)
    }

    #[wasm_bindgen(js_name = getAll)]
    pub fn get_all(&self) -> Result<JsValue, JsValue> {
        Ok(to_js_value(self.inner.all())?)
    }

    pub fn search(&self, query: &str) -> Result<JsValue, JsValue> {
        Ok(to_js_value(&self.inner.search(query))?)
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    #[wasm_bindgen(js_name = getStats)]
    pub fn get_stats(&self) -> Result<JsValue, JsValue> {
        Ok(to_js_value(&self.inner.stats())?)
    }

    /// Returns `{ filename, yaml }`.
    #[wasm_bindgen(js_name = exportTemplate)]
    pub fn export_template(&self, internal_id: u64) -> Result<JsValue, JsValue> {
        let (filename, yaml) = js_result!(self.inner.export_template(internal_id))?;
        Ok(to_js_value(&ExportedFile { filename, yaml })?)
    }

    /// Returns `[{ filename, yaml }, ...]`.
    #[wasm_bindgen(js_name = exportAll)]
    pub fn export_all(&self) -> Result<JsValue, JsValue> {
        let files: Vec<ExportedFile> = js_result!(self.inner.export_all())?
            .into_iter()
            .map(|(filename, yaml)| ExportedFile { filename, yaml })
            .collect();
        Ok(to_js_value(&files)?)
    }

    /// Pretty JSON backup of the whole collection.
    #[wasm_bindgen(js_name = exportBackup)]
    pub fn export_backup(&self) -> Result<String, JsValue> {
        js_result!(self.inner.export_backup())
    }

    /// Imports `[{ filename, text }, ...]`. The optional callback receives
    /// all conflicts and returns one decision per conflict.
    #[wasm_bindgen(js_name = importFiles)]
    pub fn import_files(&mut self, files: JsValue, on_conflict: Option<Function>) -> Result<JsValue, JsValue> {
        let files: Vec<ImportFile> = from_value(files)?;
        let mut resolver = on_conflict.map(JsResolver);
        let report = self
            .inner
            .import(&files, resolver.as_mut().map(|r| r as &mut dyn ConflictResolver));
        Ok(to_js_value(&JsImportReport::from(report))?)
    }

    /// Remembers the open template and page (`templates` or `editor`).
    #[wasm_bindgen(js_name = saveSession)]
    pub fn save_session(&mut self, current_template_id: Option<u64>, page: &str) -> Result<(), JsValue> {
        let page: Page = from_value(JsValue::from_str(page))?;
        self.inner.save_session(current_template_id, page);
        Ok(())
    }

    #[wasm_bindgen(js_name = restoreSession)]
    pub fn restore_session(&self) -> Result<JsValue, JsValue> {
        Ok(to_js_value(&self.inner.restore_session())?)
    }
}

impl Default for JsTemplateManager {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct ExportedFile {
    filename: String,
    yaml: String,
}

// =============================================================================
// EDITOR SESSION
// =============================================================================

/// JavaScript-friendly wrapper around EditorSession.
///
/// Every edit returns `{ applied, fragments, preview }`; the page redraws
/// only the returned fragments.
#[wasm_bindgen]
pub struct JsEditorSession {
    inner: EditorSession,
}

#[wasm_bindgen]
impl JsEditorSession {
    /// Opens a stored template for editing.
    pub fn open(manager: &JsTemplateManager, template_id: u64) -> Result<JsEditorSession, JsValue> {
        let inner = js_result!(EditorSession::open(&manager.inner, template_id))?;
        Ok(JsEditorSession { inner })
    }

    #[wasm_bindgen(getter, js_name = templateId)]
    pub fn template_id(&self) -> u64 {
        self.inner.template_id()
    }

    #[wasm_bindgen(getter)]
    pub fn dirty(&self) -> bool {
        self.inner.is_dirty()
    }

    #[wasm_bindgen(getter)]
    pub fn preview(&self) -> String {
        self.inner.preview().to_string()
    }

    #[wasm_bindgen(getter, js_name = yamlError)]
    pub fn yaml_error(&self) -> Option<String> {
        self.inner.yaml_error().map(str::to_string)
    }

    /// The working copy as a document object.
    pub fn document(&self) -> Result<JsValue, JsValue> {
        Ok(to_js_value(self.inner.document())?)
    }

    #[wasm_bindgen(js_name = renderAll)]
    pub fn render_all(&self) -> Result<JsValue, JsValue> {
        let fragments = js_result!(self.inner.render_all())?;
        Ok(to_js_value(&fragments)?)
    }

    /// Applies a control edit. `path` is a field path object, `value` a
    /// string or a boolean.
    #[wasm_bindgen(js_name = onFieldEdit)]
    pub fn on_field_edit(&mut self, path: JsValue, value: JsValue) -> Result<JsValue, JsValue> {
        let path: FieldPath = from_value(path)?;
        let value: ControlValue = from_value(value)?;
        let outcome = js_result!(self.inner.on_field_edit(&path, &value))?;
        Ok(to_js_value(&outcome)?)
    }

    #[wasm_bindgen(js_name = setRequestMode)]
    pub fn set_request_mode(&mut self, index: usize, mode: &str) -> Result<JsValue, JsValue> {
        let mode = RequestMode::from_name(mode)
            .ok_or_else(|| JsValue::from_str(&format!("unknown request mode: {}", mode)))?;
        let outcome = js_result!(self.inner.set_request_mode(RequestRef::http(index), mode))?;
        Ok(to_js_value(&outcome)?)
    }

    #[wasm_bindgen(js_name = addRequest)]
    pub fn add_request(&mut self, protocol: &str) -> Result<JsValue, JsValue> {
        let outcome = js_result!(self.inner.add_request(protocol_from(protocol)?))?;
        Ok(to_js_value(&outcome)?)
    }

    #[wasm_bindgen(js_name = removeRequest)]
    pub fn remove_request(&mut self, protocol: &str, index: usize) -> Result<JsValue, JsValue> {
        let request = RequestRef::new(protocol_from(protocol)?, index);
        let outcome = js_result!(self.inner.remove_request(request))?;
        Ok(to_js_value(&outcome)?)
    }

    /// Appends a default entry to `list` (`matchers`, `extractors`,
    /// `fuzzing`, `steps` or `inputs`).
    #[wasm_bindgen(js_name = addEntry)]
    pub fn add_entry(&mut self, protocol: &str, index: usize, list: &str) -> Result<JsValue, JsValue> {
        let request = RequestRef::new(protocol_from(protocol)?, index);
        let list: EntryList = from_value(JsValue::from_str(list))?;
        let (_, outcome) = js_result!(self.inner.add_entry(request, list))?;
        Ok(to_js_value(&outcome)?)
    }

    #[wasm_bindgen(js_name = removeEntry)]
    pub fn remove_entry(&mut self, protocol: &str, index: usize, list: &str, entry: usize) -> Result<JsValue, JsValue> {
        let request = RequestRef::new(protocol_from(protocol)?, index);
        let list: EntryList = from_value(JsValue::from_str(list))?;
        let outcome = js_result!(self.inner.remove_entry(request, list, entry))?;
        Ok(to_js_value(&outcome)?)
    }

    #[wasm_bindgen(js_name = selectRequest)]
    pub fn select_request(&mut self, protocol: &str, index: usize) -> Result<JsValue, JsValue> {
        let request = RequestRef::new(protocol_from(protocol)?, index);
        let fragments = js_result!(self.inner.select_request(request))?;
        Ok(to_js_value(&fragments)?)
    }

    /// Switches the matchers/extractors tab of a request.
    #[wasm_bindgen(js_name = selectInnerTab)]
    pub fn select_inner_tab(&mut self, protocol: &str, index: usize, tab: &str) -> Result<JsValue, JsValue> {
        let request = RequestRef::new(protocol_from(protocol)?, index);
        let tab: InnerTab = from_value(JsValue::from_str(tab))?;
        let fragments = js_result!(self.inner.select_inner_tab(request, tab))?;
        Ok(to_js_value(&fragments)?)
    }

    /// Replaces the working copy from the YAML pane.
    #[wasm_bindgen(js_name = applyYaml)]
    pub fn apply_yaml(&mut self, text: &str) -> Result<JsValue, JsValue> {
        let outcome = js_result!(self.inner.apply_yaml_text(text))?;
        Ok(to_js_value(&outcome)?)
    }

    #[wasm_bindgen(js_name = discardChanges)]
    pub fn discard_changes(&mut self, manager: &JsTemplateManager) -> Result<JsValue, JsValue> {
        let fragments = js_result!(self.inner.discard_changes(&manager.inner))?;
        Ok(to_js_value(&fragments)?)
    }

    pub fn commit(&mut self, manager: &mut JsTemplateManager) -> Result<(), JsValue> {
        js_result!(self.inner.commit(&mut manager.inner))
    }
}

/// Canonical YAML for a document object, for previews outside a session.
#[wasm_bindgen(js_name = canonicalYaml)]
pub fn canonical_yaml(document: JsValue) -> Result<String, JsValue> {
    let value: serde_json::Value = from_value(document)?;
    js_result!(format::to_text(&format::prune(&value)))
}
