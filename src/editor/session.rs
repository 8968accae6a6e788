//! The editing session: working copy, selection state and the edit loop.

use serde::Serialize;

use super::codec::{self, ControlValue};
use super::path::{self, EntryList, FieldPath, RequestRef};
use super::render::{self, Fragment, FragmentId, InnerTab, ViewState};
use crate::collection::{KeyValueStore, TemplateManager};
use crate::error::{CodecError, EditorError, EditorResult};
use crate::format;
use crate::template::schema::{self, MODE_KEY};
use crate::template::{Document, ProtocolKind, RequestMode};

/// Result of one edit: what to redraw and the new preview text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditOutcome {
    /// False when the edit was deferred and nothing changed.
    pub applied: bool,
    pub fragments: Vec<Fragment>,
    pub preview: String,
}

/// Editing state for one open template.
///
/// The session owns a deep copy of the stored document; nothing reaches the
/// collection until [`EditorSession::commit`].
#[derive(Debug, Clone)]
pub struct EditorSession {
    template_id: u64,
    document: Document,
    view: ViewState,
    dirty: bool,
    yaml_error: Option<String>,
    preview: String,
}

impl EditorSession {
    /// Starts a session on `document`.
    pub fn new(template_id: u64, document: Document) -> EditorResult<Self> {
        let preview = document.canonical_yaml()?;
        Ok(Self {
            template_id,
            document,
            view: ViewState::default(),
            dirty: false,
            yaml_error: None,
            preview,
        })
    }

    /// Opens stored template `template_id`.
    pub fn open<S: KeyValueStore>(manager: &TemplateManager<S>, template_id: u64) -> EditorResult<Self> {
        let template = manager
            .get(template_id)
            .ok_or(EditorError::TemplateNotFound(template_id))?;
        tracing::debug!(template_id, "opening editor session");
        Self::new(template_id, template.content.clone())
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn template_id(&self) -> u64 {
        self.template_id
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Last YAML pane parse error, cleared by the next successful apply.
    pub fn yaml_error(&self) -> Option<&str> {
        self.yaml_error.as_deref()
    }

    /// Canonical YAML of the working copy.
    pub fn preview(&self) -> &str {
        &self.preview
    }

    pub fn active_request(&self, protocol: ProtocolKind) -> usize {
        self.view.active_request(protocol)
    }

    pub fn inner_tab(&self, request: RequestRef) -> InnerTab {
        self.view.inner_tab(request)
    }

    // =========================================================================
    // FIELD EDITS
    // =========================================================================

    /// Applies one control edit.
    ///
    /// Matcher/extractor type changes redraw the request's two tables, a
    /// request mode change redraws the request, anything else redraws only the
    /// edited control. JSON that does not parse yet is not applied.
    pub fn on_field_edit(&mut self, path: &FieldPath, raw: &ControlValue) -> EditorResult<EditOutcome> {
        match path {
            FieldPath::Request { request, field } if field == MODE_KEY => {
                let mode = raw
                    .text()
                    .and_then(RequestMode::from_name)
                    .ok_or_else(|| CodecError::invalid_value("request mode", format!("{:?}", raw)))?;
                return self.set_request_mode(*request, mode);
            }
            FieldPath::Entry {
                request,
                list,
                index,
                field,
            } if field == "type" && list.variant_table().is_some() => {
                let new_type = raw
                    .text()
                    .map(str::trim)
                    .ok_or_else(|| CodecError::invalid_value("type", "checkbox state"))?;
                path::switch_entry_type(&mut self.document, *request, *list, *index, new_type)?;
                self.mark_changed()?;
                let fragments = vec![
                    render::render_entries(&self.document, &self.view, *request, EntryList::Matchers)?,
                    render::render_entries(&self.document, &self.view, *request, EntryList::Extractors)?,
                ];
                return Ok(self.outcome(fragments));
            }
            _ => {}
        }

        let spec = path::field_spec(&self.document, path)?;
        let value = match codec::decode(raw, spec.kind) {
            Ok(value) => value,
            Err(CodecError::StaleJson(reason)) => {
                tracing::debug!(field = path.field(), %reason, "deferring JSON edit");
                return Ok(EditOutcome {
                    applied: false,
                    fragments: Vec::new(),
                    preview: self.preview.clone(),
                });
            }
            Err(err) => return Err(err.into()),
        };

        path::write_field(&mut self.document, path, value)?;
        self.mark_changed()?;
        tracing::debug!(field = path.field(), "field edited");

        let fragment = render::render_field(&self.document, path)?;
        Ok(self.outcome(vec![fragment]))
    }

    /// Moves an HTTP request into `mode`.
    pub fn set_request_mode(&mut self, request: RequestRef, mode: RequestMode) -> EditorResult<EditOutcome> {
        if request.protocol != ProtocolKind::Http {
            return Err(EditorError::protocol_mismatch("http", request.protocol.key()));
        }
        self.document.http_request_mut(request.index)?.enter_mode(mode);
        self.mark_changed()?;
        tracing::debug!(request = request.index, mode = mode.as_str(), "request mode changed");

        let fragment = render::render_request(&self.document, &self.view, request)?;
        Ok(self.outcome(vec![fragment]))
    }

    // =========================================================================
    // STRUCTURAL EDITS
    // =========================================================================

    /// Appends a default request to the `protocol` section and selects it.
    pub fn add_request(&mut self, protocol: ProtocolKind) -> EditorResult<EditOutcome> {
        let template = schema::default_request(protocol).request_value(0)?;
        let actual = self.document.protocol_label();
        let section = self
            .document
            .section_mut(protocol)
            .ok_or_else(|| EditorError::protocol_mismatch(protocol.key(), actual))?;
        let index = section.push_request(serde_json::Value::Object(template))?;

        self.view.active.insert(protocol, index);
        self.mark_changed()?;
        self.section_outcome(protocol)
    }

    /// Removes a request; the active index is clamped to what remains.
    pub fn remove_request(&mut self, request: RequestRef) -> EditorResult<EditOutcome> {
        let remaining = self
            .document
            .section_mut(request.protocol)
            .ok_or_else(|| EditorError::request_not_found(request.protocol.key(), request.index))?
            .remove_request(request.index)?;

        self.view.forget_request(request.protocol, request.index, remaining);
        self.mark_changed()?;
        self.section_outcome(request.protocol)
    }

    /// Appends the default entry to `list` and returns its index with the outcome.
    pub fn add_entry(&mut self, request: RequestRef, list: EntryList) -> EditorResult<(usize, EditOutcome)> {
        let index = path::push_entry(&mut self.document, request, list, list.default_entry()?)?;
        self.mark_changed()?;
        let fragment = render::render_entries(&self.document, &self.view, request, list)?;
        Ok((index, self.outcome(vec![fragment])))
    }

    /// Removes entry `index` from `list`.
    pub fn remove_entry(&mut self, request: RequestRef, list: EntryList, index: usize) -> EditorResult<EditOutcome> {
        path::remove_entry(&mut self.document, request, list, index)?;
        self.mark_changed()?;
        let fragment = render::render_entries(&self.document, &self.view, request, list)?;
        Ok(self.outcome(vec![fragment]))
    }

    /// Adds the default matcher.
    pub fn add_matcher(&mut self, request: RequestRef) -> EditorResult<(usize, EditOutcome)> {
        self.add_entry(request, EntryList::Matchers)
    }

    /// Adds the default extractor.
    pub fn add_extractor(&mut self, request: RequestRef) -> EditorResult<(usize, EditOutcome)> {
        self.add_entry(request, EntryList::Extractors)
    }

    // =========================================================================
    // SELECTION
    // =========================================================================

    /// Makes `request` the visible tab of its section.
    pub fn select_request(&mut self, request: RequestRef) -> EditorResult<Vec<Fragment>> {
        self.check_request(request)?;
        self.view.active.insert(request.protocol, request.index);
        Ok(vec![
            render::render_request_tabs(&self.document, &self.view, request.protocol),
            render::render_request(&self.document, &self.view, request)?,
        ])
    }

    /// Shows matchers or extractors under `request`.
    pub fn select_inner_tab(&mut self, request: RequestRef, tab: InnerTab) -> EditorResult<Vec<Fragment>> {
        self.check_request(request)?;
        self.view.inner_tabs.insert(request, tab);
        Ok(vec![
            render::render_entries(&self.document, &self.view, request, EntryList::Matchers)?,
            render::render_entries(&self.document, &self.view, request, EntryList::Extractors)?,
        ])
    }

    /// Every fragment of the form.
    pub fn render_all(&self) -> EditorResult<Vec<Fragment>> {
        render::render_all(&self.document, &self.view)
    }

    // =========================================================================
    // WHOLE-DOCUMENT OPERATIONS
    // =========================================================================

    /// Replaces the working copy with text from the YAML pane.
    ///
    /// On a parse error the session is flagged and the document is untouched.
    pub fn apply_yaml_text(&mut self, text: &str) -> EditorResult<EditOutcome> {
        match format::parse_document(text) {
            Ok(document) => {
                self.document = document;
                self.yaml_error = None;
                self.view.clamp_to(&self.document);
                self.mark_changed()?;
                let fragments = self.render_all()?;
                Ok(self.outcome(fragments))
            }
            Err(err) => {
                tracing::debug!(error = %err, "YAML pane does not parse");
                self.yaml_error = Some(err.to_string());
                Err(err.into())
            }
        }
    }

    /// Reloads the stored template, dropping every unsaved change.
    pub fn discard_changes<S: KeyValueStore>(&mut self, manager: &TemplateManager<S>) -> EditorResult<Vec<Fragment>> {
        let template = manager
            .get(self.template_id)
            .ok_or(EditorError::TemplateNotFound(self.template_id))?;
        self.document = template.content.clone();
        self.dirty = false;
        self.yaml_error = None;
        self.view.clamp_to(&self.document);
        self.preview = self.document.canonical_yaml()?;
        self.render_all()
    }

    /// Saves the working copy back to the collection.
    pub fn commit<S: KeyValueStore>(&mut self, manager: &mut TemplateManager<S>) -> EditorResult<()> {
        manager.update(self.template_id, self.document.clone())?;
        self.dirty = false;
        Ok(())
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn mark_changed(&mut self) -> EditorResult<()> {
        self.dirty = true;
        self.preview = self.document.canonical_yaml()?;
        Ok(())
    }

    fn outcome(&self, fragments: Vec<Fragment>) -> EditOutcome {
        EditOutcome {
            applied: true,
            fragments,
            preview: self.preview.clone(),
        }
    }

    fn section_outcome(&self, protocol: ProtocolKind) -> EditorResult<EditOutcome> {
        let mut fragments = vec![render::render_request_tabs(&self.document, &self.view, protocol)];
        for index in 0..path::request_count(&self.document, protocol) {
            fragments.push(render::render_request(
                &self.document,
                &self.view,
                RequestRef::new(protocol, index),
            )?);
        }
        Ok(self.outcome(fragments))
    }

    fn check_request(&self, request: RequestRef) -> EditorResult<()> {
        if request.index < path::request_count(&self.document, request.protocol) {
            Ok(())
        } else {
            Err(EditorError::request_not_found(request.protocol.key(), request.index))
        }
    }
}

/// Fragment ids in an outcome, for hosts that diff by identity.
pub fn fragment_ids(outcome: &EditOutcome) -> Vec<&FragmentId> {
    outcome.fragments.iter().map(|f| &f.id).collect()
}

// =============================================================================
// TESTS
// =============================================================================
