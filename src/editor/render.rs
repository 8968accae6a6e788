//! Form fragments as plain view models.
//!
//! A [`Fragment`] is the unit of re-rendering: the host replaces whatever it
//! drew for a [`FragmentId`] with the new fragment's controls.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::codec::{encode, ControlValue, FieldKind};
use super::path::{field_spec, read_entries, read_field, request_count, EntryList, FieldPath, RequestRef};
use crate::error::EditorResult;
use crate::template::schema::{self, FieldSpec};
use crate::template::{Document, ProtocolKind, RequestMode};

// =============================================================================
// VIEW STATE
// =============================================================================

/// Sub-tab shown under a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InnerTab {
    #[default]
    Matchers,
    Extractors,
}

/// Selection state that survives re-renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    /// Active request index per protocol section.
    pub active: HashMap<ProtocolKind, usize>,
    /// Inner tab per request; absent means [`InnerTab::Matchers`].
    pub inner_tabs: HashMap<RequestRef, InnerTab>,
}

impl ViewState {
    pub fn active_request(&self, protocol: ProtocolKind) -> usize {
        self.active.get(&protocol).copied().unwrap_or(0)
    }

    pub fn inner_tab(&self, request: RequestRef) -> InnerTab {
        self.inner_tabs.get(&request).copied().unwrap_or_default()
    }

    /// Drops request `index` of `protocol`: later inner tabs shift down and the
    /// active index is clamped to `remaining`.
    pub fn forget_request(&mut self, protocol: ProtocolKind, index: usize, remaining: usize) {
        let next: HashMap<RequestRef, InnerTab> = self
            .inner_tabs
            .iter()
            .filter(|(r, _)| !(r.protocol == protocol && r.index == index))
            .map(|(r, tab)| {
                if r.protocol == protocol && r.index > index {
                    (RequestRef::new(protocol, r.index - 1), *tab)
                } else {
                    (*r, *tab)
                }
            })
            .collect();
        self.inner_tabs = next;

        let active = self.active_request(protocol);
        if active >= remaining {
            self.active.insert(protocol, remaining.saturating_sub(1));
        } else if active > index {
            self.active.insert(protocol, active - 1);
        }
    }

    /// Clamps every selection to the document's current shape.
    pub fn clamp_to(&mut self, doc: &Document) {
        self.active
            .retain(|protocol, index| request_count(doc, *protocol) > *index || *index == 0);
        self.inner_tabs
            .retain(|r, _| r.index < request_count(doc, r.protocol));
    }
}

// =============================================================================
// FRAGMENTS
// =============================================================================

/// Identity of a re-renderable fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FragmentId {
    /// Id, info block and flow script.
    Info,
    /// Request tab strip of one section.
    RequestTabs { protocol: ProtocolKind },
    /// One request's form, including its sub-tables.
    Request { request: RequestRef },
    /// One sub-table of a request.
    Entries { request: RequestRef, list: EntryList },
    /// A single control.
    Field { path: FieldPath },
}

/// One rendered control.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlView {
    pub path: FieldPath,
    pub label: &'static str,
    pub kind: FieldKind,
    pub value: ControlValue,
    pub options: &'static [&'static str],
}

/// One tab of a request tab strip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TabView {
    pub request: RequestRef,
    pub label: String,
    pub active: bool,
}

/// A re-renderable piece of the form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fragment {
    pub id: FragmentId,
    /// Whether the fragment is the visible tab (always true outside tab groups).
    pub active: bool,
    pub tabs: Vec<TabView>,
    pub controls: Vec<ControlView>,
    pub children: Vec<Fragment>,
}

impl Fragment {
    fn new(id: FragmentId) -> Self {
        Self {
            id,
            active: true,
            tabs: Vec::new(),
            controls: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Depth-first search for the fragment with `id`.
    pub fn find(&self, id: &FragmentId) -> Option<&Fragment> {
        if &self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    /// The control at `path`, searching children too.
    pub fn control(&self, path: &FieldPath) -> Option<&ControlView> {
        self.controls
            .iter()
            .find(|c| &c.path == path)
            .or_else(|| self.children.iter().find_map(|child| child.control(path)))
    }
}

fn control(doc: &Document, path: FieldPath) -> EditorResult<ControlView> {
    let spec: FieldSpec = field_spec(doc, &path)?;
    let value = encode(&read_field(doc, &path)?, spec.kind);
    Ok(ControlView {
        path,
        label: spec.label,
        kind: spec.kind,
        value,
        options: spec.options,
    })
}

// =============================================================================
// RENDERERS
// =============================================================================

/// Id, info fields, and the flow script for flow documents.
pub fn render_info(doc: &Document) -> EditorResult<Fragment> {
    let mut fragment = Fragment::new(FragmentId::Info);
    fragment.controls.push(control(doc, FieldPath::Id)?);
    for spec in schema::INFO_FIELDS {
        fragment.controls.push(control(doc, FieldPath::info(spec.key))?);
    }
    if doc.protocol_kind() == Some(ProtocolKind::Flow) {
        fragment.controls.push(control(doc, FieldPath::Flow)?);
    }
    Ok(fragment)
}

/// Tab strip for one protocol section.
pub fn render_request_tabs(doc: &Document, view: &ViewState, protocol: ProtocolKind) -> Fragment {
    let active = view.active_request(protocol);
    let mut fragment = Fragment::new(FragmentId::RequestTabs { protocol });
    fragment.tabs = (0..request_count(doc, protocol))
        .map(|index| TabView {
            request: RequestRef::new(protocol, index),
            label: format!("{} {}", protocol.label(), index + 1),
            active: index == active,
        })
        .collect();
    fragment
}

/// One sub-table. Extractor `group` is only shown for regex extractors.
pub fn render_entries(
    doc: &Document,
    view: &ViewState,
    request: RequestRef,
    list: EntryList,
) -> EditorResult<Fragment> {
    let mut fragment = Fragment::new(FragmentId::Entries { request, list });
    fragment.active = match list {
        EntryList::Matchers => view.inner_tab(request) == InnerTab::Matchers,
        EntryList::Extractors => view.inner_tab(request) == InnerTab::Extractors,
        _ => true,
    };

    for (index, entry) in read_entries(doc, request, list)?.iter().enumerate() {
        let entry_type = entry.get("type").and_then(|t| t.as_str()).unwrap_or("regex");
        for spec in list.fields() {
            if list == EntryList::Extractors && spec.key == "group" && entry_type != "regex" {
                continue;
            }
            fragment
                .controls
                .push(control(doc, FieldPath::entry(request, list, index, spec.key))?);
        }
    }
    Ok(fragment)
}

/// A request form: mode, plain fields and its sub-tables.
pub fn render_request(doc: &Document, view: &ViewState, request: RequestRef) -> EditorResult<Fragment> {
    let mut fragment = Fragment::new(FragmentId::Request { request });
    fragment.active = view.active_request(request.protocol) == request.index;

    let mut lists = Vec::new();
    let mode = if request.protocol == ProtocolKind::Http {
        let mode_path = FieldPath::request(request, schema::MODE_KEY);
        let mode = read_field(doc, &mode_path)?
            .as_str()
            .and_then(RequestMode::from_name)
            .unwrap_or_default();
        fragment.controls.push(control(doc, mode_path)?);
        if mode == RequestMode::Fuzzing {
            lists.push(EntryList::Fuzzing);
        }
        mode
    } else {
        RequestMode::Standard
    };

    for spec in schema::request_fields(request.protocol, mode) {
        fragment.controls.push(control(doc, FieldPath::request(request, spec.key))?);
    }

    match request.protocol {
        ProtocolKind::Headless => lists.push(EntryList::Steps),
        ProtocolKind::Network => lists.push(EntryList::Inputs),
        _ => {}
    }
    lists.extend([EntryList::Matchers, EntryList::Extractors]);

    for list in lists {
        fragment.children.push(render_entries(doc, view, request, list)?);
    }
    Ok(fragment)
}

/// A single control, as a fragment of its own.
pub fn render_field(doc: &Document, path: &FieldPath) -> EditorResult<Fragment> {
    let mut fragment = Fragment::new(FragmentId::Field { path: path.clone() });
    fragment.controls.push(control(doc, path.clone())?);
    Ok(fragment)
}

/// Every fragment of the form, top to bottom.
pub fn render_all(doc: &Document, view: &ViewState) -> EditorResult<Vec<Fragment>> {
    let mut fragments = vec![render_info(doc)?];
    for section in doc.sections() {
        let protocol = section.kind();
        fragments.push(render_request_tabs(doc, view, protocol));
        for index in 0..section.len() {
            fragments.push(render_request(doc, view, RequestRef::new(protocol, index))?);
        }
    }
    tracing::debug!(fragments = fragments.len(), "rendered form");
    Ok(fragments)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::path::push_entry;
    use crate::template::schema::{new_document, Preset};
    use serde_json::json;

    #[test]
    fn test_render_all_http() {
        let doc = new_document("Scanner", Preset::Http);
        let fragments = render_all(&doc, &ViewState::default()).unwrap();

        assert_eq!(fragments[0].id, FragmentId::Info);
        assert_eq!(fragments[1].id, FragmentId::RequestTabs { protocol: ProtocolKind::Http });
        assert_eq!(fragments[1].tabs.len(), 1);

        let request = &fragments[2];
        let mode = request
            .control(&FieldPath::request(RequestRef::http(0), "mode"))
            .unwrap();
        assert_eq!(mode.value, ControlValue::from("standard"));
        let path = request
            .control(&FieldPath::request(RequestRef::http(0), "path"))
            .unwrap();
        assert_eq!(path.value, ControlValue::from("{{BaseURL}}"));
    }

    #[test]
    fn test_inner_tab_marks_active_table() {
        let doc = new_document("Scanner", Preset::Http);
        let mut view = ViewState::default();
        view.inner_tabs.insert(RequestRef::http(0), InnerTab::Extractors);

        let request = render_request(&doc, &view, RequestRef::http(0)).unwrap();
        let matchers = request
            .find(&FragmentId::Entries { request: RequestRef::http(0), list: EntryList::Matchers })
            .unwrap();
        let extractors = request
            .find(&FragmentId::Entries { request: RequestRef::http(0), list: EntryList::Extractors })
            .unwrap();
        assert!(!matchers.active);
        assert!(extractors.active);
    }

    #[test]
    fn test_group_only_for_regex_extractors() {
        let mut doc = new_document("Scanner", Preset::Http);
        let at = RequestRef::http(0);
        push_entry(&mut doc, at, EntryList::Extractors, json!({"type": "regex", "regex": ["a"]})).unwrap();
        push_entry(&mut doc, at, EntryList::Extractors, json!({"type": "json", "json": [".a"]})).unwrap();

        let table = render_entries(&doc, &ViewState::default(), at, EntryList::Extractors).unwrap();
        assert!(table.control(&FieldPath::entry(at, EntryList::Extractors, 0, "group")).is_some());
        assert!(table.control(&FieldPath::entry(at, EntryList::Extractors, 1, "group")).is_none());
        assert_eq!(
            table
                .control(&FieldPath::entry(at, EntryList::Extractors, 1, "content"))
                .unwrap()
                .value,
            ControlValue::from(".a")
        );
    }

    #[test]
    fn test_dns_request_controls() {
        let doc = new_document("Zone", Preset::Dns);
        let request = render_request(&doc, &ViewState::default(), RequestRef::new(ProtocolKind::Dns, 0)).unwrap();
        let recursion = request
            .control(&FieldPath::request(RequestRef::new(ProtocolKind::Dns, 0), "recursion"))
            .unwrap();
        assert_eq!(recursion.value, ControlValue::Checked(true));
        assert_eq!(request.controls.len(), 5);
    }

    #[test]
    fn test_forget_request_shifts_tabs() {
        let mut view = ViewState::default();
        view.active.insert(ProtocolKind::Http, 2);
        view.inner_tabs.insert(RequestRef::http(0), InnerTab::Extractors);
        view.inner_tabs.insert(RequestRef::http(2), InnerTab::Extractors);

        view.forget_request(ProtocolKind::Http, 1, 2);

        assert_eq!(view.active_request(ProtocolKind::Http), 1);
        assert_eq!(view.inner_tab(RequestRef::http(0)), InnerTab::Extractors);
        assert_eq!(view.inner_tab(RequestRef::http(1)), InnerTab::Extractors);
        assert_eq!(view.inner_tab(RequestRef::http(2)), InnerTab::Matchers);
    }
}
