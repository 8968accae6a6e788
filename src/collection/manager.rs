//! The template collection and its persistence.
//!
//! `TemplateManager` is the sole owner of stored templates. Every mutation
//! writes the whole collection back to the store; write failures are logged
//! and the manager keeps working in memory.

use chrono::{DateTime, Duration, Utc};

use super::import::{merge_imports, ConflictResolver, ImportFile, ImportReport};
use super::model::{ManagerConfig, Page, SessionSnapshot, Template, TemplateStats};
use super::storage::{self, KeyValueStore};
use crate::error::{EditorError, EditorResult};
use crate::template::schema::{new_document, Preset};
use crate::template::Document;

/// Default name for templates created without one.
pub const DEFAULT_TEMPLATE_NAME: &str = "New Template";

/// Stored template collection backed by a key-value store.
pub struct TemplateManager<S: KeyValueStore> {
    store: S,
    config: ManagerConfig,
    templates: Vec<Template>,
    /// Stored entries that did not parse; written back untouched.
    unreadable: Vec<serde_json::Value>,
    next_id: u64,
}

impl<S: KeyValueStore> TemplateManager<S> {
    // =========================================================================
    // INITIALIZATION
    // =========================================================================

    /// Loads the collection from `store` under the default keys.
    pub fn new(store: S) -> Self {
        Self::with_config(store, ManagerConfig::default())
    }

    /// Loads the collection from `store` under the configured keys.
    pub fn with_config(store: S, config: ManagerConfig) -> Self {
        let loaded = storage::load_templates(&store, &config.templates_key);
        let next_id = loaded.max_id() + 1;
        tracing::debug!(
            count = loaded.templates.len(),
            unreadable = loaded.unreadable.len(),
            next_id,
            "loaded template collection"
        );
        Self {
            store,
            config,
            templates: loaded.templates,
            unreadable: loaded.unreadable,
            next_id,
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Consumes the manager, returning its store.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Id the next new template will get.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    // =========================================================================
    // CRUD
    // =========================================================================

    /// Creates a template from `preset`, named `name`.
    pub fn create(&mut self, name: &str, preset: Preset) -> &Template {
        let name = if name.trim().is_empty() {
            DEFAULT_TEMPLATE_NAME
        } else {
            name
        };
        let document = new_document(name, preset);
        let template = Template::new(self.take_id(), document, Utc::now()).with_name(name);
        tracing::debug!(internal_id = template.internal_id, preset = preset.label(), "created template");
        self.insert(template)
    }

    pub fn get(&self, internal_id: u64) -> Option<&Template> {
        self.templates.iter().find(|t| t.internal_id == internal_id)
    }

    /// Replaces the content of a template. The stored name follows a
    /// non-empty `info.name`.
    pub fn update(&mut self, internal_id: u64, content: Document) -> EditorResult<&Template> {
        let index = self.position(internal_id)?;
        {
            let template = &mut self.templates[index];
            if !content.info.name.is_empty() && content.info.name != template.name {
                template.name = content.info.name.clone();
            }
            template.content = content;
            template.modified = Utc::now();
        }
        self.persist();
        Ok(&self.templates[index])
    }

    /// Removes a template. Returns false when it did not exist.
    pub fn delete(&mut self, internal_id: u64) -> bool {
        let Ok(index) = self.position(internal_id) else {
            return false;
        };
        self.templates.remove(index);
        self.persist();
        true
    }

    /// Copies a template as `<name> (Copy)` with id `<id>-copy`.
    pub fn duplicate(&mut self, internal_id: u64) -> EditorResult<&Template> {
        let original = self.get(internal_id).ok_or(EditorError::TemplateNotFound(internal_id))?;
        let name = format!("{} (Copy)", original.name);
        let mut content = original.content.clone();
        content.info.name = name.clone();
        content.id = format!("{}-copy", content.id);

        let template = Template::new(self.take_id(), content, Utc::now()).with_name(name);
        Ok(self.insert(template))
    }

    /// All templates in insertion order.
    pub fn all(&self) -> &[Template] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Case-insensitive search over name, content id and author. An empty
    /// query matches everything.
    pub fn search(&self, query: &str) -> Vec<&Template> {
        let needle = query.to_lowercase();
        self.templates
            .iter()
            .filter(|t| {
                needle.is_empty()
                    || t.name.to_lowercase().contains(&needle)
                    || t.content.id.to_lowercase().contains(&needle)
                    || t.content.info.author.contains_lowercase(&needle)
            })
            .collect()
    }

    /// Removes every template.
    pub fn clear(&mut self) {
        self.templates.clear();
        self.persist();
    }

    // =========================================================================
    // EXPORT / IMPORT
    // =========================================================================

    /// `(filename, yaml)` for one template.
    pub fn export_template(&self, internal_id: u64) -> EditorResult<(String, String)> {
        let template = self.get(internal_id).ok_or(EditorError::TemplateNotFound(internal_id))?;
        Ok((template.export_filename(), template.content.canonical_yaml()?))
    }

    /// `(filename, yaml)` for every template.
    pub fn export_all(&self) -> EditorResult<Vec<(String, String)>> {
        self.templates
            .iter()
            .map(|t| Ok((t.export_filename(), t.content.canonical_yaml()?)))
            .collect()
    }

    /// Pretty JSON of the whole collection, as stored.
    pub fn export_backup(&self) -> EditorResult<String> {
        let mut items = self
            .templates
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        items.extend(self.unreadable.iter().cloned());
        Ok(serde_json::to_string_pretty(&items)?)
    }

    /// Merges a batch of files into the collection.
    pub fn import(
        &mut self,
        files: &[ImportFile],
        resolver: Option<&mut dyn ConflictResolver>,
    ) -> ImportReport {
        self.import_at(files, resolver, Utc::now())
    }

    /// [`import`](Self::import) with an explicit clock.
    pub fn import_at(
        &mut self,
        files: &[ImportFile],
        resolver: Option<&mut dyn ConflictResolver>,
        now: DateTime<Utc>,
    ) -> ImportReport {
        let report = merge_imports(files, &mut self.templates, &mut self.next_id, resolver, now);
        tracing::debug!(
            imported = report.imported.len(),
            conflicts = report.conflicts,
            failures = report.failures.len(),
            "import batch merged"
        );
        self.persist();
        report
    }

    // =========================================================================
    // STATS AND SESSION
    // =========================================================================

    pub fn stats(&self) -> TemplateStats {
        self.stats_at(Utc::now())
    }

    /// Counters relative to `now`.
    pub fn stats_at(&self, now: DateTime<Utc>) -> TemplateStats {
        let window_start = now - Duration::days(self.config.recent_window_days);
        TemplateStats {
            total: self.templates.len(),
            high: self.templates.iter().filter(|t| t.is_high_severity()).count(),
            recent: self.templates.iter().filter(|t| t.modified > window_start).count(),
        }
    }

    /// Remembers the open template and page.
    pub fn save_session(&mut self, current_template_id: Option<u64>, page: Page) {
        let snapshot = SessionSnapshot {
            current_template_id,
            page,
        };
        if let Err(err) = storage::save_session(&mut self.store, &self.config.session_key, &snapshot) {
            tracing::warn!(error = %err, "could not save session");
        }
    }

    /// The last snapshot, if it still points at a stored template.
    pub fn restore_session(&self) -> Option<SessionSnapshot> {
        let snapshot = storage::load_session(&self.store, &self.config.session_key)?;
        match snapshot.current_template_id {
            Some(id) if self.get(id).is_none() => {
                tracing::debug!(id, "session points at a missing template");
                Some(SessionSnapshot {
                    current_template_id: None,
                    page: Page::Templates,
                })
            }
            _ => Some(snapshot),
        }
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    /// Writes the collection back; failures leave the manager in memory only.
    pub fn persist(&mut self) {
        let saved = storage::save_templates(
            &mut self.store,
            &self.config.templates_key,
            &self.templates,
            &self.unreadable,
        );
        if let Err(err) = saved {
            tracing::warn!(error = %err, "could not save templates, keeping changes in memory");
        }
    }

    fn insert(&mut self, template: Template) -> &Template {
        self.templates.push(template);
        self.persist();
        let last = self.templates.len() - 1;
        &self.templates[last]
    }

    fn position(&self, internal_id: u64) -> EditorResult<usize> {
        self.templates
            .iter()
            .position(|t| t.internal_id == internal_id)
            .ok_or(EditorError::TemplateNotFound(internal_id))
    }

    fn take_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::import::{Always, Decision};
    use crate::collection::storage::MemoryStore;
    use crate::template::{ProtocolKind, Severity};

    fn manager() -> TemplateManager<MemoryStore> {
        TemplateManager::new(MemoryStore::new())
    }

    #[test]
    fn test_create_uses_preset_and_slug() {
        let mut manager = manager();
        let template = manager.create("My Scanner!", Preset::Dns);

        assert_eq!(template.internal_id, 1);
        assert_eq!(template.name, "My Scanner!");
        assert_eq!(template.content.id, "my-scanner-");
        assert_eq!(template.content.protocol_kind(), Some(ProtocolKind::Dns));
        assert_eq!(manager.create("", Preset::Http).name, DEFAULT_TEMPLATE_NAME);
    }

    #[test]
    fn test_unreadable_entries_survive_writes() {
        let text = r#"[
            {"internalId": 3, "name": "Edited DNS", "created": "2024-05-01T10:00:00.000Z",
             "modified": "2024-05-01T10:00:00.000Z",
             "content": {"id": "edited-dns", "info": {"name": "Edited DNS"}, "dns": [{"retries": "5"}]}},
            {"internalId": 7, "name": "Odd", "content": {"id": "odd", "info": {"severity": "severe"}}}
        ]"#;
        let mut manager = TemplateManager::new(MemoryStore::new().with_entry("nuclei-templates", text));
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.next_id(), 8);

        let id = manager.create("Another", Preset::Http).internal_id;
        assert_eq!(id, 8);

        let stored = manager.store().get("nuclei-templates").unwrap();
        assert!(stored.contains("Edited DNS"));
        assert!(stored.contains(r#""severity":"severe""#));

        let reloaded = TemplateManager::new(manager.into_store());
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.next_id(), 9);
        assert!(reloaded.export_backup().unwrap().contains("\"Odd\""));
    }

    #[test]
    fn test_changes_survive_reload() {
        let mut manager = manager();
        let id = manager.create("Kept", Preset::Http).internal_id;
        manager.create("Gone", Preset::Http);
        assert!(manager.delete(2));
        assert!(!manager.delete(2));

        let reloaded = TemplateManager::new(manager.into_store());
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get(id).map(|t| t.name.as_str()), Some("Kept"));
        assert_eq!(reloaded.next_id(), 2);
    }

    #[test]
    fn test_update_syncs_name() {
        let mut manager = manager();
        let id = manager.create("Before", Preset::Http).internal_id;

        let mut doc = manager.get(id).unwrap().content.clone();
        doc.info.name = "After".into();
        assert_eq!(manager.update(id, doc.clone()).unwrap().name, "After");

        doc.info.name.clear();
        assert_eq!(manager.update(id, doc).unwrap().name, "After");
        assert!(matches!(
            manager.update(99, Document::new("x", "X")),
            Err(EditorError::TemplateNotFound(99))
        ));
    }

    #[test]
    fn test_duplicate() {
        let mut manager = manager();
        let id = manager.create("Scanner", Preset::Http).internal_id;
        let copy = manager.duplicate(id).unwrap();

        assert_eq!(copy.internal_id, 2);
        assert_eq!(copy.name, "Scanner (Copy)");
        assert_eq!(copy.content.info.name, "Scanner (Copy)");
        assert_eq!(copy.content.id, "scanner-copy");
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let mut manager = manager();
        manager.create("SQL Injection", Preset::Http);
        let id = manager.create("Other", Preset::Http).internal_id;
        let doc = manager.get(id).unwrap().content.clone().with_author("PDTeam");
        manager.update(id, doc).unwrap();

        assert_eq!(manager.search("sql").len(), 1);
        assert_eq!(manager.search("pdteam").len(), 1);
        assert_eq!(manager.search("other").len(), 1);
        assert_eq!(manager.search("").len(), 2);
        assert!(manager.search("nothing").is_empty());
    }

    #[test]
    fn test_stats() {
        let mut manager = manager();
        for (name, severity) in [("a", Severity::High), ("b", Severity::Critical), ("c", Severity::Low)] {
            let id = manager.create(name, Preset::Http).internal_id;
            let doc = manager.get(id).unwrap().content.clone().with_severity(severity);
            manager.update(id, doc).unwrap();
        }

        let stats = manager.stats();
        assert_eq!(stats, TemplateStats { total: 3, high: 2, recent: 3 });

        let later = Utc::now() + Duration::days(8);
        assert_eq!(manager.stats_at(later).recent, 0);
    }

    #[test]
    fn test_export() {
        let mut manager = manager();
        let id = manager.create("Scanner", Preset::Http).internal_id;

        let (filename, yaml) = manager.export_template(id).unwrap();
        assert_eq!(filename, "scanner.yaml");
        assert!(yaml.starts_with("id: scanner\n"));
        assert_eq!(manager.export_all().unwrap().len(), 1);

        let backup: serde_json::Value = serde_json::from_str(&manager.export_backup().unwrap()).unwrap();
        assert_eq!(backup[0]["internalId"], 1);
    }

    #[test]
    fn test_import_assigns_fresh_ids() {
        let mut manager = manager();
        manager.create("Scanner", Preset::Http);
        let files = [ImportFile::new("p.yaml", "id: scanner\ninfo:\n  name: Scanner\n")];

        let report = manager.import(&files, Some(&mut Always(Decision::Rename)));

        assert_eq!(report.first_imported_id(), Some(2));
        assert_eq!(manager.get(2).map(|t| t.name.as_str()), Some("Scanner (1)"));
        assert_eq!(manager.create("Next", Preset::Http).internal_id, 3);
    }

    #[test]
    fn test_clear() {
        let mut manager = manager();
        manager.create("a", Preset::Http);
        manager.clear();
        assert!(manager.is_empty());
        assert!(TemplateManager::new(manager.into_store()).is_empty());
    }

    #[test]
    fn test_session_restore() {
        let mut manager = manager();
        let id = manager.create("Scanner", Preset::Http).internal_id;
        assert_eq!(manager.restore_session(), None);

        manager.save_session(Some(id), Page::Editor);
        assert_eq!(
            manager.restore_session(),
            Some(SessionSnapshot { current_template_id: Some(id), page: Page::Editor })
        );

        manager.delete(id);
        assert_eq!(manager.restore_session().and_then(|s| s.current_template_id), None);
    }

    #[test]
    fn test_read_only_store_keeps_working_in_memory() {
        let mut manager = TemplateManager::new(MemoryStore::read_only());
        let id = manager.create("Scanner", Preset::Http).internal_id;
        assert!(manager.get(id).is_some());
        manager.save_session(Some(id), Page::Editor);
        assert_eq!(manager.restore_session(), None);
    }
}
