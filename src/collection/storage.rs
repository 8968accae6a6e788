//! Key-value persistence for the template collection and session snapshot.
//!
//! Reads never fail: absent or unreadable content yields an empty collection
//! or no snapshot. Stored templates that do not parse are carried along
//! verbatim and written back on the next save. Write failures are returned so
//! the caller can log them.

use std::collections::HashMap;

use serde_json::Value;

use super::model::{SessionSnapshot, Template};
use crate::error::StorageError;

/// A string key-value store, such as browser `localStorage` or a JSON file.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// In-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
    read_only: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose writes always fail.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    /// Builder: Preload an entry.
    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::new(format!("store is read-only, cannot write '{}'", key)));
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// =============================================================================
// COLLECTION
// =============================================================================

/// A collection as read from the store.
#[derive(Debug, Clone, Default)]
pub struct StoredCollection {
    pub templates: Vec<Template>,
    /// Entries that did not parse as templates, in stored order.
    pub unreadable: Vec<Value>,
}

impl StoredCollection {
    /// Highest `internalId` among both readable and unreadable entries.
    pub fn max_id(&self) -> u64 {
        let readable = self.templates.iter().map(|t| t.internal_id);
        let unreadable = self
            .unreadable
            .iter()
            .filter_map(|item| item.get("internalId").and_then(Value::as_u64));
        readable.chain(unreadable).max().unwrap_or(0)
    }
}

/// Loads the stored collection. Entries that do not parse are kept aside.
pub fn load_templates<S: KeyValueStore + ?Sized>(store: &S, key: &str) -> StoredCollection {
    let Some(text) = store.get(key) else {
        return StoredCollection::default();
    };

    let items: Vec<Value> = match serde_json::from_str(&text) {
        Ok(items) => items,
        Err(err) => {
            tracing::warn!(key, error = %err, "stored collection is unreadable, starting empty");
            return StoredCollection::default();
        }
    };

    let mut collection = StoredCollection::default();
    for (position, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<Template>(item.clone()) {
            Ok(template) => collection.templates.push(template),
            Err(err) => {
                tracing::warn!(position, error = %err, "keeping unreadable stored template as is");
                collection.unreadable.push(item);
            }
        }
    }
    collection
}

/// Writes the whole collection under `key`, unreadable entries last.
pub fn save_templates<S: KeyValueStore + ?Sized>(
    store: &mut S,
    key: &str,
    templates: &[Template],
    unreadable: &[Value],
) -> Result<(), StorageError> {
    let mut items = Vec::with_capacity(templates.len() + unreadable.len());
    for template in templates {
        items.push(serde_json::to_value(template).map_err(|e| StorageError::new(e.to_string()))?);
    }
    items.extend(unreadable.iter().cloned());

    let text = serde_json::to_string(&items).map_err(|e| StorageError::new(e.to_string()))?;
    store.set(key, &text)
}

// =============================================================================
// SESSION SNAPSHOT
// =============================================================================

/// Loads the last session snapshot, if one is stored and readable.
pub fn load_session<S: KeyValueStore + ?Sized>(store: &S, key: &str) -> Option<SessionSnapshot> {
    let text = store.get(key)?;
    match serde_json::from_str(&text) {
        Ok(snapshot) => Some(snapshot),
        Err(err) => {
            tracing::warn!(key, error = %err, "stored session is unreadable, ignoring");
            None
        }
    }
}

/// Writes the session snapshot under `key`.
pub fn save_session<S: KeyValueStore + ?Sized>(
    store: &mut S,
    key: &str,
    snapshot: &SessionSnapshot,
) -> Result<(), StorageError> {
    let text = serde_json::to_string(snapshot).map_err(|e| StorageError::new(e.to_string()))?;
    store.set(key, &text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::model::Page;

    #[test]
    fn test_absent_and_malformed_collections_are_empty() {
        assert!(load_templates(&MemoryStore::new(), "nuclei-templates").templates.is_empty());

        let corrupt = MemoryStore::new().with_entry("nuclei-templates", "{not json");
        assert!(load_templates(&corrupt, "nuclei-templates").templates.is_empty());

        let foreign = MemoryStore::new().with_entry("nuclei-templates", r#"{"profiles": []}"#);
        assert!(load_templates(&foreign, "nuclei-templates").templates.is_empty());
    }

    #[test]
    fn test_bad_entries_are_kept_aside() {
        let text = r#"[
            {"internalId": 1, "name": "A", "created": "2024-05-01T10:00:00.000Z",
             "modified": "2024-05-01T10:00:00.000Z",
             "content": {"id": "a", "info": {"name": "A", "severity": "low"}, "http": []}},
            {"name": "no id", "internalId": 9}
        ]"#;
        let mut store = MemoryStore::new().with_entry("k", text);

        let collection = load_templates(&store, "k");
        assert_eq!(collection.templates.len(), 1);
        assert_eq!(collection.templates[0].internal_id, 1);
        assert_eq!(collection.templates[0].content.id, "a");
        assert_eq!(collection.unreadable, vec![serde_json::json!({"name": "no id", "internalId": 9})]);
        assert_eq!(collection.max_id(), 9);

        save_templates(&mut store, "k", &collection.templates, &collection.unreadable).unwrap();
        let saved: Vec<Value> = serde_json::from_str(&store.get("k").unwrap()).unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[1]["name"], serde_json::json!("no id"));
    }

    #[test]
    fn test_session_round_trip() {
        let mut store = MemoryStore::new();
        let snapshot = SessionSnapshot {
            current_template_id: Some(4),
            page: Page::Editor,
        };
        save_session(&mut store, "s", &snapshot).unwrap();

        assert_eq!(store.get("s").as_deref(), Some(r#"{"currentTemplateId":4,"page":"editor"}"#));
        assert_eq!(load_session(&store, "s"), Some(snapshot));
        assert_eq!(load_session(&MemoryStore::new().with_entry("s", "??"), "s"), None);
    }

    #[test]
    fn test_read_only_store_rejects_writes() {
        let mut store = MemoryStore::read_only();
        assert!(save_templates(&mut store, "k", &[], &[]).is_err());
    }
}
