//! JSON file store for the CLI.
//!
//! The file holds one JSON object mapping storage keys to their string
//! values, the same shape browser `localStorage` has.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;

use nuclei_forge::{KeyValueStore, StorageError};

pub struct FileStore {
    path: PathBuf,
    entries: IndexMap<String, String>,
}

impl FileStore {
    /// Opens `path`, starting empty when the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read store {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Store {} is not a JSON object of strings", path.display()))?
        } else {
            IndexMap::new()
        };
        tracing::debug!(path = %path.display(), keys = entries.len(), "opened store");
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        let text = serde_json::to_string_pretty(&self.entries).map_err(|e| StorageError::new(e.to_string()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StorageError::new(e.to_string()))?;
        }
        fs::write(&self.path, text)
            .map_err(|e| StorageError::new(format!("{}: {}", self.path.display(), e)))
    }
}
