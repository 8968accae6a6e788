//! Data models for the stored template collection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::template::{Document, Severity};

// =============================================================================
// TEMPLATE
// =============================================================================

/// One stored template.
///
/// Field names match collections written by the browser editor, so existing
/// `nuclei-templates` entries load unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    /// Collection-local id, never reused by the manager that assigned it.
    pub internal_id: u64,

    /// Display name, kept in sync with `content.info.name`.
    #[serde(default)]
    pub name: String,

    #[serde(default = "Utc::now")]
    pub created: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub modified: DateTime<Utc>,

    pub content: Document,
}

impl Template {
    /// Creates a template named after the document.
    pub fn new(internal_id: u64, content: Document, now: DateTime<Utc>) -> Self {
        Self {
            internal_id,
            name: content.display_name().to_string(),
            created: now,
            modified: now,
            content,
        }
    }

    /// Builder: Set name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Protocol label for listings.
    pub fn protocol_label(&self) -> &'static str {
        self.content.protocol_label()
    }

    /// True for high and critical severities.
    pub fn is_high_severity(&self) -> bool {
        matches!(
            self.content.info.severity,
            Some(Severity::High) | Some(Severity::Critical)
        )
    }

    /// File name used on export: `<id>.yaml`, or `template.yaml` without an id.
    pub fn export_filename(&self) -> String {
        let id = if self.content.id.is_empty() {
            "template"
        } else {
            self.content.id.as_str()
        };
        format!("{}.yaml", id)
    }
}

// =============================================================================
// STATS
// =============================================================================

/// Dashboard counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateStats {
    pub total: usize,
    /// High or critical severity.
    pub high: usize,
    /// Modified within the recent window.
    pub recent: usize,
}

// =============================================================================
// SESSION
// =============================================================================

/// Page shown when the session was saved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Page {
    #[default]
    Templates,
    Editor,
}

/// Last-viewed state restored on startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    #[serde(default)]
    pub current_template_id: Option<u64>,
    #[serde(default)]
    pub page: Page,
}

// =============================================================================
// CONFIG
// =============================================================================

/// Storage keys and dashboard settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    pub templates_key: String,
    pub session_key: String,
    /// Days a modification counts as recent.
    pub recent_window_days: i64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            templates_key: "nuclei-templates".to_string(),
            session_key: "nuclei-session".to_string(),
            recent_window_days: 7,
        }
    }
}

impl ManagerConfig {
    /// Builder: Set the collection key.
    pub fn with_templates_key(mut self, key: impl Into<String>) -> Self {
        self.templates_key = key.into();
        self
    }

    /// Builder: Set the session key.
    pub fn with_session_key(mut self, key: impl Into<String>) -> Self {
        self.session_key = key.into();
        self
    }

    /// Builder: Set the recent window.
    pub fn with_recent_window_days(mut self, days: i64) -> Self {
        self.recent_window_days = days;
        self
    }
}
