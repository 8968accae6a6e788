//! Conflict-aware merging of imported template files into a collection.
//!
//! Files are parsed in input order. A document conflicts with the collection
//! when its display name matches a stored template name or its id matches a
//! stored content id. Conflicts are checked against the collection as it was
//! before the batch, decided once for the whole batch, and then applied in
//! input order.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::model::Template;
use crate::error::{FormatError, FormatResult};
use crate::format;
use crate::template::Document;

// =============================================================================
// INPUT AND DECISIONS
// =============================================================================

/// One file selected for import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportFile {
    pub filename: String,
    pub text: String,
}

impl ImportFile {
    pub fn new(filename: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            text: text.into(),
        }
    }
}

/// An incoming document that clashes with a stored template.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    /// Position of the file in the batch.
    pub index: usize,
    pub filename: String,
    /// `info.name` of the incoming document, or its id when the name is empty.
    pub template_name: String,
    /// Internal id of the first stored template it clashes with.
    pub existing_id: u64,
    pub document: Document,
}

/// What to do with a conflicting document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Replace the stored template's content, keeping its internal id.
    Override,
    /// Insert as a new template under a numbered name.
    #[default]
    Rename,
    /// Drop the incoming document.
    Skip,
}

/// Decides all conflicts of a batch at once.
///
/// The returned decisions line up with `conflicts`; missing entries mean
/// [`Decision::Rename`].
pub trait ConflictResolver {
    fn decide(&mut self, conflicts: &[Conflict]) -> Vec<Decision>;
}

impl<F> ConflictResolver for F
where
    F: FnMut(&[Conflict]) -> Vec<Decision>,
{
    fn decide(&mut self, conflicts: &[Conflict]) -> Vec<Decision> {
        self(conflicts)
    }
}

/// Applies the same decision to every conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Always(pub Decision);

impl ConflictResolver for Always {
    fn decide(&mut self, conflicts: &[Conflict]) -> Vec<Decision> {
        vec![self.0; conflicts.len()]
    }
}

// =============================================================================
// REPORT
// =============================================================================

/// A file that could not be imported.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportFailure {
    pub filename: String,
    pub error: FormatError,
}

/// Outcome of one import batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportReport {
    /// Templates inserted or overridden, in apply order, as stored after the batch.
    pub imported: Vec<Template>,
    /// Number of conflicts found, whatever was decided for them.
    pub conflicts: usize,
    pub failures: Vec<ImportFailure>,
}

impl ImportReport {
    /// Internal id of the first template inserted or overridden.
    pub fn first_imported_id(&self) -> Option<u64> {
        self.imported.first().map(|t| t.internal_id)
    }
}

// =============================================================================
// MERGE
// =============================================================================

/// Parses an import file. Unlike the YAML pane, imports need both a
/// non-empty `id` and an `info` mapping.
pub fn parse_import(text: &str) -> FormatResult<Document> {
    let value = format::from_text(text)?;
    let has_id = match value.get("id") {
        Some(Value::String(id)) => !id.trim().is_empty(),
        _ => false,
    };
    if !has_id {
        return Err(FormatError::invalid_template("missing template id"));
    }
    if !matches!(value.get("info"), Some(Value::Object(_))) {
        return Err(FormatError::invalid_template("missing info block"));
    }
    Document::from_value(value)
}

struct Parsed {
    index: usize,
    document: Document,
    existing: Option<u64>,
}

/// Merges `files` into `templates`, assigning new internal ids from `next_id`.
///
/// Without a resolver every conflict is renamed.
pub fn merge_imports(
    files: &[ImportFile],
    templates: &mut Vec<Template>,
    next_id: &mut u64,
    resolver: Option<&mut dyn ConflictResolver>,
    now: DateTime<Utc>,
) -> ImportReport {
    let mut report = ImportReport::default();

    // 1. Parse in input order; failures never abort the batch
    let mut parsed = Vec::new();
    for (index, file) in files.iter().enumerate() {
        match parse_import(&file.text) {
            Ok(document) => parsed.push(Parsed {
                index,
                existing: find_clash(templates, &document),
                document,
            }),
            Err(error) => {
                tracing::warn!(filename = %file.filename, error = %error, "import failed");
                report.failures.push(ImportFailure {
                    filename: file.filename.clone(),
                    error,
                });
            }
        }
    }

    // 2. Collect conflicts against the pre-batch collection
    let conflicts: Vec<Conflict> = parsed
        .iter()
        .filter_map(|p| {
            p.existing.map(|existing_id| Conflict {
                index: p.index,
                filename: files[p.index].filename.clone(),
                template_name: p.document.display_name().to_string(),
                existing_id,
                document: p.document.clone(),
            })
        })
        .collect();
    report.conflicts = conflicts.len();

    // 3. Ask once for the whole batch
    let decisions = match resolver {
        Some(resolver) if !conflicts.is_empty() => resolver.decide(&conflicts),
        _ => Vec::new(),
    };

    // 4. Apply in input order
    let mut names: HashSet<String> = templates.iter().map(|t| t.name.clone()).collect();
    let mut conflict_no = 0;
    for Parsed {
        document,
        existing,
        ..
    } in parsed
    {
        let Some(existing_id) = existing else {
            let template = Template::new(take_id(next_id), document, now);
            names.insert(template.name.clone());
            report.imported.push(template.clone());
            templates.push(template);
            continue;
        };

        let decision = decisions.get(conflict_no).copied().unwrap_or_default();
        conflict_no += 1;

        match decision {
            Decision::Override => {
                // The stored name stays; only content and modified change
                if let Some(stored) = templates.iter_mut().find(|t| t.internal_id == existing_id) {
                    stored.content = document;
                    stored.modified = now;
                    report.imported.push(stored.clone());
                }
            }
            Decision::Rename => {
                let mut document = document;
                let name = numbered_name(document.display_name(), &names);
                document.info.name = name.clone();
                let template = Template::new(take_id(next_id), document, now).with_name(name);
                names.insert(template.name.clone());
                report.imported.push(template.clone());
                templates.push(template);
            }
            Decision::Skip => {
                tracing::debug!(existing_id, "skipping conflicting import");
            }
        }
    }

    report
}

fn find_clash(templates: &[Template], document: &Document) -> Option<u64> {
    let name = document.display_name();
    templates
        .iter()
        .find(|t| t.name == name || t.content.id == document.id)
        .map(|t| t.internal_id)
}

/// `base (N)` with the smallest N >= 1 not already taken.
fn numbered_name(base: &str, taken: &HashSet<String>) -> String {
    (1..)
        .map(|n| format!("{} ({})", base, n))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

fn take_id(next_id: &mut u64) -> u64 {
    let id = *next_id;
    *next_id += 1;
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Severity;

    fn stored(id: u64, name: &str, content_id: &str) -> Template {
        Template::new(id, Document::new(content_id, name), Utc::now())
    }

    fn file(name: &str, id: &str, info_name: &str) -> ImportFile {
        ImportFile::new(
            name,
            format!("id: {}\ninfo:\n  name: {}\n  severity: high\n", id, info_name),
        )
    }

    #[test]
    fn test_rename_numbers_within_batch() {
        let mut templates = vec![stored(1, "Test", "test")];
        let mut next_id = 2;
        let files = [file("a.yaml", "one", "Test"), file("b.yaml", "two", "Test")];

        let report = merge_imports(&files, &mut templates, &mut next_id, None, Utc::now());

        assert_eq!(report.imported.len(), 2);
        assert_eq!(report.conflicts, 2);
        assert_eq!(templates[1].name, "Test (1)");
        assert_eq!(templates[1].content.info.name, "Test (1)");
        assert_eq!(templates[2].name, "Test (2)");
        assert_eq!(report.first_imported_id(), Some(2));
        assert_eq!(next_id, 4);
    }

    #[test]
    fn test_bad_file_does_not_abort_batch() {
        let mut templates = Vec::new();
        let mut next_id = 1;
        let files = [
            file("1.yaml", "first", "First"),
            ImportFile::new("2.yaml", "id: [unclosed"),
            file("3.yaml", "third", "Third"),
        ];

        let report = merge_imports(&files, &mut templates, &mut next_id, None, Utc::now());

        assert_eq!(report.imported.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].filename, "2.yaml");
        let ids: Vec<_> = templates.iter().map(|t| t.content.id.as_str()).collect();
        assert_eq!(ids, ["first", "third"]);
    }

    #[test]
    fn test_import_requires_id_and_info() {
        assert!(matches!(
            parse_import("info:\n  name: X\n"),
            Err(FormatError::InvalidTemplate(_))
        ));
        assert!(matches!(parse_import("id: x\n"), Err(FormatError::InvalidTemplate(_))));
        assert!(matches!(parse_import("id: ''\ninfo: {name: X}\n"), Err(FormatError::InvalidTemplate(_))));
        assert!(parse_import(r#"{"id": "x", "info": {"name": "X"}}"#).is_ok());
    }

    #[test]
    fn test_unrecognized_matcher_types_import_unchanged() {
        let text = "id: title\ninfo:\n  name: Title\nhttp:\n- method: GET\n  matchers:\n  - type: xpath\n    xpath:\n    - /html/head/title\n    part: body\n";
        let document = parse_import(text).unwrap();
        assert_eq!(document.canonical_yaml().unwrap(), text);
    }

    #[test]
    fn test_override_keeps_internal_id() {
        let mut templates = vec![stored(7, "Old", "scanner")];
        let mut next_id = 8;
        let files = [file("p.yaml", "scanner", "New Name")];
        let mut resolver = Always(Decision::Override);

        let report = merge_imports(&files, &mut templates, &mut next_id, Some(&mut resolver), Utc::now());

        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].internal_id, 7);
        assert_eq!(templates[0].name, "Old");
        assert_eq!(templates[0].content.info.name, "New Name");
        assert_eq!(templates[0].content.info.severity, Some(Severity::High));
        assert_eq!(report.first_imported_id(), Some(7));
        assert_eq!(report.imported, templates);
        assert_eq!(next_id, 8);
    }

    #[test]
    fn test_override_then_rename_numbers_from_stored_names() {
        let mut templates = vec![stored(1, "Base", "base"), stored(2, "Other", "other")];
        let mut next_id = 3;
        let files = [file("a.yaml", "base", "Other"), file("b.yaml", "fresh", "Base")];
        let mut resolver = |conflicts: &[Conflict]| {
            assert_eq!(conflicts.len(), 2);
            vec![Decision::Override, Decision::Rename]
        };

        let report = merge_imports(&files, &mut templates, &mut next_id, Some(&mut resolver), Utc::now());

        let names: Vec<_> = templates.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["Base", "Other", "Base (1)"]);
        let ids: Vec<_> = report.imported.iter().map(|t| t.internal_id).collect();
        assert_eq!(ids, [1, 3]);
    }

    #[test]
    fn test_resolver_sees_whole_batch_once() {
        let mut templates = vec![stored(1, "A", "a"), stored(2, "B", "b")];
        let mut next_id = 3;
        let files = [file("a.yaml", "a", "A"), file("new.yaml", "c", "C"), file("b.yaml", "x", "B")];
        let mut calls = 0;
        let mut resolver = |conflicts: &[Conflict]| {
            calls += 1;
            assert_eq!(conflicts.len(), 2);
            assert_eq!(conflicts[0].existing_id, 1);
            assert_eq!(conflicts[1].index, 2);
            assert_eq!(conflicts[1].template_name, "B");
            vec![Decision::Skip]
        };

        let report = merge_imports(&files, &mut templates, &mut next_id, Some(&mut resolver), Utc::now());

        assert_eq!(calls, 1);
        assert_eq!(report.conflicts, 2);
        assert_eq!(report.imported.len(), 2);
        let names: Vec<_> = templates.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["A", "B", "C", "B (1)"]);
    }

    #[test]
    fn test_conflicts_ignore_earlier_batch_inserts() {
        let mut templates = Vec::new();
        let mut next_id = 1;
        let files = [file("a.yaml", "dup", "Dup"), file("b.yaml", "dup", "Dup")];

        let report = merge_imports(&files, &mut templates, &mut next_id, None, Utc::now());

        assert_eq!(report.conflicts, 0);
        assert_eq!(templates.len(), 2);
    }
}
