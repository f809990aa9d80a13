//! Cross-snapshot consistency checks.
//!
//! Stages run independently and may be re-run out of order, so the
//! snapshots on disk can disagree (e.g. `extractions.json` built from an
//! older note batch). [`audit`] evaluates the pipeline invariants over
//! whichever snapshots are present.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::models::{used_fragment_count, CategoryIndex, ExtractionRecord, NoteRecord};
use crate::taxonomy::{check_coverage, observed_labels, CategoryMapping};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// A broken invariant; downstream output cannot be trusted.
    Error,
    /// A data-quality signal with a defined fallback.
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub check: &'static str,
    pub severity: Severity,
    pub detail: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Audit {
    pub findings: Vec<Finding>,
}

impl Audit {
    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Error)
    }

    fn error(&mut self, check: &'static str, detail: String) {
        self.findings.push(Finding {
            check,
            severity: Severity::Error,
            detail,
        });
    }

    fn warning(&mut self, check: &'static str, detail: String) {
        self.findings.push(Finding {
            check,
            severity: Severity::Warning,
            detail,
        });
    }
}

/// Snapshots available for auditing; any may be absent.
#[derive(Debug, Default, Clone, Copy)]
pub struct Snapshots<'a> {
    pub notes: Option<&'a [NoteRecord]>,
    pub extractions: Option<&'a [ExtractionRecord]>,
    pub taxonomy: Option<&'a CategoryMapping>,
    pub index: Option<&'a CategoryIndex>,
}

pub fn audit(snapshots: Snapshots<'_>) -> Audit {
    let mut audit = Audit::default();

    if let Some(notes) = snapshots.notes {
        check_dense_ids(notes, &mut audit);
    }

    if let Some(extractions) = snapshots.extractions {
        for record in extractions.iter().filter(|r| !r.is_consistent()) {
            audit.error(
                "unused-invariant",
                format!(
                    "note {}: unused = {} with {} extraction(s)",
                    record.note_id,
                    record.unused,
                    record.extractions.len()
                ),
            );
        }
        if let Some(notes) = snapshots.notes {
            check_completeness(notes, extractions, &mut audit);
        }
    }

    if let (Some(extractions), Some(mapping)) = (snapshots.extractions, snapshots.taxonomy) {
        let coverage = check_coverage(mapping, &observed_labels(extractions));
        if !coverage.is_complete() {
            audit.warning(
                "taxonomy-coverage",
                format!("unmapped labels: {}", coverage.missing.join(", ")),
            );
        }
        for collision in coverage.collisions {
            audit.warning(
                "taxonomy-partition",
                format!(
                    "'{}' claimed by {}",
                    collision.label,
                    collision.groups.join(", ")
                ),
            );
        }
    }

    if let (Some(extractions), Some(index)) = (snapshots.extractions, snapshots.index) {
        let expected = used_fragment_count(extractions);
        let filed = index.entry_count();
        if expected != filed {
            audit.error(
                "index-conservation",
                format!(
                    "index holds {} entries but extractions hold {} fragments",
                    filed, expected
                ),
            );
        }
    }

    audit
}

fn check_dense_ids(notes: &[NoteRecord], audit: &mut Audit) {
    let mut ids: Vec<u64> = notes.iter().map(|n| n.id).collect();
    ids.sort_unstable();
    let dense = ids.iter().zip(0u64..).all(|(id, expected)| *id == expected);
    if !dense {
        audit.error(
            "note-identity",
            format!("note ids are not a dense range 0..{}", notes.len()),
        );
    }
}

fn check_completeness(notes: &[NoteRecord], extractions: &[ExtractionRecord], audit: &mut Audit) {
    let note_ids: BTreeSet<u64> = notes.iter().map(|n| n.id).collect();
    let mut seen = BTreeSet::new();

    for record in extractions {
        if !note_ids.contains(&record.note_id) {
            audit.error(
                "extraction-completeness",
                format!("extraction for unknown note {}", record.note_id),
            );
        }
        if !seen.insert(record.note_id) {
            audit.error(
                "extraction-completeness",
                format!("note {} extracted more than once", record.note_id),
            );
        }
    }

    let missing: Vec<String> = note_ids
        .difference(&seen)
        .map(|id| id.to_string())
        .collect();
    if !missing.is_empty() {
        audit.error(
            "extraction-completeness",
            format!("notes without extraction: {}", missing.join(", ")),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Fragment, IndexEntry};

    fn note(id: u64) -> NoteRecord {
        NoteRecord {
            id,
            title: format!("n{id}"),
            content: "text".into(),
        }
    }

    fn used(note_id: u64, category: &str) -> ExtractionRecord {
        ExtractionRecord {
            note_id,
            extractions: vec![Fragment {
                category: category.into(),
                content: "text".into(),
            }],
            unused: false,
        }
    }

    #[test]
    fn consistent_snapshots_have_no_findings() {
        let notes = vec![note(0), note(1)];
        let extractions = vec![
            used(0, "Shopping"),
            ExtractionRecord {
                note_id: 1,
                extractions: vec![],
                unused: true,
            },
        ];
        let mut taxonomy = CategoryMapping::default();
        taxonomy.insert_group("Shopping List", ["Shopping"]);
        let mut index = CategoryIndex::default();
        index.buckets.insert(
            "Shopping List".into(),
            vec![IndexEntry {
                note_id: 0,
                content: "text".into(),
            }],
        );

        let result = audit(Snapshots {
            notes: Some(&notes),
            extractions: Some(&extractions),
            taxonomy: Some(&taxonomy),
            index: Some(&index),
        });
        assert!(result.findings.is_empty(), "{:?}", result.findings);
    }

    #[test]
    fn detects_gaps_duplicates_and_stale_index() {
        let notes = vec![note(0), note(2)];
        let extractions = vec![used(0, "A"), used(0, "A"), used(7, "B")];
        let index = CategoryIndex::default();

        let result = audit(Snapshots {
            notes: Some(&notes),
            extractions: Some(&extractions),
            index: Some(&index),
            ..Snapshots::default()
        });
        let checks: Vec<_> = result.findings.iter().map(|f| f.check).collect();
        assert!(checks.contains(&"note-identity"));
        assert!(checks.contains(&"extraction-completeness"));
        assert!(checks.contains(&"index-conservation"));
        assert!(result.has_errors());
    }

    #[test]
    fn incomplete_taxonomy_is_only_a_warning() {
        let extractions = vec![used(0, "Groceries")];
        let taxonomy = CategoryMapping::default();
        let result = audit(Snapshots {
            extractions: Some(&extractions),
            taxonomy: Some(&taxonomy),
            ..Snapshots::default()
        });
        assert_eq!(result.findings.len(), 1);
        assert_eq!(result.findings[0].severity, Severity::Warning);
        assert!(!result.has_errors());
    }
}
