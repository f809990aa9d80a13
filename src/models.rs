//! Core data models used throughout notesort.
//!
//! These are the records that flow between the pipeline stages and land in
//! the JSON snapshots. The taxonomy mapping lives in [`crate::taxonomy`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identity assigned to a note at ingestion time. Dense within a batch,
/// starting at 0.
pub type NoteId = u64;

/// A raw note captured from the intake area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRecord {
    pub id: NoteId,
    pub title: String,
    pub content: String,
}

/// A verbatim excerpt of a note tagged with one raw category label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub category: String,
    pub content: String,
}

/// Classifier output for one note.
///
/// `unused == true` exactly when `extractions` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub note_id: NoteId,
    pub extractions: Vec<Fragment>,
    pub unused: bool,
}

impl ExtractionRecord {
    /// Whether the `unused` flag agrees with the fragment list.
    pub fn is_consistent(&self) -> bool {
        self.unused == self.extractions.is_empty()
    }

    /// Fragments that count towards the taxonomy and the index.
    ///
    /// Unused records contribute nothing, even if a hand-edited snapshot
    /// left fragments on them.
    pub fn used_fragments(&self) -> &[Fragment] {
        if self.unused {
            &[]
        } else {
            &self.extractions
        }
    }
}

/// Total number of fragments across all non-unused records.
pub fn used_fragment_count(records: &[ExtractionRecord]) -> usize {
    records.iter().map(|r| r.used_fragments().len()).sum()
}

/// One filed excerpt inside a [`CategoryIndex`] bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub note_id: NoteId,
    pub content: String,
}

/// Final canonical category → content index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryIndex {
    pub buckets: BTreeMap<String, Vec<IndexEntry>>,
}

impl CategoryIndex {
    pub fn entry_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn get(&self, category: &str) -> Option<&[IndexEntry]> {
        self.buckets.get(category).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(category: &str, content: &str) -> Fragment {
        Fragment {
            category: category.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn unused_record_contributes_no_fragments() {
        let record = ExtractionRecord {
            note_id: 4,
            extractions: vec![fragment("Shopping", "milk")],
            unused: true,
        };
        assert!(!record.is_consistent());
        assert!(record.used_fragments().is_empty());
    }

    #[test]
    fn used_fragment_count_skips_unused() {
        let records = vec![
            ExtractionRecord {
                note_id: 0,
                extractions: vec![fragment("A", "a"), fragment("B", "b")],
                unused: false,
            },
            ExtractionRecord {
                note_id: 1,
                extractions: vec![],
                unused: true,
            },
        ];
        assert_eq!(used_fragment_count(&records), 2);
    }

    #[test]
    fn category_index_serializes_as_plain_object() {
        let mut index = CategoryIndex::default();
        index.buckets.insert(
            "Shopping List".to_string(),
            vec![IndexEntry {
                note_id: 1,
                content: "buy milk".to_string(),
            }],
        );
        let json = serde_json::to_value(&index).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"Shopping List": [{"note_id": 1, "content": "buy milk"}]})
        );
    }
}
