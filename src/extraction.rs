//! Extraction stage: one classifier call per note.
//!
//! Calls run on a bounded worker pool (a semaphore over a `JoinSet`); the
//! only serialization point is collecting the validated records, which are
//! then sorted by note id before the snapshot is written. Any failed or
//! malformed response aborts the whole run and leaves the previous
//! `extractions.json` in place.

use anyhow::Result as AnyResult;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::classifier::{self, Classifier};
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::models::{used_fragment_count, ExtractionRecord, Fragment, NoteId, NoteRecord};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::prompts::{extraction_shape, EXTRACTION_INSTRUCTIONS};
use crate::snapshot;

const STAGE: &str = "extract";

/// Response body expected from the classifier. Extra fields (an echoed
/// note id, for instance) are ignored; the originating note's id is
/// always stamped on the record.
#[derive(Debug, Deserialize)]
struct ExtractionResponse {
    extractions: Vec<Fragment>,
    unused: bool,
}

/// Payload sent to the classifier for one note.
pub fn extraction_payload(note: &NoteRecord) -> String {
    format!(
        "Note title: {}\nNote ID: {}\nNote content: {}\n",
        note.title, note.id, note.content
    )
}

/// Parse and validate a raw classifier response for `note_id`.
pub fn parse_extraction(note_id: NoteId, raw: &str) -> Result<ExtractionRecord> {
    let unit = format!("note {}", note_id);
    let response: ExtractionResponse =
        serde_json::from_str(raw).map_err(|e| PipelineError::schema(&unit, e.to_string()))?;

    let record = ExtractionRecord {
        note_id,
        extractions: response.extractions,
        unused: response.unused,
    };
    validate_record(&record).map_err(|reason| PipelineError::schema(&unit, reason))?;
    Ok(record)
}

/// Structural checks every persisted record must pass.
pub fn validate_record(record: &ExtractionRecord) -> std::result::Result<(), String> {
    if record.unused && !record.extractions.is_empty() {
        return Err(format!(
            "marked unused but carries {} extraction(s)",
            record.extractions.len()
        ));
    }
    if !record.unused && record.extractions.is_empty() {
        return Err("marked used but carries no extractions".to_string());
    }
    for (i, fragment) in record.extractions.iter().enumerate() {
        if fragment.category.trim().is_empty() {
            return Err(format!("extraction {} has an empty category", i));
        }
        if fragment.content.trim().is_empty() {
            return Err(format!("extraction {} has empty content", i));
        }
    }
    Ok(())
}

async fn extract_one(classifier: &dyn Classifier, note: &NoteRecord) -> Result<ExtractionRecord> {
    let start = Instant::now();
    debug!(note_id = note.id, classifier = classifier.name(), "invoking classifier");

    let raw = classifier
        .invoke(
            EXTRACTION_INSTRUCTIONS,
            &extraction_payload(note),
            &extraction_shape(),
        )
        .await?;
    let record = parse_extraction(note.id, &raw)?;

    info!(
        note_id = note.id,
        fragments = record.extractions.len(),
        unused = record.unused,
        duration_ms = start.elapsed().as_millis() as u64,
        "note extracted"
    );
    Ok(record)
}

/// Extract every note, at most `concurrency` calls in flight.
///
/// On success the result holds exactly one record per input note, sorted
/// by note id.
pub async fn extract_all(
    notes: &[NoteRecord],
    classifier: Arc<dyn Classifier>,
    concurrency: usize,
    progress: &dyn ProgressReporter,
) -> Result<Vec<ExtractionRecord>> {
    let total = notes.len() as u64;
    progress.report(ProgressEvent::Started { stage: STAGE, total });

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();
    for note in notes.iter().cloned() {
        let classifier = Arc::clone(&classifier);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| PipelineError::Worker(e.to_string()))?;
            extract_one(classifier.as_ref(), &note).await
        });
    }

    // Dropping the JoinSet on an early return aborts the remaining calls.
    let mut records = Vec::with_capacity(notes.len());
    while let Some(joined) = tasks.join_next().await {
        let record = joined.map_err(|e| PipelineError::Worker(e.to_string()))??;
        records.push(record);
        progress.report(ProgressEvent::Advanced {
            stage: STAGE,
            n: records.len() as u64,
            total,
        });
    }

    records.sort_by_key(|r| r.note_id);
    ensure_complete(notes, &records)?;
    Ok(records)
}

/// Every note has exactly one record and every record names a known note.
fn ensure_complete(notes: &[NoteRecord], records: &[ExtractionRecord]) -> Result<()> {
    let mut expected: Vec<NoteId> = notes.iter().map(|n| n.id).collect();
    expected.sort_unstable();
    let actual: Vec<NoteId> = records.iter().map(|r| r.note_id).collect();
    if expected == actual {
        return Ok(());
    }
    match actual.iter().find(|id| expected.binary_search(id).is_err()) {
        Some(id) => Err(PipelineError::UnknownNote(*id)),
        None => Err(PipelineError::Worker(format!(
            "expected {} extraction records, collected {}",
            expected.len(),
            actual.len()
        ))),
    }
}

/// Read `notes.json`, extract, and replace `extractions.json`.
pub async fn extract_stage(
    config: &Config,
    classifier: Arc<dyn Classifier>,
    concurrency: usize,
    progress: &dyn ProgressReporter,
) -> Result<Vec<ExtractionRecord>> {
    let snapshots = config.paths.snapshots();
    let notes: Vec<NoteRecord> = snapshot::read_snapshot(&snapshots.notes)?;
    let records = extract_all(&notes, classifier, concurrency, progress).await?;
    snapshot::write_snapshot(&snapshots.extractions, &records)?;
    info!(stage = STAGE, records = records.len(), "extraction snapshot written");
    Ok(records)
}

/// `notesort extract` command.
pub async fn run_extract(
    config: &Config,
    concurrency: Option<usize>,
    progress: &dyn ProgressReporter,
) -> AnyResult<()> {
    let classifier = classifier::create_classifier(&config.classifier)?;
    let concurrency = concurrency.unwrap_or(config.classifier.concurrency);
    let records = extract_stage(config, classifier, concurrency, progress).await?;

    let unused = records.iter().filter(|r| r.unused).count();
    println!("extract");
    println!("  notes classified: {}", records.len());
    println!("  unused notes: {}", unused);
    println!("  fragments: {}", used_fragment_count(&records));
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_carries_id_title_and_content() {
        let note = NoteRecord {
            id: 7,
            title: "groceries".into(),
            content: "buy milk".into(),
        };
        let payload = extraction_payload(&note);
        assert!(payload.contains("Note ID: 7"));
        assert!(payload.contains("Note title: groceries"));
        assert!(payload.contains("Note content: buy milk"));
    }

    #[test]
    fn parse_stamps_originating_note_id() {
        let raw = r#"{"ID": 99, "extractions": [{"category": "Shopping", "content": "buy milk"}], "unused": false}"#;
        let record = parse_extraction(3, raw).unwrap();
        assert_eq!(record.note_id, 3);
        assert_eq!(record.extractions[0].category, "Shopping");
    }

    #[test]
    fn parse_accepts_unused_note() {
        let record = parse_extraction(2, r#"{"extractions": [], "unused": true}"#).unwrap();
        assert!(record.unused);
        assert!(record.is_consistent());
    }

    #[test]
    fn parse_rejects_missing_field() {
        let err = parse_extraction(1, r#"{"extractions": []}"#).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaValidation { .. }));
    }

    #[test]
    fn parse_rejects_unused_with_extractions() {
        let raw = r#"{"extractions": [{"category": "A", "content": "a"}], "unused": true}"#;
        assert!(parse_extraction(1, raw).is_err());
    }

    #[test]
    fn parse_rejects_used_without_extractions() {
        assert!(parse_extraction(1, r#"{"extractions": [], "unused": false}"#).is_err());
    }

    #[test]
    fn parse_rejects_blank_content_or_category() {
        let blank_content = r#"{"extractions": [{"category": "A", "content": "  "}], "unused": false}"#;
        let blank_category = r#"{"extractions": [{"category": "", "content": "a"}], "unused": false}"#;
        assert!(parse_extraction(1, blank_content).is_err());
        assert!(parse_extraction(1, blank_category).is_err());
    }

    #[test]
    fn parse_rejects_non_json() {
        let err = parse_extraction(5, "Sure! Here are the categories").unwrap_err();
        assert!(err.to_string().contains("note 5"));
    }

    #[test]
    fn ensure_complete_flags_unknown_note() {
        let notes = vec![NoteRecord {
            id: 0,
            title: String::new(),
            content: String::new(),
        }];
        let records = vec![ExtractionRecord {
            note_id: 4,
            extractions: vec![],
            unused: true,
        }];
        assert!(matches!(
            ensure_complete(&notes, &records),
            Err(PipelineError::UnknownNote(4))
        ));
    }
}
