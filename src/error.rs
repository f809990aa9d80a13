//! Error types for the notesort pipeline.
//!
//! Every stage returns [`Result`]. Data-quality signals that do not stop a
//! stage (an incomplete taxonomy, an orphaned label) are reported as values
//! (see [`crate::taxonomy::CoverageReport`] and [`crate::index::IndexReport`]);
//! they only become errors here when the configuration asks for strictness.

use std::path::PathBuf;

use thiserror::Error;

use crate::models::NoteId;

/// Result type alias using the pipeline's [`PipelineError`].
pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// A note source could not be read. Aborts the whole ingest batch.
    #[error("cannot read note source {}: {source}", path.display())]
    IntakeRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A captured source could not be moved out of the inbox.
    #[error("cannot relocate note source {}: {source}", path.display())]
    Relocate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A classifier response did not conform to the expected shape.
    #[error("schema validation failed for {unit}: {reason}")]
    SchemaValidation { unit: String, reason: String },

    /// The classification call could not be completed.
    #[error("classifier unavailable: {0}")]
    CollaboratorUnavailable(String),

    /// Observed raw labels missing from the taxonomy (strict coverage only).
    #[error(
        "taxonomy does not cover {} observed label(s): {}",
        missing.len(),
        missing.join(", ")
    )]
    TaxonomyIncomplete { missing: Vec<String> },

    /// A raw label is claimed by more than one canonical group
    /// (`on_collision = "reject"` only).
    #[error("raw label '{label}' is claimed by several groups: {}", groups.join(", "))]
    MappingCollision { label: String, groups: Vec<String> },

    /// An upstream snapshot has not been produced yet.
    #[error("snapshot not found: {} (run the upstream stage first)", path.display())]
    MissingSnapshot { path: PathBuf },

    /// An extraction record references a note that is not in the note snapshot.
    #[error("extraction references unknown note {0}")]
    UnknownNote(NoteId),

    /// Invalid settings detected while running a stage.
    #[error("configuration error: {0}")]
    Config(String),

    /// A background extraction worker failed to complete.
    #[error("worker error: {0}")]
    Worker(String),

    #[error("snapshot I/O error: {0}")]
    Snapshot(#[from] std::io::Error),

    #[error("snapshot JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub(crate) fn schema(unit: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::SchemaValidation {
            unit: unit.into(),
            reason: reason.into(),
        }
    }
}
