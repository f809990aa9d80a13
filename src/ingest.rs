//! Note Store: identity assignment and the note snapshot.
//!
//! `ingest` reads the whole intake batch first, numbers the notes densely
//! from 0 in scan order, writes `notes.json` atomically and only then moves
//! the sources to the processed area. A failure while reading leaves both
//! the inbox and the previous snapshot untouched.

use anyhow::Result as AnyResult;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::intake::{self, IntakeItem};
use crate::models::NoteRecord;
use crate::snapshot;

/// Outcome of a successful, non-empty ingest.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub notes: Vec<NoteRecord>,
    pub relocated: usize,
}

/// Number the items 0..n in the order given.
pub fn assign_ids(items: &[IntakeItem]) -> Vec<NoteRecord> {
    items
        .iter()
        .zip(0u64..)
        .map(|(item, id)| NoteRecord {
            id,
            title: item.title.clone(),
            content: item.content.clone(),
        })
        .collect()
}

/// Run the Note Store stage.
///
/// Returns `Ok(None)` when the intake is empty; in that case nothing is
/// written, so a second run over an emptied inbox leaves the existing
/// snapshot as it was.
pub fn ingest(config: &Config) -> Result<Option<IngestOutcome>> {
    let items = intake::scan_intake(config)?;
    if items.is_empty() {
        info!(inbox = %config.paths.inbox.display(), "intake is empty");
        return Ok(None);
    }

    let notes = assign_ids(&items);
    let snapshots = config.paths.snapshots();
    snapshot::write_snapshot(&snapshots.notes, &notes)?;
    info!(stage = "ingest", notes = notes.len(), "note snapshot written");

    let relocated = intake::relocate(&items, &config.paths.processed).inspect_err(|e| {
        warn!(error = %e, "snapshot written but relocation failed; inbox still holds sources");
    })?;

    Ok(Some(IngestOutcome { notes, relocated }))
}

/// `notesort ingest` command.
pub async fn run_ingest(config: &Config, dry_run: bool) -> AnyResult<()> {
    if dry_run {
        let items = intake::pending_sources(config)?;
        println!("ingest (dry-run)");
        println!("  sources found: {}", items.len());
        for (id, item) in items.iter().enumerate() {
            println!("  [{}] {}", id, item.relative.display());
        }
        return Ok(());
    }

    match ingest(config)? {
        Some(outcome) => {
            println!("ingest");
            println!("  notes captured: {}", outcome.notes.len());
            println!("  sources relocated: {}", outcome.relocated);
            println!("  snapshot: {}", config.paths.snapshots().notes.display());
            println!("ok");
        }
        None => {
            println!("ingest");
            println!("  nothing to ingest");
        }
    }
    Ok(())
}
