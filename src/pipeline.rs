//! Full pipeline orchestration for `notesort run`.
//!
//! Stages run strictly in order: ingest → extract → normalize → index.
//! Each stage reads the previous stage's snapshot from disk, so a failure
//! part-way leaves every earlier snapshot valid and the run can be resumed
//! from the failed stage with the single-stage commands.

use anyhow::{Context, Result};
use tracing::info;

use crate::classifier;
use crate::config::Config;
use crate::extraction;
use crate::index;
use crate::ingest;
use crate::models::used_fragment_count;
use crate::normalize;
use crate::progress::ProgressReporter;

pub async fn run_all(
    config: &Config,
    concurrency: Option<usize>,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let classifier = classifier::create_classifier(&config.classifier)?;

    match ingest::ingest(config).context("ingest stage failed")? {
        Some(outcome) => {
            println!("ingest");
            println!("  notes captured: {}", outcome.notes.len());
            println!("  sources relocated: {}", outcome.relocated);
        }
        None => {
            info!("intake empty; continuing from the existing note snapshot");
            println!("ingest");
            println!("  nothing to ingest, using existing notes snapshot");
        }
    }

    let concurrency = concurrency.unwrap_or(config.classifier.concurrency);
    let records =
        extraction::extract_stage(config, classifier.clone(), concurrency, progress)
            .await
            .context("extract stage failed")?;
    println!("extract");
    println!("  notes classified: {}", records.len());
    println!("  fragments: {}", used_fragment_count(&records));

    let normalized = normalize::normalize_stage(config, classifier.as_ref())
        .await
        .context("normalize stage failed")?;
    normalize::print_outcome(&normalized);

    let indexed = index::index_stage(config).context("index stage failed")?;
    index::print_outcome(&indexed);

    Ok(())
}
