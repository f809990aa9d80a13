//! Category Indexer: joins extraction records against the taxonomy.
//!
//! Every fragment of every non-unused record is filed exactly once. A raw
//! label the taxonomy does not know is filed under its own name (the
//! identity fallback) and reported as orphaned, so no content is dropped.
//! The index is rebuilt in full on every run.

use anyhow::Result as AnyResult;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::models::{used_fragment_count, CategoryIndex, ExtractionRecord, IndexEntry};
use crate::snapshot;
use crate::taxonomy::{invert, CategoryMapping, Collision, CollisionPolicy};

/// Data-quality findings from one indexing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    /// Fragments filed.
    pub fragment_count: usize,
    /// Raw labels filed under themselves, with how many fragments each.
    pub orphaned: BTreeMap<String, usize>,
    /// Labels resolved by the last-wins tie-break.
    pub collisions: Vec<Collision>,
}

#[derive(Debug, Clone)]
pub struct IndexOutcome {
    pub index: CategoryIndex,
    pub report: IndexReport,
}

/// Build the canonical category index.
///
/// Within a bucket, entries keep the order in which their records and
/// fragments were iterated.
pub fn build_index(
    extractions: &[ExtractionRecord],
    mapping: &CategoryMapping,
    policy: CollisionPolicy,
) -> Result<IndexOutcome> {
    let inversion = invert(mapping);
    if policy == CollisionPolicy::Reject {
        if let Some(collision) = inversion.collisions.first() {
            return Err(PipelineError::MappingCollision {
                label: collision.label.clone(),
                groups: collision.groups.clone(),
            });
        }
    }

    let mut index = CategoryIndex::default();
    let mut orphaned: BTreeMap<String, usize> = BTreeMap::new();

    for record in extractions {
        for fragment in record.used_fragments() {
            let bucket = match inversion.canonical_for(&fragment.category) {
                Some(canonical) => canonical,
                None => {
                    *orphaned.entry(fragment.category.clone()).or_default() += 1;
                    fragment.category.as_str()
                }
            };
            index
                .buckets
                .entry(bucket.to_string())
                .or_default()
                .push(IndexEntry {
                    note_id: record.note_id,
                    content: fragment.content.clone(),
                });
        }
    }

    let report = IndexReport {
        fragment_count: index.entry_count(),
        orphaned,
        collisions: inversion.collisions,
    };
    debug_assert_eq!(report.fragment_count, used_fragment_count(extractions));

    Ok(IndexOutcome { index, report })
}

/// Read `extractions.json` and `taxonomy.json`, then replace `index.json`.
pub fn index_stage(config: &Config) -> Result<IndexOutcome> {
    let snapshots = config.paths.snapshots();
    let extractions: Vec<ExtractionRecord> = snapshot::read_snapshot(&snapshots.extractions)?;
    let mapping: CategoryMapping = snapshot::read_snapshot(&snapshots.taxonomy)?;

    let outcome = build_index(&extractions, &mapping, config.taxonomy.on_collision)?;

    for (label, count) in &outcome.report.orphaned {
        warn!(label = %label, fragments = count, "label missing from taxonomy; filed under itself");
    }
    for collision in &outcome.report.collisions {
        warn!(
            label = %collision.label,
            groups = ?collision.groups,
            winner = collision.winner(),
            "raw label claimed by several groups"
        );
    }

    snapshot::write_snapshot(&snapshots.index, &outcome.index)?;
    info!(
        stage = "index",
        categories = outcome.index.buckets.len(),
        fragments = outcome.report.fragment_count,
        "index snapshot written"
    );
    Ok(outcome)
}

/// `notesort index` command.
pub async fn run_index(config: &Config) -> AnyResult<()> {
    let outcome = index_stage(config)?;
    print_outcome(&outcome);
    Ok(())
}

pub(crate) fn print_outcome(outcome: &IndexOutcome) {
    println!("index");
    println!("  categories: {}", outcome.index.buckets.len());
    println!("  fragments filed: {}", outcome.report.fragment_count);
    for (category, entries) in &outcome.index.buckets {
        println!("    {:<32} {:>5}", category, entries.len());
    }
    if !outcome.report.orphaned.is_empty() {
        let labels: Vec<&str> = outcome.report.orphaned.keys().map(String::as_str).collect();
        println!("  unmapped labels (filed as-is): {}", labels.join(", "));
    }
    println!("ok");
}
