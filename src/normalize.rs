//! Taxonomy Normalizer: collapses the raw label vocabulary into a small
//! canonical taxonomy with one classifier call.
//!
//! The mapping is persisted exactly as the classifier returned it (after
//! shape validation). Labels the classifier left out are reported, not
//! patched; the identity fallback for them happens at indexing time so the
//! taxonomy snapshot stays auditable.

use anyhow::Result as AnyResult;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{info, warn};

use crate::classifier::{self, Classifier};
use crate::config::{Config, TaxonomyConfig};
use crate::error::{PipelineError, Result};
use crate::models::ExtractionRecord;
use crate::prompts::{taxonomy_instructions, taxonomy_shape};
use crate::snapshot;
use crate::taxonomy::{
    check_coverage, observed_labels, CategoryMapping, CollisionPolicy, CoverageReport,
};

const UNIT: &str = "taxonomy";

#[derive(Debug, Deserialize)]
struct TaxonomyResponse {
    categories: Vec<TaxonomyGroup>,
}

#[derive(Debug, Deserialize)]
struct TaxonomyGroup {
    canonical: String,
    raw: Vec<String>,
}

/// Result of one normalization run.
#[derive(Debug, Clone)]
pub struct NormalizeOutcome {
    pub mapping: CategoryMapping,
    pub coverage: CoverageReport,
    /// Size of the observed label multiset.
    pub label_count: usize,
    /// Number of distinct observed labels.
    pub distinct_labels: usize,
}

/// Payload for the taxonomy call: the observed multiset as a JSON array.
/// Duplicates are kept so label frequency can inform the merge.
pub fn taxonomy_payload(labels: &[String]) -> Result<String> {
    Ok(serde_json::to_string_pretty(labels)?)
}

/// Parse and validate the classifier's taxonomy response.
///
/// Groups sharing a canonical name are merged.
pub fn parse_taxonomy(raw: &str) -> Result<CategoryMapping> {
    let response: TaxonomyResponse =
        serde_json::from_str(raw).map_err(|e| PipelineError::schema(UNIT, e.to_string()))?;

    let mut mapping = CategoryMapping::default();
    for (i, group) in response.categories.into_iter().enumerate() {
        if group.canonical.trim().is_empty() {
            return Err(PipelineError::schema(
                UNIT,
                format!("group {} has an empty canonical name", i),
            ));
        }
        if group.raw.iter().any(|r| r.trim().is_empty()) {
            return Err(PipelineError::schema(
                UNIT,
                format!("group '{}' lists an empty raw label", group.canonical),
            ));
        }
        mapping.insert_group(group.canonical, group.raw);
    }
    Ok(mapping)
}

/// Build a canonical taxonomy for the labels observed in `extractions`.
pub async fn normalize(
    extractions: &[ExtractionRecord],
    classifier: &dyn Classifier,
    settings: &TaxonomyConfig,
) -> Result<NormalizeOutcome> {
    let labels = observed_labels(extractions);
    let distinct_labels = labels.iter().collect::<BTreeSet<_>>().len();

    if labels.is_empty() {
        info!(stage = "normalize", "no labels observed; taxonomy is empty");
        return Ok(NormalizeOutcome {
            mapping: CategoryMapping::default(),
            coverage: CoverageReport::default(),
            label_count: 0,
            distinct_labels: 0,
        });
    }

    let start = Instant::now();
    let raw = classifier
        .invoke(
            &taxonomy_instructions(settings),
            &taxonomy_payload(&labels)?,
            &taxonomy_shape(),
        )
        .await?;
    let mapping = parse_taxonomy(&raw)?;
    let coverage = check_coverage(&mapping, &labels);

    info!(
        stage = "normalize",
        labels = labels.len(),
        distinct_labels,
        groups = mapping.groups.len(),
        duration_ms = start.elapsed().as_millis() as u64,
        "taxonomy received"
    );

    if !coverage.is_complete() {
        warn!(
            missing = ?coverage.missing,
            "taxonomy omits observed labels; they will be indexed under their raw names"
        );
        if settings.strict_coverage {
            return Err(PipelineError::TaxonomyIncomplete {
                missing: coverage.missing,
            });
        }
    }
    for collision in &coverage.collisions {
        warn!(
            label = %collision.label,
            groups = ?collision.groups,
            winner = collision.winner(),
            "raw label claimed by several groups"
        );
    }
    if settings.on_collision == CollisionPolicy::Reject {
        if let Some(collision) = coverage.collisions.first() {
            return Err(PipelineError::MappingCollision {
                label: collision.label.clone(),
                groups: collision.groups.clone(),
            });
        }
    }

    Ok(NormalizeOutcome {
        mapping,
        coverage,
        label_count: labels.len(),
        distinct_labels,
    })
}

/// Read `extractions.json`, normalize, and replace `taxonomy.json`.
pub async fn normalize_stage(
    config: &Config,
    classifier: &dyn Classifier,
) -> Result<NormalizeOutcome> {
    let snapshots = config.paths.snapshots();
    let extractions: Vec<ExtractionRecord> = snapshot::read_snapshot(&snapshots.extractions)?;
    let outcome = normalize(&extractions, classifier, &config.taxonomy).await?;
    snapshot::write_snapshot(&snapshots.taxonomy, &outcome.mapping)?;
    Ok(outcome)
}

/// `notesort normalize` command.
pub async fn run_normalize(config: &Config) -> AnyResult<()> {
    let classifier = classifier::create_classifier(&config.classifier)?;
    let outcome = normalize_stage(config, classifier.as_ref()).await?;
    print_outcome(&outcome);
    Ok(())
}

pub(crate) fn print_outcome(outcome: &NormalizeOutcome) {
    println!("normalize");
    println!(
        "  raw labels: {} ({} distinct)",
        outcome.label_count, outcome.distinct_labels
    );
    println!("  canonical categories: {}", outcome.mapping.groups.len());
    if outcome.coverage.is_complete() {
        println!("  coverage: complete");
    } else {
        println!(
            "  coverage: INCOMPLETE, {} label(s) unmapped: {}",
            outcome.coverage.missing.len(),
            outcome.coverage.missing.join(", ")
        );
    }
    if !outcome.coverage.unobserved.is_empty() {
        println!(
            "  labels never observed: {}",
            outcome.coverage.unobserved.join(", ")
        );
    }
    for collision in &outcome.coverage.collisions {
        println!(
            "  collision: '{}' claimed by {} (using '{}')",
            collision.label,
            collision.groups.join(", "),
            collision.winner()
        );
    }
    println!("ok");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_builds_mapping() {
        let raw = r#"{"categories": [
            {"canonical": "Movies to Watch", "raw": ["Films to See", "Movies to Watch"]},
            {"canonical": "Shopping List", "raw": ["Groceries"]}
        ]}"#;
        let mapping = parse_taxonomy(raw).unwrap();
        assert_eq!(mapping.groups.len(), 2);
        assert!(mapping.groups["Movies to Watch"].contains("Films to See"));
    }

    #[test]
    fn parse_merges_repeated_canonical() {
        let raw = r#"{"categories": [
            {"canonical": "Gift Ideas", "raw": ["Present Ideas"]},
            {"canonical": "Gift Ideas", "raw": ["Gifts"]}
        ]}"#;
        let mapping = parse_taxonomy(raw).unwrap();
        assert_eq!(mapping.groups["Gift Ideas"].len(), 2);
    }

    #[test]
    fn parse_rejects_wrong_shape() {
        let err = parse_taxonomy(r#"["Movies", "Books"]"#).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaValidation { .. }));
    }

    #[test]
    fn parse_rejects_blank_names() {
        assert!(parse_taxonomy(r#"{"categories": [{"canonical": " ", "raw": ["a"]}]}"#).is_err());
        assert!(parse_taxonomy(r#"{"categories": [{"canonical": "A", "raw": [""]}]}"#).is_err());
    }

    #[test]
    fn payload_keeps_duplicates() {
        let labels = vec!["Shopping".to_string(), "Shopping".to_string()];
        let payload = taxonomy_payload(&labels).unwrap();
        let back: Vec<String> = serde_json::from_str(&payload).unwrap();
        assert_eq!(back.len(), 2);
    }
}
