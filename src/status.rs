//! Snapshot overview and consistency report.
//!
//! Gives a quick summary of what each stage has produced, how old it is,
//! and whether the snapshots still agree with each other. Used by
//! `notesort status`.

use anyhow::{bail, Result};
use std::path::Path;
use tracing::warn;

use crate::audit::{audit, Severity, Snapshots};
use crate::config::Config;
use crate::intake;
use crate::models::{used_fragment_count, CategoryIndex, ExtractionRecord, NoteRecord};
use crate::snapshot::{self, read_optional};
use crate::taxonomy::CategoryMapping;

/// Run the status command: print snapshot summaries and audit findings.
///
/// Fails when the audit finds a broken invariant.
pub async fn run_status(config: &Config) -> Result<()> {
    let paths = config.paths.snapshots();

    let notes: Option<Vec<NoteRecord>> = read_optional(&paths.notes)?;
    let extractions: Option<Vec<ExtractionRecord>> = read_optional(&paths.extractions)?;
    let taxonomy: Option<CategoryMapping> = read_optional(&paths.taxonomy)?;
    let index: Option<CategoryIndex> = read_optional(&paths.index)?;

    let inbox_pending = match intake::pending_sources(config) {
        Ok(sources) => sources.len().to_string(),
        Err(e) => {
            warn!(error = %e, "cannot list inbox");
            "?".to_string()
        }
    };

    println!("notesort pipeline status");
    println!("========================");
    println!();
    println!(
        "  Inbox:       {} ({} file(s) waiting)",
        config.paths.inbox.display(),
        inbox_pending
    );
    println!("  Snapshots:   {}", config.paths.structured.display());
    println!();
    println!("  {:<12} {:>8}   {:<18} {}", "STAGE", "ITEMS", "UPDATED", "DETAIL");
    println!("  {}", "-".repeat(64));

    print_row(
        "notes",
        &paths.notes,
        notes.as_ref().map(|n| n.len()),
        String::new(),
    );
    print_row(
        "extractions",
        &paths.extractions,
        extractions.as_ref().map(|e| e.len()),
        extractions
            .as_ref()
            .map(|e| {
                format!(
                    "{} unused, {} fragments",
                    e.iter().filter(|r| r.unused).count(),
                    used_fragment_count(e)
                )
            })
            .unwrap_or_default(),
    );
    print_row(
        "taxonomy",
        &paths.taxonomy,
        taxonomy.as_ref().map(|t| t.groups.len()),
        taxonomy
            .as_ref()
            .map(|t| format!("{} raw labels", t.raw_labels().len()))
            .unwrap_or_default(),
    );
    print_row(
        "index",
        &paths.index,
        index.as_ref().map(|i| i.buckets.len()),
        index
            .as_ref()
            .map(|i| format!("{} entries", i.entry_count()))
            .unwrap_or_default(),
    );

    let result = audit(Snapshots {
        notes: notes.as_deref(),
        extractions: extractions.as_deref(),
        taxonomy: taxonomy.as_ref(),
        index: index.as_ref(),
    });

    println!();
    if result.findings.is_empty() {
        println!("  consistency: ok");
    } else {
        println!("  consistency:");
        for finding in &result.findings {
            let tag = match finding.severity {
                Severity::Error => "ERROR",
                Severity::Warning => "warn ",
            };
            println!("    {} {:<24} {}", tag, finding.check, finding.detail);
        }
    }
    println!();

    if result.has_errors() {
        bail!("snapshots are inconsistent; re-run the affected stages");
    }
    Ok(())
}

fn print_row(stage: &str, path: &Path, items: Option<usize>, detail: String) {
    match items {
        Some(n) => {
            let updated = snapshot::modified_at(path)
                .map(format_ts_relative)
                .unwrap_or_else(|| "unknown".to_string());
            println!("  {:<12} {:>8}   {:<18} {}", stage, n, updated, detail);
        }
        None => println!("  {:<12} {:>8}   {:<18}", stage, "-", "missing"),
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
