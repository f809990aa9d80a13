//! Browsing the category index.
//!
//! `notesort show` lists canonical categories with their entry counts;
//! `notesort show <category>` prints one bucket.

use anyhow::{bail, Result};
use serde::Serialize;

use crate::config::Config;
use crate::models::{CategoryIndex, IndexEntry};
use crate::snapshot;

#[derive(Debug, Clone, Serialize)]
pub struct CategorySummary {
    pub category: String,
    pub entries: usize,
}

/// Categories in index order with their entry counts.
pub fn list_categories(index: &CategoryIndex) -> Vec<CategorySummary> {
    index
        .buckets
        .iter()
        .map(|(category, entries)| CategorySummary {
            category: category.clone(),
            entries: entries.len(),
        })
        .collect()
}

/// Look up a bucket by exact name, then case-insensitively.
pub fn find_category<'a>(
    index: &'a CategoryIndex,
    name: &str,
) -> Option<(&'a str, &'a [IndexEntry])> {
    index
        .buckets
        .get_key_value(name)
        .or_else(|| {
            index
                .buckets
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
        })
        .map(|(k, v)| (k.as_str(), v.as_slice()))
}

/// `notesort show` command.
pub async fn run_show(config: &Config, category: Option<&str>, json: bool) -> Result<()> {
    let index: CategoryIndex = snapshot::read_snapshot(&config.paths.snapshots().index)?;

    let Some(name) = category else {
        let summaries = list_categories(&index);
        if json {
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        } else {
            println!("{:<40} {:>7}", "CATEGORY", "ENTRIES");
            for s in &summaries {
                println!("{:<40} {:>7}", s.category, s.entries);
            }
        }
        return Ok(());
    };

    let Some((canonical, entries)) = find_category(&index, name) else {
        bail!("category not found: {}", name);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(entries)?);
    } else {
        println!("{} ({} entries)", canonical, entries.len());
        println!("{}", "=".repeat(canonical.len()));
        for entry in entries {
            println!("- [note {}] {}", entry.note_id, entry.content);
        }
    }
    Ok(())
}
