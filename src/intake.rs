//! Filesystem intake area.
//!
//! Scans the inbox for note sources and moves them to the processed area
//! once they have been captured.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{PipelineError, Result};

/// A note source read in full from the inbox.
#[derive(Debug, Clone)]
pub struct IntakeItem {
    pub path: PathBuf,
    /// Path relative to the inbox root, used for ordering and relocation.
    pub relative: PathBuf,
    pub title: String,
    pub content: String,
}

/// A matching source found in the inbox, not yet read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSource {
    pub path: PathBuf,
    pub relative: PathBuf,
}

/// List every source in the inbox that `ingest` would capture, in
/// relative-path order.
///
/// The processed area and the snapshot directory are skipped when they
/// live inside the inbox, so relocated sources are never seen again.
pub fn pending_sources(config: &Config) -> Result<Vec<PendingSource>> {
    let root = &config.paths.inbox;
    if !root.exists() {
        return Err(PipelineError::Config(format!(
            "intake directory does not exist: {}",
            root.display()
        )));
    }

    let include_set = build_globset(&config.intake.include_globs)?;

    let mut default_excludes = vec!["**/.git/**".to_string(), "**/.*".to_string()];
    default_excludes.extend(config.intake.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&default_excludes)?;

    let pruned = [
        normalize_lexically(&config.paths.processed),
        normalize_lexically(&config.paths.structured),
    ];

    let mut sources = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(config.intake.follow_symlinks)
        .into_iter()
        .filter_entry(|e| {
            let path = normalize_lexically(e.path());
            !pruned.iter().any(|p| path.starts_with(p))
        });
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
            PipelineError::IntakeRead {
                path,
                source: e.into(),
            }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy();

        if exclude_set.is_match(rel_str.as_ref()) {
            continue;
        }
        if !include_set.is_match(rel_str.as_ref()) {
            continue;
        }

        sources.push(PendingSource {
            path: path.to_path_buf(),
            relative: relative.to_path_buf(),
        });
    }

    // Sort for deterministic ordering
    sources.sort_by(|a, b| a.relative.cmp(&b.relative));

    Ok(sources)
}

/// Read every matching source in the inbox, in relative-path order.
///
/// Any unreadable source fails the whole scan.
pub fn scan_intake(config: &Config) -> Result<Vec<IntakeItem>> {
    pending_sources(config)?.into_iter().map(read_item).collect()
}

fn read_item(source: PendingSource) -> Result<IntakeItem> {
    let content = fs::read_to_string(&source.path).map_err(|e| PipelineError::IntakeRead {
        path: source.path.clone(),
        source: e,
    })?;

    let title = source
        .path
        .file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(IntakeItem {
        path: source.path,
        relative: source.relative,
        title,
        content,
    })
}

/// Resolve `.` and `..` components without touching the filesystem.
pub(crate) fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Move captured sources into `processed`, keeping their relative layout.
///
/// A name clash in the processed area gets a numeric suffix rather than
/// overwriting an earlier batch. Only a cross-device rename falls back to
/// copy and remove; any other failure is returned as is.
pub fn relocate(items: &[IntakeItem], processed: &Path) -> Result<usize> {
    let mut moved = 0;
    for item in items {
        let target = free_target(&processed.join(&item.relative));
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| relocate_error(item, e))?;
        }
        match fs::rename(&item.path, &target) {
            Ok(()) => {}
            Err(e) if is_cross_device(&e) => {
                copy_then_remove(&item.path, &target).map_err(|e| relocate_error(item, e))?;
            }
            Err(e) => return Err(relocate_error(item, e)),
        }
        tracing::debug!(from = %item.path.display(), to = %target.display(), "source relocated");
        moved += 1;
    }
    Ok(moved)
}

fn relocate_error(item: &IntakeItem, source: io::Error) -> PipelineError {
    PipelineError::Relocate {
        path: item.path.clone(),
        source,
    }
}

/// EXDEV on Unix, ERROR_NOT_SAME_DEVICE on Windows.
fn is_cross_device(err: &io::Error) -> bool {
    #[cfg(unix)]
    const CROSS_DEVICE: i32 = 18;
    #[cfg(windows)]
    const CROSS_DEVICE: i32 = 17;
    #[cfg(not(any(unix, windows)))]
    const CROSS_DEVICE: i32 = -1;

    err.raw_os_error() == Some(CROSS_DEVICE)
}

/// A copy is never left behind in the processed area when the source
/// cannot be removed.
fn copy_then_remove(from: &Path, to: &Path) -> io::Result<()> {
    fs::copy(from, to)?;
    if let Err(e) = fs::remove_file(from) {
        if let Err(cleanup) = fs::remove_file(to) {
            tracing::warn!(
                path = %to.display(),
                error = %cleanup,
                "could not remove partial copy after failed relocation"
            );
        }
        return Err(e);
    }
    Ok(())
}

fn free_target(target: &Path) -> PathBuf {
    if !target.exists() {
        return target.to_path_buf();
    }
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = target
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let mut n = 1;
    loop {
        let candidate = target.with_file_name(format!("{stem}-{n}{ext}"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| PipelineError::Config(format!("invalid glob '{pattern}': {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| PipelineError::Config(format!("invalid glob set: {e}")))
}
