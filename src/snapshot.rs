//! Snapshot persistence.
//!
//! Each stage writes one JSON document and replaces the previous one
//! wholesale. Writes go to a sibling `.tmp` file that is synced and then
//! renamed over the target, so readers never observe a half-written
//! snapshot.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{PipelineError, Result};

/// Locations of the four stage snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPaths {
    pub notes: PathBuf,
    pub extractions: PathBuf,
    pub taxonomy: PathBuf,
    pub index: PathBuf,
}

impl SnapshotPaths {
    pub fn new(dir: &Path) -> Self {
        Self {
            notes: dir.join("notes.json"),
            extractions: dir.join("extractions.json"),
            taxonomy: dir.join("taxonomy.json"),
            index: dir.join("index.json"),
        }
    }
}

/// Serialize `value` and atomically replace `path` with it.
pub fn write_snapshot<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(value)?;
    let tmp_path = path.with_extension("json.tmp");
    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;

    tracing::debug!(path = %path.display(), bytes = json.len(), "snapshot written");
    Ok(())
}

/// Read a snapshot produced by an upstream stage.
pub fn read_snapshot<T: DeserializeOwned>(path: &Path) -> Result<T> {
    match read_optional(path)? {
        Some(value) => Ok(value),
        None => Err(PipelineError::MissingSnapshot {
            path: path.to_path_buf(),
        }),
    }
}

/// Read a snapshot, returning `None` if it has not been written yet.
pub fn read_optional<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_str(&content)?))
}

/// Last modification time of a snapshot, as a Unix timestamp.
pub fn modified_at(path: &Path) -> Option<i64> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    let secs = modified
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    i64::try_from(secs).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NoteRecord;
    use tempfile::TempDir;

    #[test]
    fn write_then_read_replaces_previous_snapshot() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("structured").join("notes.json");

        let first = vec![NoteRecord {
            id: 0,
            title: "a".into(),
            content: "first".into(),
        }];
        write_snapshot(&path, &first).unwrap();

        let second: Vec<NoteRecord> = vec![];
        write_snapshot(&path, &second).unwrap();

        let read: Vec<NoteRecord> = read_snapshot(&path).unwrap();
        assert!(read.is_empty());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn missing_snapshot_is_named_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("extractions.json");
        let err = read_snapshot::<Vec<NoteRecord>>(&path).unwrap_err();
        assert!(matches!(err, PipelineError::MissingSnapshot { .. }));
        assert!(read_optional::<Vec<NoteRecord>>(&path).unwrap().is_none());
    }

    #[test]
    fn malformed_snapshot_is_json_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("notes.json");
        fs::write(&path, "{not json").unwrap();
        let err = read_snapshot::<Vec<NoteRecord>>(&path).unwrap_err();
        assert!(matches!(err, PipelineError::Json(_)));
    }
}
