//! Worktree records: proof that a worktree was completely built.
//!
//! Persists one `WorktreeRecord` JSON document per worktree at
//! `<root>/.git/gitmirror/worktrees/<key>.json`, written with the `.tmp` +
//! rename pattern. A worktree directory without a readable record is partial.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gitmirror_core::{CommitId, SubmoduleMode};

use crate::error::{io_err, SyncError};
use crate::worktree::WorktreeKey;

/// One materialized nested repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmoduleRecord {
    pub name: String,
    /// Path relative to the top-level worktree, nesting included.
    pub path: PathBuf,
    /// Absolute URL the entry was fetched from.
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub mode: SubmoduleMode,
    pub commit: CommitId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorktreeRecord {
    pub key: String,
    pub commit: CommitId,
    pub built_at: DateTime<Utc>,
    #[serde(default)]
    pub submodules: Vec<SubmoduleRecord>,
}

impl WorktreeRecord {
    pub fn remote_tracking(&self) -> impl Iterator<Item = &SubmoduleRecord> {
        self.submodules
            .iter()
            .filter(|s| s.mode == SubmoduleMode::RemoteTracking)
    }
}

/// `<root>/.git/gitmirror/worktrees`
pub fn records_dir_at(root: &Path) -> PathBuf {
    root.join(".git").join("gitmirror").join("worktrees")
}

/// `<root>/.git/gitmirror/worktrees/<key>.json`
pub fn record_path_at(root: &Path, key: &WorktreeKey) -> PathBuf {
    records_dir_at(root).join(format!("{}.json", key.as_str()))
}

/// Load the record for `key`. Missing or unreadable records are `None`.
pub fn load_at(root: &Path, key: &WorktreeKey) -> Option<WorktreeRecord> {
    let path = record_path_at(root, key);
    let contents = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str::<WorktreeRecord>(&contents) {
        Ok(record) if record.key == key.as_str() => Some(record),
        Ok(_) => {
            tracing::warn!(path = %path.display(), "worktree record key mismatch");
            None
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unreadable worktree record");
            None
        }
    }
}

/// Save atomically: writes to `<path>.tmp` then renames.
pub fn save_at(root: &Path, record: &WorktreeRecord) -> Result<(), SyncError> {
    let key = WorktreeKey::from_raw(&record.key);
    let path = record_path_at(root, &key);
    let dir = records_dir_at(root);
    std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;

    let json = serde_json::to_string_pretty(record).map_err(|source| SyncError::Record {
        path: path.clone(),
        source,
    })?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, &path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(&path, e));
    }
    Ok(())
}

pub fn remove_at(root: &Path, key: &WorktreeKey) -> Result<(), SyncError> {
    let path = record_path_at(root, key);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(&path, e)),
    }
}

/// Keys that have a record file, in sorted order.
pub fn list_keys_at(root: &Path) -> Result<Vec<WorktreeKey>, SyncError> {
    let dir = records_dir_at(root);
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_err(&dir, e)),
    };
    let mut keys = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| io_err(&dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(stem) = name.strip_suffix(".json") {
            keys.push(WorktreeKey::from_raw(stem));
        }
    }
    keys.sort();
    Ok(keys)
}
