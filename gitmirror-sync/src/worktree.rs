//! WorktreePool: materialized checkouts under `<root>/worktrees/<key>`.
//!
//! A worktree is only trusted when three things agree: git has it
//! registered, its HEAD is the expected commit, and a record exists. Anything
//! else at the expected path is discarded and rebuilt.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use gitmirror_core::CommitId;

use crate::error::{io_err, SyncError};
use crate::exec::{Git, OpClass};
use crate::record::{self, WorktreeRecord};

pub const WORKTREES_DIR: &str = "worktrees";
const FINGERPRINT_LEN: usize = 12;

// ---------------------------------------------------------------------------
// WorktreeKey
// ---------------------------------------------------------------------------

/// Directory name of a worktree: `<commit>` or `<commit>-<fingerprint>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorktreeKey(String);

impl WorktreeKey {
    pub fn for_commit(commit: &CommitId) -> Self {
        Self(commit.as_str().to_string())
    }

    /// Key for a rebuild of `commit` whose remote-tracking submodules moved.
    pub fn with_fingerprint(commit: &CommitId, fingerprint: &str) -> Self {
        Self(format!("{}-{fingerprint}", commit.as_str()))
    }

    pub(crate) fn from_raw(raw: &str) -> Self {
        Self(raw.to_string())
    }

    /// Recognise a directory name produced by this module.
    pub fn parse(name: &str) -> Option<Self> {
        let (commit, suffix) = match name.split_once('-') {
            Some((commit, fp)) => (commit, Some(fp)),
            None => (name, None),
        };
        CommitId::parse(commit).ok()?;
        if commit.bytes().any(|b| b.is_ascii_uppercase()) {
            return None;
        }
        if let Some(fp) = suffix {
            let well_formed = fp.len() == FINGERPRINT_LEN
                && fp.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
            if !well_formed {
                return None;
            }
        }
        Some(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The commit part of the key.
    pub fn commit_str(&self) -> &str {
        self.0.split_once('-').map_or(self.0.as_str(), |(c, _)| c)
    }
}

impl fmt::Display for WorktreeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Short SHA-256 over `(path, commit)` pairs, order-independent.
pub fn fingerprint<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a Path, &'a CommitId)>,
{
    let mut lines: Vec<String> = entries
        .into_iter()
        .map(|(path, commit)| format!("{}={}\n", path.display(), commit))
        .collect();
    lines.sort();
    let mut hasher = Sha256::new();
    for line in &lines {
        hasher.update(line.as_bytes());
    }
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(FINGERPRINT_LEN);
    digest
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

/// Outcome of inspecting the expected path for a key.
#[derive(Debug)]
pub enum Validity {
    Valid(WorktreeRecord),
    Missing,
    Partial(String),
}

#[derive(Debug, Clone)]
pub struct WorktreePool {
    root: PathBuf,
}

impl WorktreePool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn worktrees_dir(&self) -> PathBuf {
        self.root.join(WORKTREES_DIR)
    }

    pub fn path_for(&self, key: &WorktreeKey) -> PathBuf {
        self.worktrees_dir().join(key.as_str())
    }

    /// Keys of every directory under `worktrees/`, recognised or not
    /// (unrecognised names are returned raw so they can be pruned).
    pub fn existing_keys(&self) -> Result<Vec<WorktreeKey>, SyncError> {
        let dir = self.worktrees_dir();
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&dir, e)),
        };
        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            keys.push(WorktreeKey::parse(&name).unwrap_or_else(|| WorktreeKey::from_raw(&name)));
        }
        keys.sort();
        Ok(keys)
    }

    /// Paths git has registered as worktrees of the store.
    pub async fn registered(&self, git: &Git) -> Result<Vec<PathBuf>, SyncError> {
        let stdout = git
            .command(&self.root)
            .args(["worktree", "list", "--porcelain"])
            .run(OpClass::Local)
            .await?;
        Ok(stdout
            .lines()
            .filter_map(|line| line.strip_prefix("worktree "))
            .map(|p| canonical(Path::new(p)))
            .collect())
    }

    pub async fn validate(
        &self,
        git: &Git,
        key: &WorktreeKey,
        commit: &CommitId,
    ) -> Result<Validity, SyncError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(Validity::Missing);
        }
        let Some(record) = record::load_at(&self.root, key) else {
            return Ok(Validity::Partial("no record".to_string()));
        };
        if &record.commit != commit {
            return Ok(Validity::Partial(format!("record names {}", record.commit)));
        }
        if !self.registered(git).await?.contains(&canonical(&path)) {
            return Ok(Validity::Partial("not registered with the store".to_string()));
        }
        match head(git, &path).await {
            Ok(actual) if &actual == commit => Ok(Validity::Valid(record)),
            Ok(actual) => Ok(Validity::Partial(format!("HEAD is {actual}"))),
            Err(e) => Ok(Validity::Partial(format!("unreadable HEAD: {e}"))),
        }
    }

    /// Check out `commit` into a fresh directory for `key`. The caller must
    /// have discarded anything previously at that path.
    pub async fn create(
        &self,
        git: &Git,
        key: &WorktreeKey,
        commit: &CommitId,
    ) -> Result<PathBuf, SyncError> {
        let dir = self.worktrees_dir();
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        let path = self.path_for(key);
        git.command(&self.root)
            .args(["worktree", "add", "--force", "--detach"])
            .arg(&path)
            .arg(commit.as_str())
            .run(OpClass::Local)
            .await?;

        let actual = head(git, &path).await?;
        if &actual != commit {
            return Err(SyncError::corrupt(format!(
                "worktree {key} checked out {actual}, expected {commit}"
            )));
        }
        tracing::debug!(key = %key, path = %path.display(), "worktree created");
        Ok(path)
    }

    /// Remove the worktree for `key` and its record. Falls back to plain
    /// directory removal when git refuses (for example with submodules).
    pub async fn discard(&self, git: &Git, key: &WorktreeKey) -> Result<(), SyncError> {
        let path = self.path_for(key);
        if path.exists() {
            let removed = git
                .command(&self.root)
                .args(["worktree", "remove", "--force", "--force"])
                .arg(&path)
                .output()
                .await?;
            if !removed.success() || path.exists() {
                tracing::debug!(key = %key, "git worktree remove refused, deleting directory");
                remove_path(&path)?;
            }
        }
        record::remove_at(&self.root, key)?;
        self.prune_metadata(git).await
    }

    /// `git worktree prune`: drop metadata for directories that are gone.
    pub async fn prune_metadata(&self, git: &Git) -> Result<(), SyncError> {
        git.command(&self.root)
            .args(["worktree", "prune"])
            .run(OpClass::Local)
            .await?;
        Ok(())
    }
}

/// `git rev-parse HEAD` inside `dir`.
pub async fn head(git: &Git, dir: &Path) -> Result<CommitId, SyncError> {
    let stdout = git
        .command(dir)
        .args(["rev-parse", "--verify", "HEAD^{commit}"])
        .run(OpClass::Local)
        .await?;
    CommitId::parse(stdout.trim())
        .map_err(|e| SyncError::corrupt(format!("HEAD of {}: {e}", dir.display())))
}

pub(crate) fn remove_path(path: &Path) -> Result<(), SyncError> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(io_err(path, e)),
    };
    let result = if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    result.map_err(|e| io_err(path, e))
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
