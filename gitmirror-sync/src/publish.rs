//! AtomicPublisher: the single externally visible pointer.
//!
//! ## Protocol
//!
//! 1. Read the current link target; no-op if it already names the key.
//! 2. Create a relative symlink `worktrees/<key>` at `<root>/.<link>.tmp-<pid>-<n>`.
//! 3. Rename it over `<root>/<link>` (atomic on POSIX).
//! 4. Remove the temporary name if the rename failed.
//!
//! Readers never observe a missing or half-built target: the link either
//! still names the previous worktree or names the new, fully built one.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{io_err, SyncError};
use crate::worktree::{WorktreeKey, WORKTREES_DIR};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Outcome of a publish call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishResult {
    /// The link already named this worktree.
    Unchanged,
    /// The link was swapped; `previous` is what it named before, if anything.
    Published { previous: Option<WorktreeKey> },
}

#[derive(Debug, Clone)]
pub struct AtomicPublisher {
    root: PathBuf,
    link: String,
}

impl AtomicPublisher {
    pub fn new(root: impl Into<PathBuf>, link: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            link: link.into(),
        }
    }

    pub fn link_path(&self) -> PathBuf {
        self.root.join(&self.link)
    }

    fn tmp_prefix(&self) -> String {
        format!(".{}.tmp-", self.link)
    }

    /// Key the link currently names, or `None` when absent or foreign.
    ///
    /// A regular file or directory at the link's path breaks the root layout
    /// and is reported as corrupt state.
    pub fn current(&self) -> Result<Option<WorktreeKey>, SyncError> {
        let link = self.link_path();
        let target = match std::fs::read_link(&link) {
            Ok(target) => target,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => {
                return Err(SyncError::corrupt(format!(
                    "{} exists but is not a symlink",
                    link.display()
                )));
            }
            Err(e) => return Err(io_err(&link, e)),
        };
        Ok(parse_target(&target))
    }

    pub fn publish(&self, key: &WorktreeKey) -> Result<PublishResult, SyncError> {
        let previous = self.current()?;
        if previous.as_ref() == Some(key) {
            return Ok(PublishResult::Unchanged);
        }

        let target = Path::new(WORKTREES_DIR).join(key.as_str());
        if !self.root.join(&target).is_dir() {
            return Err(SyncError::corrupt(format!(
                "refusing to publish missing worktree {key}"
            )));
        }

        let tmp = self.root.join(format!(
            "{}{}-{}",
            self.tmp_prefix(),
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        std::os::unix::fs::symlink(&target, &tmp).map_err(|e| io_err(&tmp, e))?;

        let link = self.link_path();
        if let Err(e) = std::fs::rename(&tmp, &link) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(&link, e));
        }

        tracing::info!(link = %link.display(), key = %key, "published");
        Ok(PublishResult::Published { previous })
    }

    /// Remove temporary links left by an interrupted publish.
    pub fn clean_temp_links(&self) -> Result<usize, SyncError> {
        let prefix = self.tmp_prefix();
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(io_err(&self.root, e)),
        };
        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&self.root, e))?;
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                let path = entry.path();
                std::fs::remove_file(&path).map_err(|e| io_err(&path, e))?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn parse_target(target: &Path) -> Option<WorktreeKey> {
    let mut parts = target.components();
    let dir = parts.next()?;
    if dir.as_os_str() != WORKTREES_DIR {
        return None;
    }
    let name = parts.next()?.as_os_str().to_str()?;
    if parts.next().is_some() {
        return None;
    }
    WorktreeKey::parse(name)
}
