//! The shared object store at `<root>/.git`.
//!
//! ## Sanity check
//!
//! 1. `<root>` absent or empty → `git init`.
//! 2. `<root>/.git` missing → wipe and `git init`.
//! 3. `git rev-parse --show-toplevel` must name `<root>` itself, so a broken
//!    store never silently falls through to an enclosing repository.
//! 4. `git fsck --connectivity-only` must pass.
//!
//! Any failed check wipes `<root>` entirely. Partial repair is never attempted.

use std::path::{Path, PathBuf};

use gitmirror_core::{CommitId, Depth, GcMode};

use crate::error::{io_err, SyncError};
use crate::exec::{Git, OpClass};
use crate::resolver::ResolvedRevision;
use crate::worktree::remove_path;

/// What `prepare` had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preparation {
    /// The existing store passed every check.
    Reused,
    /// Nothing was there; a store was created.
    Initialized,
    /// A check failed and the root was wiped and re-initialized.
    Rebuilt,
}

#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn git_dir(&self) -> PathBuf {
        self.root.join(".git")
    }

    /// Sanity-check the root and leave a usable store behind.
    pub async fn prepare(&self, git: &Git) -> Result<Preparation, SyncError> {
        if is_empty_dir(&self.root)? {
            self.init(git).await?;
            return Ok(Preparation::Initialized);
        }
        match self.sanity_check(git).await? {
            None => {
                self.clear_stale_locks()?;
                Ok(Preparation::Reused)
            }
            Some(reason) => {
                tracing::warn!(root = %self.root.display(), reason = %reason, "store failed sanity check, rebuilding");
                self.wipe_and_init(git).await?;
                Ok(Preparation::Rebuilt)
            }
        }
    }

    /// `None` when healthy, otherwise the reason it is not.
    pub async fn sanity_check(&self, git: &Git) -> Result<Option<String>, SyncError> {
        if !self.git_dir().is_dir() {
            return Ok(Some("no .git directory".to_string()));
        }
        let toplevel = git
            .command(&self.root)
            .args(["rev-parse", "--show-toplevel"])
            .output()
            .await?;
        if !toplevel.success() {
            return Ok(Some(format!(
                "rev-parse failed: {}",
                toplevel.stderr.trim()
            )));
        }
        let expected = canonical(&self.root);
        let actual = canonical(Path::new(toplevel.stdout.trim()));
        if actual != expected {
            return Ok(Some(format!(
                "store resolves to {} instead of the root",
                actual.display()
            )));
        }
        let fsck = git
            .command(&self.root)
            .args(["fsck", "--no-progress", "--connectivity-only"])
            .output()
            .await?;
        if !fsck.success() {
            return Ok(Some(format!("fsck failed: {}", fsck.stderr.trim())));
        }
        Ok(None)
    }

    /// Destroy everything under the root (published link included) and start
    /// over with an empty store.
    pub async fn wipe_and_init(&self, git: &Git) -> Result<(), SyncError> {
        match std::fs::read_dir(&self.root) {
            Ok(entries) => {
                for entry in entries {
                    let entry = entry.map_err(|e| io_err(&self.root, e))?;
                    remove_path(&entry.path())?;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(&self.root, e)),
        }
        self.init(git).await
    }

    async fn init(&self, git: &Git) -> Result<(), SyncError> {
        std::fs::create_dir_all(&self.root).map_err(|e| io_err(&self.root, e))?;
        git.command(&self.root)
            .args(["init", "--quiet"])
            .run(OpClass::Local)
            .await?;
        tracing::info!(root = %self.root.display(), "initialized store");
        Ok(())
    }

    /// Lock files left behind by a killed git process. The engine is the
    /// store's only user, so any lock present between cycles is stale.
    fn clear_stale_locks(&self) -> Result<(), SyncError> {
        let git_dir = self.git_dir();
        let mut dirs = vec![git_dir.clone()];
        if let Ok(entries) = std::fs::read_dir(git_dir.join("worktrees")) {
            dirs.extend(entries.flatten().map(|e| e.path()));
        }
        for dir in dirs {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "lock") && path.is_file() {
                    tracing::debug!(path = %path.display(), "removing stale lock");
                    std::fs::remove_file(&path).map_err(|e| io_err(&path, e))?;
                }
            }
        }
        Ok(())
    }

    /// Keep `remote.origin.url` equal to the configured repo so relative
    /// submodule URLs resolve against it.
    pub async fn set_origin(&self, git: &Git, repo: &str) -> Result<(), SyncError> {
        let current = git
            .command(&self.root)
            .args(["config", "--get", "remote.origin.url"])
            .output()
            .await?;
        if current.success() && current.stdout.trim() == repo {
            return Ok(());
        }
        git.command(&self.root)
            .args(["config", "remote.origin.url", repo])
            .run(OpClass::Local)
            .await?;
        Ok(())
    }

    pub async fn is_shallow(&self, git: &Git) -> Result<bool, SyncError> {
        let stdout = git
            .command(&self.root)
            .args(["rev-parse", "--is-shallow-repository"])
            .run(OpClass::Local)
            .await?;
        Ok(stdout.trim() == "true")
    }

    /// Fetch the resolved target with the configured depth and return the
    /// commit that was actually fetched (a branch may have moved since
    /// resolution).
    ///
    /// Depth transitions are explicit: full history on a shallow store uses
    /// `--unshallow`; afterwards the store must be entirely full or entirely
    /// bounded, otherwise the result is reported as corrupt state.
    pub async fn fetch(
        &self,
        git: &Git,
        repo: &str,
        target: &ResolvedRevision,
        depth: Depth,
    ) -> Result<CommitId, SyncError> {
        let shallow = self.is_shallow(git).await?;
        let mut cmd = git
            .command(&self.root)
            .args(["fetch", "--no-progress", "--no-auto-gc", "--no-tags"]);
        match depth {
            Depth::Shallow(n) => cmd = cmd.arg(format!("--depth={n}")),
            Depth::Full if shallow => {
                tracing::info!("converting shallow store to full history");
                cmd = cmd.arg("--unshallow");
            }
            Depth::Full => {}
        }
        let output = cmd
            .args(["--", repo, target.fetch_target.as_str()])
            .output()
            .await?;
        if !output.success() {
            let literal = target.fetch_target == target.commit.as_str();
            return Err(
                match crate::exec::classify(OpClass::Network, "fetch".to_string(), &output.stderr) {
                    // The remote answered ls-remote this cycle, so a literal id
                    // it cannot serve does not exist there.
                    SyncError::Transport { diagnostics, .. } if literal => {
                        SyncError::UnknownRevision {
                            spec: target.fetch_target.clone(),
                            diagnostics,
                        }
                    }
                    err => err,
                },
            );
        }

        let fetched = git
            .command(&self.root)
            .args(["rev-parse", "--verify", "FETCH_HEAD^{commit}"])
            .run(OpClass::Local)
            .await?;
        let fetched = CommitId::parse(fetched.trim())
            .map_err(|e| SyncError::corrupt(format!("FETCH_HEAD: {e}")))?;
        if fetched != target.commit {
            tracing::info!(resolved = %target.commit, fetched = %fetched, "ref moved during fetch");
        }
        self.verify_depth(git, &fetched, depth).await?;
        Ok(fetched)
    }

    async fn verify_depth(&self, git: &Git, commit: &CommitId, depth: Depth) -> Result<(), SyncError> {
        match depth {
            Depth::Full => {
                if self.is_shallow(git).await? {
                    return Err(SyncError::corrupt("store still shallow after full fetch"));
                }
            }
            Depth::Shallow(n) => {
                let count = self.history_len(git, commit).await?;
                if count > u64::from(n.get()) {
                    return Err(SyncError::corrupt(format!(
                        "history of {commit} has {count} commits, depth is {n}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// `git rev-list --count <commit>`
    pub async fn history_len(&self, git: &Git, commit: &CommitId) -> Result<u64, SyncError> {
        let stdout = git
            .command(&self.root)
            .args(["rev-list", "--count", commit.as_str()])
            .run(OpClass::Local)
            .await?;
        stdout
            .trim()
            .parse()
            .map_err(|_| SyncError::corrupt(format!("rev-list printed '{}'", stdout.trim())))
    }

    pub async fn gc(&self, git: &Git, mode: GcMode) -> Result<(), SyncError> {
        let args: &[&str] = match mode {
            GcMode::Off => return Ok(()),
            GcMode::Auto => &["gc", "--auto", "--quiet"],
            GcMode::Always => &["gc", "--quiet"],
            GcMode::Aggressive => &["gc", "--aggressive", "--quiet"],
        };
        git.command(&self.root).args(args).run(OpClass::Local).await?;
        Ok(())
    }
}

fn is_empty_dir(path: &Path) -> Result<bool, SyncError> {
    match std::fs::read_dir(path) {
        Ok(mut entries) => Ok(entries.next().is_none()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(io_err(path, e)),
    }
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn git() -> Git {
        Git::new("git", Vec::new())
    }

    #[tokio::test]
    async fn absent_root_is_initialized() {
        let parent = TempDir::new().expect("parent");
        let store = Store::new(parent.path().join("root"));
        assert_eq!(store.prepare(&git()).await.expect("prepare"), Preparation::Initialized);
        assert!(store.git_dir().is_dir());
        assert_eq!(store.prepare(&git()).await.expect("prepare"), Preparation::Reused);
    }

    #[tokio::test]
    async fn root_without_store_is_rebuilt() {
        let parent = TempDir::new().expect("parent");
        let root = parent.path().join("root");
        std::fs::create_dir_all(root.join("worktrees/leftover")).expect("mkdir");
        let store = Store::new(&root);
        assert_eq!(store.prepare(&git()).await.expect("prepare"), Preparation::Rebuilt);
        assert!(!root.join("worktrees").exists());
        assert!(store.git_dir().is_dir());
    }

    #[tokio::test]
    async fn stale_locks_are_cleared() {
        let parent = TempDir::new().expect("parent");
        let store = Store::new(parent.path().join("root"));
        store.prepare(&git()).await.expect("init");
        let lock = store.git_dir().join("shallow.lock");
        std::fs::write(&lock, b"").expect("lock");
        assert_eq!(store.prepare(&git()).await.expect("prepare"), Preparation::Reused);
        assert!(!lock.exists());
    }

    #[tokio::test]
    async fn fresh_store_is_not_shallow() {
        let parent = TempDir::new().expect("parent");
        let store = Store::new(parent.path().join("root"));
        store.prepare(&git()).await.expect("init");
        assert!(!store.is_shallow(&git()).await.expect("shallow"));
        store.set_origin(&git(), "/srv/repo.git").await.expect("origin");
        store.set_origin(&git(), "/srv/repo.git").await.expect("origin again");
    }
}
