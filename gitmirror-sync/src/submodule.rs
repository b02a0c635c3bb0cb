//! SubmoduleSynchronizer: materializes nested repositories of a freshly
//! created worktree.
//!
//! For every `.gitmodules` entry the mode is decided once: names in the
//! operator's tracking set follow their own branch, everything else is
//! checked out at exactly the commit the superproject pins. With the
//! `recursive` policy the same walk repeats inside each submodule.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use gitmirror_core::{CommitId, Depth, SubmoduleMode, SubmodulePolicy, SubmoduleSpec};

use crate::error::SyncError;
use crate::exec::{Git, OpClass};
use crate::record::{SubmoduleRecord, WorktreeRecord};
use crate::resolver;
use crate::worktree::{self, fingerprint, remove_path};

const GITLINK_MODE: &str = "160000";

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub struct SubmoduleSynchronizer<'a> {
    git: &'a Git,
    policy: SubmodulePolicy,
    tracked: &'a BTreeSet<String>,
    depth: Depth,
}

impl<'a> SubmoduleSynchronizer<'a> {
    pub fn new(
        git: &'a Git,
        policy: SubmodulePolicy,
        tracked: &'a BTreeSet<String>,
        depth: Depth,
    ) -> Self {
        Self {
            git,
            policy,
            tracked,
            depth,
        }
    }

    /// Materialize every submodule below `worktree`. Any failure fails the
    /// whole call; the caller must not publish the worktree in that case.
    pub async fn sync(&self, worktree: &Path) -> Result<Vec<SubmoduleRecord>, SyncError> {
        let mut records = Vec::new();
        if self.policy == SubmodulePolicy::Off {
            return Ok(records);
        }
        self.sync_repo(worktree, PathBuf::new(), &mut records).await?;
        Ok(records)
    }

    fn sync_repo<'b>(
        &'b self,
        repo_dir: &'b Path,
        prefix: PathBuf,
        out: &'b mut Vec<SubmoduleRecord>,
    ) -> BoxFuture<'b, Result<(), SyncError>> {
        Box::pin(async move {
            let manifest = read_manifest(self.git, repo_dir, self.tracked)
                .await
                .map_err(|e| e.in_submodule(prefix.clone()))?;
            remove_orphans(self.git, repo_dir, &manifest)
                .await
                .map_err(|e| e.in_submodule(prefix.clone()))?;

            for spec in &manifest {
                let rel = prefix.join(&spec.path);
                let (commit, url) = self
                    .materialize(repo_dir, spec)
                    .await
                    .map_err(|e| e.in_submodule(rel.clone()))?;
                tracing::debug!(
                    submodule = %spec.name,
                    path = %rel.display(),
                    mode = %spec.mode,
                    commit = %commit,
                    "submodule materialized"
                );
                out.push(SubmoduleRecord {
                    name: spec.name.clone(),
                    path: rel.clone(),
                    url,
                    branch: spec.branch.clone(),
                    mode: spec.mode,
                    commit,
                });
                if self.policy == SubmodulePolicy::Recursive {
                    let nested = repo_dir.join(&spec.path);
                    self.sync_repo(&nested, rel, out).await?;
                }
            }
            Ok(())
        })
    }

    async fn materialize(
        &self,
        repo_dir: &Path,
        spec: &SubmoduleSpec,
    ) -> Result<(CommitId, String), SyncError> {
        let mut cmd = self
            .git
            .command(repo_dir)
            .args(["submodule", "update", "--init", "--checkout", "--force"]);
        if spec.mode == SubmoduleMode::RemoteTracking {
            cmd = cmd.arg("--remote");
        }
        if let Depth::Shallow(n) = spec.depth(self.depth) {
            cmd = cmd.arg(format!("--depth={n}"));
        }
        cmd.arg("--").arg(&spec.path).run(OpClass::Network).await?;

        let checkout = repo_dir.join(&spec.path);
        let head = worktree::head(self.git, &checkout).await?;
        if spec.mode == SubmoduleMode::Pinned {
            let pinned = pinned_commit(self.git, repo_dir, &spec.path).await?;
            if head != pinned {
                return Err(SyncError::corrupt(format!(
                    "checked out {head}, superproject pins {pinned}"
                )));
            }
        }

        let url = self
            .git
            .command(repo_dir)
            .args(["config", "--get"])
            .arg(format!("submodule.{}.url", spec.name))
            .output()
            .await?;
        let url = if url.success() && !url.stdout.trim().is_empty() {
            url.stdout.trim().to_string()
        } else {
            spec.url.clone()
        };
        Ok((head, url))
    }
}

/// Read `.gitmodules` of `repo_dir`; a missing manifest is empty.
pub async fn read_manifest(
    git: &Git,
    repo_dir: &Path,
    tracked: &BTreeSet<String>,
) -> Result<Vec<SubmoduleSpec>, SyncError> {
    if !repo_dir.join(".gitmodules").is_file() {
        return Ok(Vec::new());
    }
    let output = git
        .command(repo_dir)
        .args(["config", "--file", ".gitmodules", "--get-regexp", r"^submodule\."])
        .output()
        .await?;
    match output.status.code() {
        Some(0) => parse_manifest(&output.stdout, tracked),
        // No matching keys.
        Some(1) => Ok(Vec::new()),
        _ => Err(crate::exec::classify(
            OpClass::Local,
            "config".to_string(),
            &output.stderr,
        )),
    }
}

#[derive(Default)]
struct PartialEntry {
    path: Option<String>,
    url: Option<String>,
    branch: Option<String>,
    shallow: bool,
}

/// Parse `git config --get-regexp` output of a `.gitmodules` file.
pub fn parse_manifest(
    output: &str,
    tracked: &BTreeSet<String>,
) -> Result<Vec<SubmoduleSpec>, SyncError> {
    let mut entries: BTreeMap<String, PartialEntry> = BTreeMap::new();
    for line in output.lines() {
        let (key, value) = line.split_once(' ').unwrap_or((line, ""));
        let Some(rest) = key.strip_prefix("submodule.") else {
            continue;
        };
        // Names may contain dots; the variable is the last component.
        let Some((name, var)) = rest.rsplit_once('.') else {
            continue;
        };
        let entry = entries.entry(name.to_string()).or_default();
        match var {
            "path" => entry.path = Some(value.to_string()),
            "url" => entry.url = Some(value.to_string()),
            "branch" => entry.branch = Some(value.to_string()),
            "shallow" => entry.shallow = value == "true",
            _ => {}
        }
    }

    let mut specs = Vec::with_capacity(entries.len());
    for (name, entry) in entries {
        let path = entry
            .path
            .ok_or_else(|| SyncError::corrupt(format!("submodule '{name}' has no path")))?;
        let url = entry
            .url
            .ok_or_else(|| SyncError::corrupt(format!("submodule '{name}' has no url")))?;
        let mode = if tracked.contains(&name) {
            SubmoduleMode::RemoteTracking
        } else {
            SubmoduleMode::Pinned
        };
        specs.push(SubmoduleSpec {
            name,
            path: PathBuf::from(path),
            url,
            branch: entry.branch,
            mode,
            shallow: entry.shallow,
        });
    }
    specs.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(specs)
}

/// The gitlink id recorded by the superproject at `path`.
async fn pinned_commit(git: &Git, repo_dir: &Path, path: &Path) -> Result<CommitId, SyncError> {
    let stdout = git
        .command(repo_dir)
        .args(["ls-tree", "HEAD", "--"])
        .arg(path)
        .run(OpClass::Local)
        .await?;
    // `160000 commit <id>\t<path>`
    let id = stdout
        .split_whitespace()
        .nth(2)
        .ok_or_else(|| SyncError::corrupt(format!("no gitlink at {}", path.display())))?;
    CommitId::parse(id).map_err(|e| SyncError::corrupt(e.to_string()))
}

/// Remove checkouts of gitlinks that the manifest no longer declares.
async fn remove_orphans(
    git: &Git,
    repo_dir: &Path,
    manifest: &[SubmoduleSpec],
) -> Result<(), SyncError> {
    let stdout = git
        .command(repo_dir)
        .args(["ls-files", "--stage"])
        .run(OpClass::Local)
        .await?;
    let declared: BTreeSet<&Path> = manifest.iter().map(|s| s.path.as_path()).collect();
    for line in stdout.lines() {
        let Some((meta, path)) = line.split_once('\t') else {
            continue;
        };
        if !meta.starts_with(GITLINK_MODE) || declared.contains(Path::new(path)) {
            continue;
        }
        let dir = repo_dir.join(path);
        if dir.exists() {
            tracing::info!(path = %dir.display(), "removing undeclared submodule checkout");
            remove_path(&dir)?;
        }
    }
    Ok(())
}

/// Re-resolve the remote-tracking entries of a built worktree. Returns the
/// fingerprint of the new resolutions when any of them moved.
pub async fn probe_remote_tracking(
    git: &Git,
    cwd: &Path,
    record: &WorktreeRecord,
) -> Result<Option<String>, SyncError> {
    let mut moved = false;
    let mut current = Vec::new();
    for entry in record.remote_tracking() {
        let spec = entry.branch.as_deref().unwrap_or("HEAD");
        let (_, latest) = resolver::resolve_symbolic(git, cwd, &entry.url, spec)
            .await
            .map_err(|e| e.in_submodule(entry.path.clone()))?;
        if latest != entry.commit {
            tracing::info!(
                submodule = %entry.name,
                recorded = %entry.commit,
                latest = %latest,
                "remote-tracking submodule moved"
            );
            moved = true;
        }
        current.push((entry.path.clone(), latest));
    }
    if !moved {
        return Ok(None);
    }
    Ok(Some(fingerprint(
        current.iter().map(|(p, c)| (p.as_path(), c)),
    )))
}
