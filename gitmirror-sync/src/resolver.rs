//! RefResolver: revision spec → commit id, re-run every cycle.
//!
//! Symbolic specs are matched against `git ls-remote` output with the
//! priority exact ref path > `refs/heads/<spec>` > `refs/tags/<spec>` >
//! unique `…/<spec>` suffix. Annotated tags resolve to the peeled commit.

use std::collections::BTreeSet;
use std::path::Path;

use gitmirror_core::{CommitId, RevisionSpec};

use crate::error::SyncError;
use crate::exec::{Git, OpClass};

const PEELED_SUFFIX: &str = "^{}";

/// One line of `git ls-remote`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    pub name: String,
    pub id: CommitId,
}

/// Result of a resolution: the commit plus what to pass to `git fetch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRevision {
    pub commit: CommitId,
    /// Ref path for symbolic specs, the commit id itself for literal ones.
    pub fetch_target: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectError {
    NotFound,
    Ambiguous(Vec<String>),
}

/// Parse `<id>\t<ref>` lines. Lines with malformed ids are skipped.
pub fn parse_ls_remote(output: &str) -> Vec<RemoteRef> {
    output
        .lines()
        .filter_map(|line| {
            let (id, name) = line.split_once('\t')?;
            let id = CommitId::parse(id).ok()?;
            Some(RemoteRef {
                name: name.trim().to_string(),
                id,
            })
        })
        .collect()
}

/// Pick the ref `spec` names. Pure; unit-tested below.
pub fn select(spec: &str, refs: &[RemoteRef]) -> Result<(String, CommitId), SelectError> {
    let lookup = |name: &str| refs.iter().find(|r| r.name == name);
    // Annotated tags list the tag object first and the commit under `^{}`.
    let commit_of = |name: &str| -> Option<CommitId> {
        let direct = lookup(name)?;
        let peeled = lookup(&format!("{name}{PEELED_SUFFIX}")).unwrap_or(direct);
        Some(peeled.id.clone())
    };

    let candidates = [
        spec.to_string(),
        format!("refs/heads/{spec}"),
        format!("refs/tags/{spec}"),
    ];
    for name in candidates {
        if let Some(commit) = commit_of(&name) {
            return Ok((name, commit));
        }
    }

    let suffix = format!("/{spec}");
    let matches: Vec<(String, CommitId)> = refs
        .iter()
        .filter(|r| !r.name.ends_with(PEELED_SUFFIX) && r.name.ends_with(&suffix))
        .filter_map(|r| commit_of(&r.name).map(|c| (r.name.clone(), c)))
        .collect();
    let distinct: BTreeSet<&CommitId> = matches.iter().map(|(_, c)| c).collect();
    match distinct.len() {
        0 => Err(SelectError::NotFound),
        1 => Ok(matches[0].clone()),
        _ => Err(SelectError::Ambiguous(
            matches.into_iter().map(|(name, _)| name).collect(),
        )),
    }
}

/// List the remote's refs.
pub async fn ls_remote(git: &Git, cwd: &Path, repo: &str) -> Result<Vec<RemoteRef>, SyncError> {
    let stdout = git
        .command(cwd)
        .args(["ls-remote", "--", repo])
        .run(OpClass::Network)
        .await?;
    Ok(parse_ls_remote(&stdout))
}

/// Resolve a symbolic name against `repo`. Shared with submodule drift checks.
pub async fn resolve_symbolic(
    git: &Git,
    cwd: &Path,
    repo: &str,
    spec: &str,
) -> Result<(String, CommitId), SyncError> {
    let refs = ls_remote(git, cwd, repo).await?;
    select(spec, &refs).map_err(|e| match e {
        SelectError::NotFound => SyncError::UnknownRevision {
            spec: spec.to_string(),
            diagnostics: format!("no ref named '{spec}' on {repo}"),
        },
        SelectError::Ambiguous(candidates) => SyncError::AmbiguousRevision {
            spec: spec.to_string(),
            candidates,
        },
    })
}

/// Resolve `spec` for this cycle.
///
/// Literal ids are checked syntactically at config time; existence is
/// confirmed when the fetch for that id succeeds.
pub async fn resolve(
    git: &Git,
    cwd: &Path,
    repo: &str,
    spec: &RevisionSpec,
) -> Result<ResolvedRevision, SyncError> {
    match spec {
        RevisionSpec::Commit(id) => {
            // Proves the remote is reachable so a later fetch failure means
            // the id is unknown rather than a transport problem.
            ls_remote(git, cwd, repo).await?;
            Ok(ResolvedRevision {
                commit: id.clone(),
                fetch_target: id.to_string(),
            })
        }
        RevisionSpec::Symbolic(name) => {
            let (ref_name, commit) = resolve_symbolic(git, cwd, repo, name).await?;
            tracing::debug!(spec = %name, reference = %ref_name, commit = %commit, "resolved");
            Ok(ResolvedRevision {
                commit,
                fetch_target: ref_name,
            })
        }
    }
}
