//! One sync cycle, shared by the one-shot and periodic supervisors.
//!
//! ## Steps
//!
//! 1. Fetch credentials for this cycle.
//! 2. Sanity-check the store (may rebuild it).
//! 3. Resolve the revision spec against the remote.
//! 4. Fetch the target with the configured depth.
//! 5. Reuse or build the worktree (submodules included) and record it.
//! 6. Publish through the link.
//! 7. Prune superseded worktrees past their grace period, then gc.
//!
//! A `CorruptState` failure in steps 2–6 triggers one destructive rebuild of
//! the store within the same cycle; a rebuild already performed by the sanity
//! check counts as that one. A failed local git command only leads to a
//! rebuild when the store then fails its sanity check; otherwise (full disk,
//! permissions) the cycle fails and the published tree stays in place.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Instant;

use chrono::Utc;

use gitmirror_core::{CommitId, SubmodulePolicy, SyncConfig};

use crate::auth::AuthBroker;
use crate::error::{ErrorKind, SyncError};
use crate::exec::Git;
use crate::publish::{AtomicPublisher, PublishResult};
use crate::record::{self, WorktreeRecord};
use crate::resolver;
use crate::store::{Preparation, Store};
use crate::submodule::{self, SubmoduleSynchronizer};
use crate::worktree::{Validity, WorktreeKey, WorktreePool};

/// What a successful cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    pub key: WorktreeKey,
    pub commit: CommitId,
    /// Absolute path of the published worktree.
    pub worktree: PathBuf,
    /// The link now names a different worktree than before the cycle.
    pub changed: bool,
    /// The store was wiped and re-initialized during this cycle.
    pub rebuilt_store: bool,
}

/// Owns the root for the lifetime of the process. Not meant for concurrent
/// use: `run_cycle` takes `&mut self`.
#[derive(Debug)]
pub struct SyncEngine {
    config: SyncConfig,
    git: Git,
    auth: AuthBroker,
    store: Store,
    pool: WorktreePool,
    publisher: AtomicPublisher,
    /// When each non-current worktree was first seen superseded.
    superseded: BTreeMap<WorktreeKey, Instant>,
}

impl SyncEngine {
    pub fn new(config: SyncConfig) -> Self {
        let git = Git::new(config.git_binary.clone(), config.git_config.clone());
        Self {
            auth: AuthBroker::new(config.auth.clone()),
            store: Store::new(&config.root),
            pool: WorktreePool::new(&config.root),
            publisher: AtomicPublisher::new(&config.root, &config.link),
            superseded: BTreeMap::new(),
            git,
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn publisher(&self) -> &AtomicPublisher {
        &self.publisher
    }

    /// Confirm the configured git binary runs; a failure is fatal.
    pub async fn check_git(&self) -> Result<String, SyncError> {
        self.git.version().await
    }

    /// Run one cycle. `deadline` bounds every git invocation.
    pub async fn run_cycle(
        &mut self,
        deadline: Option<tokio::time::Instant>,
    ) -> Result<CycleOutcome, SyncError> {
        let credentials = self.auth.credentials().await?;
        let git = self.git.with_credentials(&credentials).with_deadline(deadline);

        let mut rebuilt = false;
        loop {
            match self.attempt(&git, &mut rebuilt).await {
                Err(e) if e.kind() == ErrorKind::CorruptState && !rebuilt => {
                    tracing::warn!(error = %e, "corrupt state, rebuilding store");
                    self.rebuild(&git).await?;
                    rebuilt = true;
                }
                Err(e @ SyncError::LocalGit { .. }) if !rebuilt => {
                    let Some(reason) = self.store.sanity_check(&git).await? else {
                        return Err(e);
                    };
                    tracing::warn!(error = %e, reason = %reason, "store failed re-check, rebuilding");
                    self.rebuild(&git).await?;
                    rebuilt = true;
                }
                Err(e) => return Err(e),
                Ok(mut outcome) => {
                    outcome.rebuilt_store = rebuilt;
                    return Ok(outcome);
                }
            }
        }
    }

    async fn rebuild(&mut self, git: &Git) -> Result<(), SyncError> {
        self.store.wipe_and_init(git).await?;
        self.superseded.clear();
        Ok(())
    }

    async fn attempt(&mut self, git: &Git, rebuilt: &mut bool) -> Result<CycleOutcome, SyncError> {
        if self.store.prepare(git).await? == Preparation::Rebuilt {
            self.superseded.clear();
            *rebuilt = true;
        }
        let root = self.config.root.clone();
        self.store.set_origin(git, &self.config.repo).await?;

        let resolved =
            resolver::resolve(git, &root, &self.config.repo, &self.config.revision).await?;
        let commit = self
            .store
            .fetch(git, &self.config.repo, &resolved, self.config.depth)
            .await?;

        let key = self.materialize(git, &commit).await?;
        let changed = match self.publisher.publish(&key)? {
            PublishResult::Unchanged => false,
            PublishResult::Published { previous } => {
                if let Some(previous) = previous {
                    self.superseded.insert(previous, Instant::now());
                }
                true
            }
        };
        self.superseded.remove(&key);
        self.housekeeping(git, &key).await;

        Ok(CycleOutcome {
            worktree: self.pool.path_for(&key),
            key,
            commit,
            changed,
            rebuilt_store: false,
        })
    }

    /// Pick the worktree key for `commit`, building it when needed.
    async fn materialize(&self, git: &Git, commit: &CommitId) -> Result<WorktreeKey, SyncError> {
        let published = self.publisher.current()?;
        let candidate = match &published {
            Some(key) if key.commit_str() == commit.as_str() => key.clone(),
            _ => WorktreeKey::for_commit(commit),
        };

        if let Validity::Valid(existing) = self.pool.validate(git, &candidate, commit).await? {
            if !self.tracks_submodules() {
                return Ok(candidate);
            }
            let Some(fp) =
                submodule::probe_remote_tracking(git, &self.config.root, &existing).await?
            else {
                return Ok(candidate);
            };
            let key = WorktreeKey::with_fingerprint(commit, &fp);
            self.ensure_built(git, &key, commit, published.as_ref()).await?;
            return Ok(key);
        }

        self.ensure_built(git, &candidate, commit, published.as_ref())
            .await?;
        Ok(candidate)
    }

    fn tracks_submodules(&self) -> bool {
        self.config.submodules != SubmodulePolicy::Off && !self.config.track_submodules.is_empty()
    }

    async fn ensure_built(
        &self,
        git: &Git,
        key: &WorktreeKey,
        commit: &CommitId,
        published: Option<&WorktreeKey>,
    ) -> Result<(), SyncError> {
        match self.pool.validate(git, key, commit).await? {
            Validity::Valid(_) => return Ok(()),
            Validity::Missing => {}
            Validity::Partial(reason) => {
                if published == Some(key) {
                    return Err(SyncError::corrupt(format!(
                        "published worktree {key} is damaged: {reason}"
                    )));
                }
                tracing::info!(key = %key, reason = %reason, "discarding partial worktree");
                self.pool.discard(git, key).await?;
            }
        }
        self.build(git, key, commit).await
    }

    async fn build(&self, git: &Git, key: &WorktreeKey, commit: &CommitId) -> Result<(), SyncError> {
        let started = Instant::now();
        let path = self.pool.create(git, key, commit).await?;

        let synchronizer = SubmoduleSynchronizer::new(
            git,
            self.config.submodules,
            &self.config.track_submodules,
            self.config.depth,
        );
        let submodules = match synchronizer.sync(&path).await {
            Ok(submodules) => submodules,
            Err(e) => {
                // A timed-out cycle has no budget left; the next cycle sees a
                // worktree without a record and discards it then.
                if e.kind() != ErrorKind::Timeout {
                    if let Err(cleanup) = self.pool.discard(git, key).await {
                        tracing::warn!(key = %key, error = %cleanup, "cleanup of failed worktree failed");
                    }
                }
                return Err(e);
            }
        };

        let entry = WorktreeRecord {
            key: key.as_str().to_string(),
            commit: commit.clone(),
            built_at: Utc::now(),
            submodules,
        };
        record::save_at(&self.config.root, &entry)?;
        tracing::info!(
            key = %key,
            submodules = entry.submodules.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "worktree built"
        );
        Ok(())
    }

    /// Best-effort: the publish already happened, so failures here are only
    /// logged and retried next cycle.
    async fn housekeeping(&mut self, git: &Git, current: &WorktreeKey) {
        if let Err(e) = self.prune(git, current).await {
            tracing::warn!(error = %e, "pruning superseded worktrees failed");
        }
        match self.publisher.clean_temp_links() {
            Ok(0) => {}
            Ok(n) => tracing::debug!(removed = n, "removed stray temporary links"),
            Err(e) => tracing::warn!(error = %e, "removing temporary links failed"),
        }
        if let Err(e) = self.store.gc(git, self.config.gc).await {
            tracing::warn!(error = %e, mode = ?self.config.gc, "gc failed");
        }
    }

    async fn prune(&mut self, git: &Git, current: &WorktreeKey) -> Result<(), SyncError> {
        let now = Instant::now();
        let grace = self.config.stale_worktree_grace;
        let mut pruned = BTreeSet::new();
        for key in self.pool.existing_keys()? {
            if &key == current {
                continue;
            }
            let since = *self.superseded.entry(key.clone()).or_insert(now);
            if now.duration_since(since) >= grace {
                self.pool.discard(git, &key).await?;
                tracing::info!(key = %key, "pruned superseded worktree");
                pruned.insert(key);
            }
        }
        for key in &pruned {
            self.superseded.remove(key);
        }

        for key in record::list_keys_at(&self.config.root)? {
            if !self.pool.path_for(&key).exists() {
                record::remove_at(&self.config.root, &key)?;
            }
        }
        let pool = &self.pool;
        self.superseded.retain(|key, _| pool.path_for(key).exists());
        pool.prune_metadata(git).await
    }
}
