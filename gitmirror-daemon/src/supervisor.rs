//! SyncSupervisor: runs cycles strictly one after another, bounds each one by
//! `sync_timeout`, keeps the shared [`SyncSnapshot`] current and fires the
//! post-publish actions.
//!
//! The supervisor is the only writer of the snapshot. Readers hold a
//! `watch::Receiver` and clone what they need.

use std::time::Instant as StdInstant;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;

use gitmirror_core::SyncConfig;
use gitmirror_sync::{CycleOutcome, HealthPolicy, PostPublish, SyncEngine, SyncError, SyncSnapshot};

use crate::error::DaemonError;

pub struct SyncSupervisor {
    engine: SyncEngine,
    hooks: PostPublish,
    state: watch::Sender<SyncSnapshot>,
}

impl SyncSupervisor {
    pub fn new(config: SyncConfig) -> Self {
        let (state, _) = watch::channel(SyncSnapshot::new(Utc::now()));
        Self {
            hooks: PostPublish::from_config(&config),
            engine: SyncEngine::new(config),
            state,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        self.engine.config()
    }

    pub fn policy(&self) -> HealthPolicy {
        HealthPolicy::from(&self.config().health)
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        self.state.borrow().clone()
    }

    /// Checks that must pass before the first cycle. Failures are fatal.
    pub async fn startup(&self) -> Result<(), DaemonError> {
        let version = self.engine.check_git().await?;
        let config = self.config();
        for ignored in &config.ignored_credentials {
            tracing::warn!(
                section = *ignored,
                selected = %config.auth,
                "multiple credential sections configured, ignoring one"
            );
        }
        tracing::info!(
            git = %version,
            repo = %config.repo,
            revision = %config.revision,
            root = %config.root.display(),
            link = %config.link,
            depth = %config.depth,
            submodules = %config.submodules,
            "gitmirror starting"
        );
        Ok(())
    }

    /// Run one cycle under `sync_timeout`, record its outcome and, if the
    /// published target changed, run the post-publish actions.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, SyncError> {
        let started = StdInstant::now();
        let deadline = Instant::now() + self.config().sync_timeout;
        let result = match tokio::time::timeout_at(deadline, self.engine.run_cycle(Some(deadline)))
            .await
        {
            Ok(result) => result,
            // The in-flight git child is killed when the cycle future drops.
            Err(_) => Err(SyncError::Timeout {
                operation: "cycle".to_string(),
            }),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(outcome) => {
                self.state
                    .send_modify(|s| s.record_success(&outcome.key, &outcome.commit, Utc::now()));
                tracing::info!(
                    commit = %outcome.commit,
                    key = %outcome.key,
                    changed = outcome.changed,
                    rebuilt_store = outcome.rebuilt_store,
                    duration_ms,
                    "sync cycle completed"
                );
                if outcome.changed && !self.hooks.is_empty() {
                    let failures = self.hooks.run(&outcome.worktree, &outcome.commit).await;
                    if !failures.is_empty() {
                        self.state
                            .send_modify(|s| s.record_hook_failures(failures.len()));
                    }
                }
            }
            Err(e) => {
                self.state.send_modify(|s| s.record_failure(e, Utc::now()));
                let consecutive = self.state.borrow().consecutive_failures;
                tracing::warn!(
                    kind = %e.kind(),
                    error = %e,
                    consecutive_failures = consecutive,
                    duration_ms,
                    "sync cycle failed"
                );
                if let Some(diagnostics) = e.diagnostics() {
                    tracing::debug!(diagnostics = %diagnostics, "git diagnostics");
                }
            }
        }
        result
    }

    /// One-shot mode: exactly one cycle, its failure surfaced to the caller.
    pub async fn run_once(&mut self) -> Result<CycleOutcome, DaemonError> {
        self.startup().await?;
        Ok(self.run_cycle().await?)
    }

    /// Periodic mode: cycle, sleep `period`, repeat until shutdown. Only a
    /// non-recoverable error ends the loop early.
    pub async fn run_periodic(
        &mut self,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), DaemonError> {
        self.startup().await?;
        let period = self.config().period;
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                result = self.run_cycle() => {
                    if let Err(e) = result {
                        if !e.kind().is_recoverable() {
                            return Err(e.into());
                        }
                    }
                }
            }
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = tokio::time::sleep(period) => {}
            }
        }
        tracing::info!("sync loop stopped");
        Ok(())
    }
}
