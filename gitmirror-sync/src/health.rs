//! SyncState snapshot and the derived health report.
//!
//! State precedence:
//! 1. `NEVER_SYNCED` (no successful publish yet)
//! 2. `STALE` (last success older than `stale_after`, or more consecutive
//!    failures than `failure_threshold`)
//! 3. `HEALTHY`

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gitmirror_core::{CommitId, HealthConfig};

use crate::error::{ErrorKind, SyncError};
use crate::worktree::WorktreeKey;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LastError {
    pub kind: ErrorKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Immutable view of the sync state handed to observers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncSnapshot {
    pub started_at: DateTime<Utc>,
    pub last_synced_key: Option<WorktreeKey>,
    pub last_synced_commit: Option<CommitId>,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub last_attempt_time: Option<DateTime<Utc>>,
    pub last_error: Option<LastError>,
    pub last_diagnostics: Option<String>,
    pub consecutive_failures: u32,
    pub cycles_total: u64,
    pub failures_total: u64,
    pub failures_by_kind: BTreeMap<ErrorKind, u64>,
    pub hook_failures_total: u64,
}

impl SyncSnapshot {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            last_synced_key: None,
            last_synced_commit: None,
            last_sync_time: None,
            last_attempt_time: None,
            last_error: None,
            last_diagnostics: None,
            consecutive_failures: 0,
            cycles_total: 0,
            failures_total: 0,
            failures_by_kind: BTreeMap::new(),
            hook_failures_total: 0,
        }
    }

    /// A cycle ended with `key` published (changed or not).
    pub fn record_success(&mut self, key: &WorktreeKey, commit: &CommitId, at: DateTime<Utc>) {
        self.cycles_total += 1;
        self.last_attempt_time = Some(at);
        self.last_sync_time = Some(at);
        self.last_synced_key = Some(key.clone());
        self.last_synced_commit = Some(commit.clone());
        self.consecutive_failures = 0;
        self.last_error = None;
        self.last_diagnostics = None;
    }

    pub fn record_failure(&mut self, error: &SyncError, at: DateTime<Utc>) {
        let kind = error.kind();
        self.cycles_total += 1;
        self.failures_total += 1;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        *self.failures_by_kind.entry(kind).or_insert(0) += 1;
        self.last_attempt_time = Some(at);
        self.last_error = Some(LastError {
            kind,
            message: error.to_string(),
            at,
        });
        self.last_diagnostics = error.diagnostics().map(str::to_string);
    }

    pub fn record_hook_failures(&mut self, count: usize) {
        self.hook_failures_total += count as u64;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthState {
    NeverSynced,
    Healthy,
    Stale,
}

impl HealthState {
    /// HTTP-style status code for health probes.
    pub fn code(self) -> u16 {
        match self {
            HealthState::Healthy => 200,
            HealthState::NeverSynced | HealthState::Stale => 503,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthPolicy {
    pub stale_after: Duration,
    pub failure_threshold: u32,
}

impl From<&HealthConfig> for HealthPolicy {
    fn from(config: &HealthConfig) -> Self {
        Self {
            stale_after: config.stale_after,
            failure_threshold: config.failure_threshold,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthReport {
    pub status: HealthState,
    pub code: u16,
    /// Seconds since the last successful cycle.
    pub age_secs: Option<i64>,
    pub snapshot: SyncSnapshot,
}

pub fn evaluate(snapshot: &SyncSnapshot, policy: &HealthPolicy, now: DateTime<Utc>) -> HealthReport {
    let age = snapshot.last_sync_time.map(|t| now.signed_duration_since(t));
    let status = match age {
        None => HealthState::NeverSynced,
        Some(age) => {
            let too_old = age
                .to_std()
                .map(|age| age > policy.stale_after)
                .unwrap_or(false);
            if too_old || snapshot.consecutive_failures > policy.failure_threshold {
                HealthState::Stale
            } else {
                HealthState::Healthy
            }
        }
    };
    HealthReport {
        status,
        code: status.code(),
        age_secs: age.map(|a| a.num_seconds()),
        snapshot: snapshot.clone(),
    }
}
