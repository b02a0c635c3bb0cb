//! Error types for gitmirror-sync.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use gitmirror_core::ConfigError;

/// Coarse classification of a failed cycle, used for health accounting and
/// per-kind failure counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    AuthFailed,
    Timeout,
    CorruptState,
    Submodule,
    Resource,
    UnknownRevision,
    AmbiguousRevision,
    Config,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Transport => "transport",
            ErrorKind::AuthFailed => "auth_failed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::CorruptState => "corrupt_state",
            ErrorKind::Submodule => "submodule",
            ErrorKind::Resource => "resource",
            ErrorKind::UnknownRevision => "unknown_revision",
            ErrorKind::AmbiguousRevision => "ambiguous_revision",
            ErrorKind::Config => "config",
        }
    }

    /// Everything except configuration errors is retried next period.
    pub fn is_recoverable(self) -> bool {
        !matches!(self, ErrorKind::Config)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All errors that can arise inside a sync cycle.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A network operation (ls-remote, fetch, submodule update) failed.
    #[error("git {operation} failed: {diagnostics}")]
    Transport {
        operation: String,
        diagnostics: String,
    },

    /// A network operation was rejected by the remote.
    #[error("authentication failed during {operation}: {diagnostics}")]
    AuthFailed {
        operation: String,
        diagnostics: String,
    },

    /// The deadline passed while `operation` was running; the child was killed.
    #[error("timed out during {operation}")]
    Timeout { operation: String },

    /// The store or a worktree is not in a state the engine can trust.
    #[error("corrupt local state: {reason}")]
    CorruptState { reason: String, diagnostics: String },

    /// A local git command failed while the store still passes its sanity
    /// check, e.g. a full disk or missing permissions.
    #[error("git {operation} failed: {diagnostics}")]
    LocalGit {
        operation: String,
        diagnostics: String,
    },

    /// A nested repository could not be materialized.
    #[error("submodule {}: {source}", path.display())]
    Submodule {
        path: PathBuf,
        #[source]
        source: Box<SyncError>,
    },

    /// Underlying I/O failure with the offending path.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("revision '{spec}' not found on remote")]
    UnknownRevision { spec: String, diagnostics: String },

    #[error("revision '{spec}' is ambiguous: {}", candidates.join(", "))]
    AmbiguousRevision {
        spec: String,
        candidates: Vec<String>,
    },

    /// A worktree record could not be encoded.
    #[error("worktree record at {path}: {source}")]
    Record {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The git binary could not be executed at all.
    #[error("cannot execute git binary {}: {source}", program.display())]
    GitUnavailable {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Transport { .. } => ErrorKind::Transport,
            SyncError::AuthFailed { .. } => ErrorKind::AuthFailed,
            SyncError::Timeout { .. } => ErrorKind::Timeout,
            SyncError::CorruptState { .. } | SyncError::Record { .. } => ErrorKind::CorruptState,
            SyncError::Submodule { .. } => ErrorKind::Submodule,
            SyncError::Io { .. } | SyncError::LocalGit { .. } => ErrorKind::Resource,
            SyncError::UnknownRevision { .. } => ErrorKind::UnknownRevision,
            SyncError::AmbiguousRevision { .. } => ErrorKind::AmbiguousRevision,
            SyncError::GitUnavailable { .. } | SyncError::Config(_) => ErrorKind::Config,
        }
    }

    /// Captured stderr of the failing git command, if any.
    pub fn diagnostics(&self) -> Option<&str> {
        let text = match self {
            SyncError::Transport { diagnostics, .. }
            | SyncError::AuthFailed { diagnostics, .. }
            | SyncError::CorruptState { diagnostics, .. }
            | SyncError::LocalGit { diagnostics, .. }
            | SyncError::UnknownRevision { diagnostics, .. } => diagnostics.as_str(),
            SyncError::Submodule { source, .. } => return source.diagnostics(),
            _ => return None,
        };
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        SyncError::CorruptState {
            reason: reason.into(),
            diagnostics: String::new(),
        }
    }

    /// Wrap a failure inside a nested repository; timeouts pass through so
    /// the supervisor still sees them as timeouts.
    pub(crate) fn in_submodule(self, path: impl Into<PathBuf>) -> Self {
        match self {
            SyncError::Timeout { .. } | SyncError::Submodule { .. } => self,
            other => SyncError::Submodule {
                path: path.into(),
                source: Box::new(other),
            },
        }
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
