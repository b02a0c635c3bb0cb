use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the supervisor, the status socket and its client.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(#[from] gitmirror_core::ConfigError),

    #[error("sync failed: {0}")]
    Sync(#[from] gitmirror_sync::SyncError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    #[error("daemon is not running (socket missing: {socket})")]
    DaemonNotRunning { socket: PathBuf },
}

impl DaemonError {
    /// The sync failure behind this error, if any.
    pub fn sync_kind(&self) -> Option<gitmirror_sync::ErrorKind> {
        match self {
            DaemonError::Sync(e) => Some(e.kind()),
            _ => None,
        }
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
