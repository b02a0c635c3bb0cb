//! Error types for gitmirror-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while parsing a single domain value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    #[error("invalid commit id '{0}': expected 40 or 64 hex characters")]
    InvalidCommitId(String),

    #[error("invalid ref name '{name}': {reason}")]
    InvalidRefName { name: String, reason: &'static str },

    #[error("invalid value '{value}' for {what}")]
    InvalidValue { what: &'static str, value: String },
}

/// All errors that can arise while loading or validating configuration.
///
/// These are the only errors that abort the process before any sync cycle.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure with the offending path.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load; includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The config file did not exist at the given path.
    #[error("config not found at {path}")]
    NotFound { path: PathBuf },

    /// A required field was not provided by the file or the command line.
    #[error("missing required setting '{0}'")]
    Missing(&'static str),

    /// A field is present but its value cannot be used.
    #[error("invalid setting '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error(transparent)]
    Type(#[from] TypeError),

    /// `dirs::home_dir()` returned `None`; cannot derive default paths.
    #[error("cannot determine home directory; set $HOME or configure status_socket")]
    HomeNotFound,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}
