//! gitmirror core library: domain types, configuration, errors.
//!
//! Public API surface:
//! - [`types`]: commit ids, revision specs, depth, submodule policies
//! - [`config`]: YAML configuration loading and validation
//! - [`error`]: [`ConfigError`], [`TypeError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    AuthConfig, ConfigFile, ExecHookConfig, HealthConfig, KnownHosts, SyncConfig, WebhookConfig,
};
pub use error::{ConfigError, TypeError};
pub use types::{
    CommitId, Depth, GcMode, RevisionSpec, SubmoduleMode, SubmodulePolicy, SubmoduleSpec,
};
