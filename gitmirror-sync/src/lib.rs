//! # gitmirror-sync
//!
//! The synchronization engine: resolve a revision, fetch it into a shared
//! store, materialize an immutable worktree (submodules included) and publish
//! it through one atomically swapped symlink.
//!
//! Call [`SyncEngine::run_cycle`] once per period; observers consume
//! [`SyncSnapshot`] / [`HealthReport`].

pub mod auth;
pub mod cycle;
pub mod error;
pub mod exec;
pub mod health;
pub mod hooks;
pub mod publish;
pub mod record;
pub mod resolver;
pub mod store;
pub mod submodule;
pub mod worktree;

pub use auth::{AuthBroker, Credentials};
pub use cycle::{CycleOutcome, SyncEngine};
pub use error::{ErrorKind, SyncError};
pub use exec::{Git, OpClass};
pub use health::{evaluate, HealthPolicy, HealthReport, HealthState, LastError, SyncSnapshot};
pub use hooks::{HookError, PostPublish};
pub use publish::{AtomicPublisher, PublishResult};
pub use worktree::{WorktreeKey, WorktreePool};
