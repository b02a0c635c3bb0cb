pub mod check;
pub mod run;
pub mod status;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use gitmirror_core::config::{self, DurationValue};
use gitmirror_core::{ConfigFile, SubmodulePolicy, SyncConfig};

/// Config file plus the command-line overrides laid on top of it.
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// YAML configuration file.
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Remote repository URL or path.
    #[arg(long)]
    pub repo: Option<String>,

    /// Branch, tag or full commit id to publish.
    #[arg(long = "ref", value_name = "REF")]
    pub revision: Option<String>,

    /// Root directory holding the store, worktrees and the link.
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Name of the published link inside the root.
    #[arg(long)]
    pub link: Option<String>,

    /// History depth; 0 fetches full history.
    #[arg(long)]
    pub depth: Option<u32>,

    /// Time between cycles (e.g. 30s, 5m).
    #[arg(long, value_name = "DUR")]
    pub period: Option<String>,

    /// Upper bound for a single cycle (e.g. 2m).
    #[arg(long, value_name = "DUR")]
    pub sync_timeout: Option<String>,

    /// off | shallow | recursive
    #[arg(long)]
    pub submodules: Option<SubmodulePolicy>,

    /// Submodule name that follows its own branch. Repeatable.
    #[arg(long = "track-submodule", value_name = "NAME")]
    pub track_submodules: Vec<String>,

    /// git binary to run.
    #[arg(long, value_name = "PATH")]
    pub git: Option<PathBuf>,

    /// Run a single cycle and exit with its result.
    #[arg(long)]
    pub one_time: bool,
}

impl ConfigArgs {
    /// Read the file (if any), apply the flags and validate.
    pub fn load(&self) -> Result<SyncConfig> {
        let base = match &self.config {
            Some(path) => config::load_at(path)
                .with_context(|| format!("failed to load config '{}'", path.display()))?,
            None => ConfigFile::default(),
        };
        let merged = base.overlay(self.overrides()?);
        SyncConfig::from_file(merged).context("invalid configuration")
    }

    fn overrides(&self) -> Result<ConfigFile> {
        let root = match &self.root {
            Some(root) if root.is_relative() => Some(
                std::env::current_dir()
                    .context("could not determine current directory")?
                    .join(root),
            ),
            other => other.clone(),
        };
        Ok(ConfigFile {
            repo: self.repo.clone(),
            revision: self.revision.clone(),
            root,
            link: self.link.clone(),
            depth: self.depth,
            period: self.period.clone().map(DurationValue::Text),
            sync_timeout: self.sync_timeout.clone().map(DurationValue::Text),
            one_time: self.one_time.then_some(true),
            submodules: self.submodules,
            track_submodules: self.track_submodules.clone(),
            git: self.git.clone(),
            ..ConfigFile::default()
        })
    }
}
