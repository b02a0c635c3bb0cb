//! `gitmirror run`: one-shot or periodic sync.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use gitmirror_daemon::{init_tracing, start_blocking, Exit};

use super::ConfigArgs;

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let config = self.config.load()?;
        init_tracing(self.log_json);

        match start_blocking(config).context("sync failed")? {
            Exit::Synced(outcome) => {
                let state = if outcome.changed { "published" } else { "unchanged" };
                println!(
                    "{} {} {} -> {}",
                    "✓".green().bold(),
                    state,
                    outcome.commit.short(),
                    outcome.worktree.display()
                );
            }
            Exit::Stopped => {}
        }
        Ok(())
    }
}
