//! gitmirror: keep a directory in sync with a remote git revision.
//!
//! # Usage
//!
//! ```text
//! gitmirror run [--config FILE] [--repo URL] [--ref REF] [--root DIR] [--one-time] ...
//! gitmirror check [--config FILE] [overrides...] [--json]
//! gitmirror status [--socket PATH] [--json]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{check::CheckArgs, run::RunArgs, status::StatusArgs};

#[derive(Parser, Debug)]
#[command(
    name = "gitmirror",
    version,
    about = "Mirror a git revision into an atomically published worktree",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sync once (--one-time) or keep syncing every period.
    Run(RunArgs),

    /// Validate the configuration and print the effective settings.
    Check(CheckArgs),

    /// Query a running daemon's health over its status socket.
    Status(StatusArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => args.run(),
        Commands::Check(args) => args.run(),
        Commands::Status(args) => args.run(),
    }
}
