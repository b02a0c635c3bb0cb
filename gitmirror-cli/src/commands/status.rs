//! `gitmirror status`: health of a running daemon.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use gitmirror_core::config::default_socket_path_at;
use gitmirror_daemon::{request_health, DaemonError};
use gitmirror_sync::{HealthReport, HealthState};

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Status socket of the daemon (default ~/.gitmirror/gitmirror.sock).
    #[arg(long, value_name = "PATH")]
    pub socket: Option<PathBuf>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct Row {
    #[tabled(rename = "field")]
    field: &'static str,
    #[tabled(rename = "value")]
    value: String,
}

impl StatusArgs {
    /// Exits non-zero unless the daemon reports `HEALTHY`.
    pub fn run(self) -> Result<()> {
        let socket = match self.socket {
            Some(socket) => socket,
            None => default_socket_path_at(
                &dirs::home_dir().context("could not determine home directory")?,
            ),
        };

        let report = match request_health(&socket) {
            Ok(report) => report,
            Err(DaemonError::DaemonNotRunning { socket }) => {
                bail!("daemon is not running (no socket at {})", socket.display())
            }
            Err(err) => return Err(err).context("failed to query daemon status"),
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize status JSON")?
            );
        } else {
            print_table(&report, Utc::now());
        }

        if report.status != HealthState::Healthy {
            bail!("daemon is {}", state_label(report.status));
        }
        Ok(())
    }
}

fn print_table(report: &HealthReport, now: DateTime<Utc>) {
    let s = &report.snapshot;
    println!(
        "gitmirror v{} | {} {} ({})",
        env!("CARGO_PKG_VERSION"),
        state_indicator(report.status),
        state_label(report.status),
        report.code,
    );

    let mut rows = vec![
        Row {
            field: "commit",
            value: s
                .last_synced_commit
                .as_ref()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string()),
        },
        Row {
            field: "worktree",
            value: s
                .last_synced_key
                .as_ref()
                .map(|k| k.to_string())
                .unwrap_or_else(|| "-".to_string()),
        },
        Row {
            field: "last sync",
            value: age(s.last_sync_time, now),
        },
        Row {
            field: "last attempt",
            value: age(s.last_attempt_time, now),
        },
        Row {
            field: "consecutive failures",
            value: s.consecutive_failures.to_string(),
        },
        Row {
            field: "cycles / failures",
            value: format!("{} / {}", s.cycles_total, s.failures_total),
        },
        Row {
            field: "hook failures",
            value: s.hook_failures_total.to_string(),
        },
    ];
    for (kind, count) in &s.failures_by_kind {
        rows.push(Row {
            field: "  by kind",
            value: format!("{kind}: {count}"),
        });
    }
    if let Some(err) = &s.last_error {
        rows.push(Row {
            field: "last error",
            value: format!("[{}] {}", err.kind, err.message),
        });
    }

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn age(at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(at) = at else {
        return "never".to_string();
    };
    let secs = now.signed_duration_since(at).num_seconds().max(0);
    match secs {
        0..=59 => format!("{secs}s ago"),
        60..=3599 => format!("{}m ago", secs / 60),
        _ => format!("{}h ago", secs / 3600),
    }
}

fn state_label(state: HealthState) -> &'static str {
    match state {
        HealthState::NeverSynced => "NEVER SYNCED",
        HealthState::Healthy => "HEALTHY",
        HealthState::Stale => "STALE",
    }
}

fn state_indicator(state: HealthState) -> String {
    match state {
        HealthState::NeverSynced => "■".bright_black().bold().to_string(),
        HealthState::Healthy => "■".green().bold().to_string(),
        HealthState::Stale => "■".yellow().bold().to_string(),
    }
}
