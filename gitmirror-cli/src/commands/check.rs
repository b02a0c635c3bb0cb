//! `gitmirror check`: validate configuration without touching the root.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use gitmirror_core::SyncConfig;

use super::ConfigArgs;

#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct Setting {
    #[tabled(rename = "setting")]
    name: &'static str,
    #[tabled(rename = "value")]
    value: String,
}

impl CheckArgs {
    pub fn run(self) -> Result<()> {
        let config = self.config.load()?;
        let settings = effective_settings(&config);

        if self.json {
            let map: serde_json::Map<String, serde_json::Value> = settings
                .into_iter()
                .map(|s| (s.name.to_string(), serde_json::Value::String(s.value)))
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&map).context("failed to serialize settings")?
            );
            return Ok(());
        }

        println!("{} configuration is valid", "✓".green().bold());
        for ignored in &config.ignored_credentials {
            println!(
                "{} credential section '{ignored}' ignored; using {}",
                "!".yellow().bold(),
                config.auth
            );
        }
        let mut table = Table::new(settings);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}

fn effective_settings(config: &SyncConfig) -> Vec<Setting> {
    let secs = |d: std::time::Duration| format!("{}s", d.as_secs_f64());
    let optional = |value: Option<String>| value.unwrap_or_else(|| "-".to_string());

    let mut tracked: Vec<&str> = config.track_submodules.iter().map(String::as_str).collect();
    tracked.sort_unstable();
    let git_config: Vec<String> = config
        .git_config
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();

    vec![
        Setting { name: "repo", value: config.repo.clone() },
        Setting { name: "ref", value: config.revision.to_string() },
        Setting { name: "root", value: config.root.display().to_string() },
        Setting { name: "link", value: config.link_path().display().to_string() },
        Setting { name: "depth", value: config.depth.to_string() },
        Setting { name: "period", value: secs(config.period) },
        Setting { name: "sync_timeout", value: secs(config.sync_timeout) },
        Setting { name: "one_time", value: config.one_time.to_string() },
        Setting { name: "submodules", value: config.submodules.to_string() },
        Setting { name: "track_submodules", value: optional((!tracked.is_empty()).then(|| tracked.join(", "))) },
        Setting { name: "auth", value: config.auth.to_string() },
        Setting { name: "git", value: config.git_binary.display().to_string() },
        Setting { name: "git_config", value: optional((!git_config.is_empty()).then(|| git_config.join(", "))) },
        Setting { name: "gc", value: format!("{:?}", config.gc).to_lowercase() },
        Setting { name: "stale_worktree_grace", value: secs(config.stale_worktree_grace) },
        Setting { name: "health.stale_after", value: secs(config.health.stale_after) },
        Setting { name: "health.failure_threshold", value: config.health.failure_threshold.to_string() },
        Setting { name: "exechook", value: optional(config.exechook.as_ref().map(|h| h.command.display().to_string())) },
        Setting { name: "webhook", value: optional(config.webhook.as_ref().map(|h| format!("{} {}", h.method, h.url))) },
        Setting { name: "touch_file", value: optional(config.touch_file.as_ref().map(|p| p.display().to_string())) },
        Setting { name: "status_socket", value: config.status_socket.display().to_string() },
    ]
}
