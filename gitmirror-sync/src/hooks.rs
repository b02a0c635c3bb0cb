//! Post-publish actions: touch file, exec hook, webhook.
//!
//! Actions run only after the published target changed. They never change
//! the outcome of the cycle; failures are returned for logging and counting.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;

use gitmirror_core::{CommitId, ExecHookConfig, SyncConfig, WebhookConfig};

pub const HASH_ENV: &str = "GITMIRROR_HASH";
pub const HASH_HEADER: &str = "X-Gitmirror-Hash";

#[derive(Debug, Error)]
pub enum HookError {
    #[error("touch {}: {source}", path.display())]
    Touch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("exechook {}: {reason}", command.display())]
    Exec { command: PathBuf, reason: String },

    #[error("webhook {url}: {reason}")]
    Webhook { url: String, reason: String },
}

/// The configured post-publish actions.
#[derive(Debug, Clone, Default)]
pub struct PostPublish {
    touch_file: Option<PathBuf>,
    exechook: Option<ExecHookConfig>,
    webhook: Option<WebhookConfig>,
}

impl PostPublish {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            touch_file: config.touch_file.clone(),
            exechook: config.exechook.clone(),
            webhook: config.webhook.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.touch_file.is_none() && self.exechook.is_none() && self.webhook.is_none()
    }

    /// Run every configured action in order; returns the failures.
    pub async fn run(&self, worktree: &Path, commit: &CommitId) -> Vec<HookError> {
        let mut failures = Vec::new();
        if let Some(path) = &self.touch_file {
            if let Err(e) = touch(path) {
                failures.push(e);
            }
        }
        if let Some(hook) = &self.exechook {
            if let Err(e) = run_exechook(hook, worktree, commit).await {
                failures.push(e);
            }
        }
        if let Some(hook) = &self.webhook {
            if let Err(e) = call_webhook(hook.clone(), commit.clone()).await {
                failures.push(e);
            }
        }
        for failure in &failures {
            tracing::warn!(error = %failure, commit = %commit, "post-publish action failed");
        }
        failures
    }
}

/// Create `path` if needed and set its mtime to now.
pub fn touch(path: &Path) -> Result<(), HookError> {
    let wrap = |source| HookError::Touch {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(wrap)?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(wrap)?;
    filetime::set_file_mtime(path, filetime::FileTime::now()).map_err(wrap)?;
    Ok(())
}

async fn run_exechook(
    hook: &ExecHookConfig,
    worktree: &Path,
    commit: &CommitId,
) -> Result<(), HookError> {
    let fail = |reason: String| HookError::Exec {
        command: hook.command.clone(),
        reason,
    };
    let child = Command::new(&hook.command)
        .args(&hook.args)
        .current_dir(worktree)
        .env(HASH_ENV, commit.as_str())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| fail(e.to_string()))?;
    let output = tokio::time::timeout(hook.timeout, child.wait_with_output())
        .await
        .map_err(|_| fail(format!("timed out after {}", format_secs(hook.timeout))))?
        .map_err(|e| fail(e.to_string()))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(fail(format!("{}: {}", output.status, stderr.trim())));
    }
    tracing::info!(command = %hook.command.display(), commit = %commit, "exechook completed");
    Ok(())
}

async fn call_webhook(hook: WebhookConfig, commit: CommitId) -> Result<(), HookError> {
    let url = hook.url.clone();
    let joined = tokio::task::spawn_blocking(move || {
        let agent = ureq::AgentBuilder::new().timeout(hook.timeout).build();
        let result = agent
            .request(&hook.method, &hook.url)
            .set(HASH_HEADER, commit.as_str())
            .call();
        let status = match result {
            Ok(response) => response.status(),
            Err(ureq::Error::Status(code, _)) => code,
            Err(ureq::Error::Transport(e)) => return Err(e.to_string()),
        };
        if status == hook.success_status {
            Ok(())
        } else {
            Err(format!(
                "HTTP {status}, expected {}",
                hook.success_status
            ))
        }
    })
    .await;
    match joined {
        Ok(Ok(())) => {
            tracing::info!(url = %url, "webhook delivered");
            Ok(())
        }
        Ok(Err(reason)) => Err(HookError::Webhook { url, reason }),
        Err(e) => Err(HookError::Webhook {
            url,
            reason: format!("request task failed: {e}"),
        }),
    }
}

fn format_secs(d: Duration) -> String {
    format!("{:.1}s", d.as_secs_f64())
}
