//! The one place that spawns `git`.
//!
//! Every invocation goes through [`GitCommand`]: fixed binary, explicit
//! working directory, credentials and extra config passed through the
//! environment (never argv), captured output, `kill_on_drop`, and an optional
//! deadline shared by the whole cycle.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Instant as StdInstant;

use tokio::process::Command;
use tokio::time::Instant;

use crate::auth::Credentials;
use crate::error::{io_err, SyncError};

/// Keep at most this much of stderr for reports.
const DIAGNOSTICS_LIMIT: usize = 4096;

/// Determines how a non-zero exit is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpClass {
    /// Talks to a remote: failures are transport (or auth) failures.
    Network,
    /// Touches only the store or a worktree. The cycle re-checks the store
    /// before treating a failure as corruption.
    Local,
}

/// Handle on the configured git binary.
#[derive(Clone)]
pub struct Git {
    binary: PathBuf,
    config: Vec<(String, String)>,
    env: Vec<(String, String)>,
    deadline: Option<Instant>,
}

impl fmt::Debug for Git {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_keys: Vec<&str> = self.env.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("Git")
            .field("binary", &self.binary)
            .field("config_entries", &self.config.len())
            .field("env", &env_keys)
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl Git {
    pub fn new(binary: impl Into<PathBuf>, config: Vec<(String, String)>) -> Self {
        Self {
            binary: binary.into(),
            config,
            env: Vec::new(),
            deadline: None,
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// A copy carrying `credentials` for this cycle only.
    pub fn with_credentials(&self, credentials: &Credentials) -> Self {
        let mut git = self.clone();
        git.config.extend(credentials.config.iter().cloned());
        git.env.extend(credentials.env.iter().cloned());
        git
    }

    /// A copy whose commands fail with [`SyncError::Timeout`] past `deadline`.
    pub fn with_deadline(&self, deadline: Option<Instant>) -> Self {
        let mut git = self.clone();
        git.deadline = deadline;
        git
    }

    pub fn command(&self, cwd: &Path) -> GitCommand<'_> {
        GitCommand {
            git: self,
            cwd: cwd.to_path_buf(),
            args: Vec::new(),
        }
    }

    /// `git --version`; failure to spawn is a configuration error.
    pub async fn version(&self) -> Result<String, SyncError> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| SyncError::GitUnavailable {
                program: self.binary.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(SyncError::GitUnavailable {
                program: self.binary.clone(),
                source: std::io::Error::other(format!("exited with {}", output.status)),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Captured result of one git invocation.
#[derive(Debug)]
pub struct GitOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Builder for a single invocation.
pub struct GitCommand<'a> {
    git: &'a Git,
    cwd: PathBuf,
    args: Vec<OsString>,
}

impl GitCommand<'_> {
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// `fetch`, `worktree add`, `submodule update`, ...
    fn operation(&self) -> String {
        let mut words = self.args.iter().map(|a| a.to_string_lossy());
        let first = words.next().unwrap_or_default().into_owned();
        match first.as_str() {
            "worktree" | "submodule" => match words.next() {
                Some(sub) if !sub.starts_with('-') => format!("{first} {sub}"),
                _ => first,
            },
            _ => first,
        }
    }

    /// Run to completion regardless of exit status. Only spawn failures and
    /// timeouts are errors.
    pub async fn output(self) -> Result<GitOutput, SyncError> {
        let operation = self.operation();
        let git = self.git;
        let mut cmd = Command::new(&git.binary);
        cmd.args(&self.args)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("LC_ALL", "C")
            .env_remove("GIT_DIR")
            .env_remove("GIT_WORK_TREE")
            .env_remove("GIT_INDEX_FILE");

        cmd.env("GIT_CONFIG_COUNT", git.config.len().to_string());
        for (i, (key, value)) in git.config.iter().enumerate() {
            cmd.env(format!("GIT_CONFIG_KEY_{i}"), key);
            cmd.env(format!("GIT_CONFIG_VALUE_{i}"), value);
        }
        for (key, value) in &git.env {
            cmd.env(key, value);
        }

        tracing::debug!(
            operation = %operation,
            cwd = %self.cwd.display(),
            args = ?self.args,
            "running git"
        );
        let started = StdInstant::now();
        let child = cmd.spawn().map_err(|e| io_err(&git.binary, e))?;
        let wait = child.wait_with_output();
        let waited = match git.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, wait).await.map_err(|_| {
                tracing::warn!(operation = %operation, "git deadline exceeded, child killed");
                SyncError::Timeout {
                    operation: operation.clone(),
                }
            })?,
            None => wait.await,
        };
        let output = waited.map_err(|e| io_err(&git.binary, e))?;

        tracing::debug!(
            operation = %operation,
            status = %output.status,
            duration_ms = started.elapsed().as_millis() as u64,
            "git finished"
        );
        Ok(GitOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Run and require success; returns stdout.
    pub async fn run(self, class: OpClass) -> Result<String, SyncError> {
        let operation = self.operation();
        let output = self.output().await?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(classify(class, operation, &output.stderr))
        }
    }
}

/// Map a non-zero exit to the error taxonomy by operation class. Stderr only
/// picks the auth label for network operations.
pub(crate) fn classify(class: OpClass, operation: String, stderr: &str) -> SyncError {
    let diagnostics = tail(stderr.trim(), DIAGNOSTICS_LIMIT);
    match class {
        OpClass::Network if looks_like_auth_failure(&diagnostics) => SyncError::AuthFailed {
            operation,
            diagnostics,
        },
        OpClass::Network => SyncError::Transport {
            operation,
            diagnostics,
        },
        OpClass::Local => SyncError::LocalGit {
            operation,
            diagnostics,
        },
    }
}

fn looks_like_auth_failure(stderr: &str) -> bool {
    const MARKERS: &[&str] = &[
        "authentication failed",
        "could not read username",
        "could not read password",
        "permission denied (publickey",
        "terminal prompts disabled",
        "returned error: 401",
        "returned error: 403",
        "invalid username or password",
    ];
    let lower = stderr.to_ascii_lowercase();
    MARKERS.iter().any(|m| lower.contains(m))
}

fn tail(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut start = text.len() - limit;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}
