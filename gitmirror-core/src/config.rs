//! Configuration model.
//!
//! # Sources
//!
//! ```text
//! gitmirror.yaml  ──┐
//!                   ├─ ConfigFile::overlay ─► SyncConfig::from_file_at (validate once)
//! CLI flags ────────┘
//! ```
//!
//! Everything is validated before the first cycle; a [`ConfigError`] is the
//! only error that stops the process.
//!
//! # API pattern
//!
//! Functions that need the home directory come in two forms:
//! - `fn_at(…, home)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{invalid, io_err, ConfigError, TypeError};
use crate::types::{Depth, GcMode, RevisionSpec, SubmodulePolicy};

pub const DEFAULT_LINK: &str = "current";
pub const DEFAULT_DEPTH: u32 = 1;
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(10);
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_WORKTREE_GRACE: Duration = Duration::from_secs(30);
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(30);
pub const SOCKET_FILE: &str = "gitmirror.sock";

/// Names under the root that the published link may never take.
const RESERVED_LINK_NAMES: &[&str] = &[".", "..", ".git", "worktrees"];

// ---------------------------------------------------------------------------
// 1. On-disk shape
// ---------------------------------------------------------------------------

/// A duration written either as bare seconds (`30`) or with a unit (`500ms`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DurationValue {
    Seconds(u64),
    Text(String),
}

impl DurationValue {
    fn resolve(&self) -> Result<Duration, TypeError> {
        match self {
            DurationValue::Seconds(secs) => Ok(Duration::from_secs(*secs)),
            DurationValue::Text(text) => parse_duration(text),
        }
    }
}

/// Raw configuration as written in YAML. Every field is optional so the same
/// shape can carry command-line overrides.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub repo: Option<String>,
    #[serde(rename = "ref")]
    pub revision: Option<String>,
    pub root: Option<PathBuf>,
    pub link: Option<String>,
    pub depth: Option<u32>,
    pub period: Option<DurationValue>,
    pub sync_timeout: Option<DurationValue>,
    pub one_time: Option<bool>,
    pub submodules: Option<SubmodulePolicy>,
    pub track_submodules: Vec<String>,
    pub auth: Option<AuthFile>,
    pub git: Option<PathBuf>,
    pub git_config: BTreeMap<String, String>,
    pub gc: Option<GcMode>,
    pub stale_worktree_grace: Option<DurationValue>,
    pub health: Option<HealthFile>,
    pub exechook: Option<ExecHookFile>,
    pub webhook: Option<WebhookFile>,
    pub touch_file: Option<PathBuf>,
    pub status_socket: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthFile {
    pub ssh: Option<SshFile>,
    pub password: Option<PasswordFile>,
    pub askpass: Option<AskpassFile>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SshFile {
    pub key_file: PathBuf,
    #[serde(default)]
    pub known_hosts_file: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub verify_host: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PasswordFile {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub password_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AskpassFile {
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthFile {
    pub stale_after: Option<DurationValue>,
    pub failure_threshold: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecHookFile {
    pub command: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub timeout: Option<DurationValue>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookFile {
    pub url: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub success_status: Option<u16>,
    #[serde(default)]
    pub timeout: Option<DurationValue>,
}

fn default_true() -> bool {
    true
}

impl ConfigFile {
    /// Lay `top` over `self`: values set in `top` win, collections are merged.
    pub fn overlay(self, top: ConfigFile) -> ConfigFile {
        let mut track_submodules = self.track_submodules;
        for name in top.track_submodules {
            if !track_submodules.contains(&name) {
                track_submodules.push(name);
            }
        }
        let mut git_config = self.git_config;
        git_config.extend(top.git_config);

        ConfigFile {
            repo: top.repo.or(self.repo),
            revision: top.revision.or(self.revision),
            root: top.root.or(self.root),
            link: top.link.or(self.link),
            depth: top.depth.or(self.depth),
            period: top.period.or(self.period),
            sync_timeout: top.sync_timeout.or(self.sync_timeout),
            one_time: top.one_time.or(self.one_time),
            submodules: top.submodules.or(self.submodules),
            track_submodules,
            auth: top.auth.or(self.auth),
            git: top.git.or(self.git),
            git_config,
            gc: top.gc.or(self.gc),
            stale_worktree_grace: top.stale_worktree_grace.or(self.stale_worktree_grace),
            health: top.health.or(self.health),
            exechook: top.exechook.or(self.exechook),
            webhook: top.webhook.or(self.webhook),
            touch_file: top.touch_file.or(self.touch_file),
            status_socket: top.status_socket.or(self.status_socket),
        }
    }
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load a config file.
///
/// Returns `ConfigError::NotFound` if absent, `ConfigError::Parse` (with
/// path + line context) if malformed YAML.
pub fn load_at(path: &Path) -> Result<ConfigFile, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse `250ms`, `30s`, `5m`, `1h` or bare seconds.
pub fn parse_duration(text: &str) -> Result<Duration, TypeError> {
    let text = text.trim();
    let bad = || TypeError::InvalidValue {
        what: "duration (e.g. 500ms, 30s, 5m, 1h)",
        value: text.to_string(),
    };
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, unit) = text.split_at(split);
    let amount: u64 = digits.parse().map_err(|_| bad())?;
    let secs_per_unit: u64 = match unit.trim() {
        "ms" => return Ok(Duration::from_millis(amount)),
        "" | "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => return Err(bad()),
    };
    amount
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(bad)
}

// ---------------------------------------------------------------------------
// 3. Validated configuration
// ---------------------------------------------------------------------------

/// Host key verification for SSH transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KnownHosts {
    /// `StrictHostKeyChecking=no`.
    Disabled,
    /// Verify against this known_hosts file only.
    File(PathBuf),
    /// Verify against the user's default known_hosts.
    System,
}

/// The one credential mechanism in effect.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum AuthConfig {
    #[default]
    None,
    Ssh {
        key_file: PathBuf,
        known_hosts: KnownHosts,
    },
    Password {
        username: String,
        password: String,
    },
    /// Credentials fetched from an HTTP endpoint before every cycle.
    Askpass {
        url: String,
        username: Option<String>,
    },
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthConfig::None => write!(f, "None"),
            AuthConfig::Ssh {
                key_file,
                known_hosts,
            } => f
                .debug_struct("Ssh")
                .field("key_file", key_file)
                .field("known_hosts", known_hosts)
                .finish(),
            AuthConfig::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            AuthConfig::Askpass { url, username } => f
                .debug_struct("Askpass")
                .field("url", url)
                .field("username", username)
                .finish(),
        }
    }
}

impl fmt::Display for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthConfig::None => write!(f, "none"),
            AuthConfig::Ssh {
                key_file,
                known_hosts,
            } => {
                let hosts = match known_hosts {
                    KnownHosts::Disabled => "disabled".to_string(),
                    KnownHosts::File(path) => path.display().to_string(),
                    KnownHosts::System => "system".to_string(),
                };
                write!(f, "ssh key {} (host verification: {hosts})", key_file.display())
            }
            AuthConfig::Password { username, .. } => write!(f, "password for {username}"),
            AuthConfig::Askpass { url, .. } => write!(f, "askpass via {url}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthConfig {
    /// Age of the last success after which health turns stale.
    pub stale_after: Duration,
    /// Consecutive failures tolerated before health turns stale.
    pub failure_threshold: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecHookConfig {
    pub command: PathBuf,
    pub args: Vec<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    pub url: String,
    pub method: String,
    pub success_status: u16,
    pub timeout: Duration,
}

/// Validated configuration consumed by the engine and the supervisor.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub repo: String,
    pub revision: RevisionSpec,
    /// Absolute path of the root directory.
    pub root: PathBuf,
    pub link: String,
    pub depth: Depth,
    pub period: Duration,
    pub sync_timeout: Duration,
    pub one_time: bool,
    pub submodules: SubmodulePolicy,
    /// Submodule names resolved against their own branch.
    pub track_submodules: BTreeSet<String>,
    pub auth: AuthConfig,
    /// Credential sections present in the file but shadowed by `auth`.
    pub ignored_credentials: Vec<&'static str>,
    pub git_binary: PathBuf,
    pub git_config: Vec<(String, String)>,
    pub gc: GcMode,
    pub stale_worktree_grace: Duration,
    pub health: HealthConfig,
    pub exechook: Option<ExecHookConfig>,
    pub webhook: Option<WebhookConfig>,
    pub touch_file: Option<PathBuf>,
    pub status_socket: PathBuf,
}

impl SyncConfig {
    /// Minimal configuration for `repo` mirrored into `root`; every other
    /// field takes its default.
    pub fn new(repo: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            repo: repo.into(),
            revision: RevisionSpec::default(),
            status_socket: root.join(SOCKET_FILE),
            root,
            link: DEFAULT_LINK.to_string(),
            depth: Depth::from_count(DEFAULT_DEPTH),
            period: DEFAULT_PERIOD,
            sync_timeout: DEFAULT_SYNC_TIMEOUT,
            one_time: false,
            submodules: SubmodulePolicy::default(),
            track_submodules: BTreeSet::new(),
            auth: AuthConfig::None,
            ignored_credentials: Vec::new(),
            git_binary: PathBuf::from("git"),
            git_config: Vec::new(),
            gc: GcMode::default(),
            stale_worktree_grace: DEFAULT_WORKTREE_GRACE,
            health: HealthConfig {
                stale_after: DEFAULT_PERIOD + DEFAULT_SYNC_TIMEOUT,
                failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            },
            exechook: None,
            webhook: None,
            touch_file: None,
        }
    }

    /// Validate a (merged) config file. `home` is only consulted when no
    /// status socket path was given.
    pub fn from_file_at(file: ConfigFile, home: Option<&Path>) -> Result<Self, ConfigError> {
        let repo = file
            .repo
            .filter(|r| !r.trim().is_empty())
            .ok_or(ConfigError::Missing("repo"))?;
        let revision = match file.revision.as_deref() {
            Some(spec) => RevisionSpec::parse(spec)?,
            None => RevisionSpec::default(),
        };

        let root = file.root.ok_or(ConfigError::Missing("root"))?;
        if root.as_os_str().is_empty() {
            return Err(ConfigError::Missing("root"));
        }
        if !root.is_absolute() {
            return Err(invalid(
                "root",
                format!("{} is not an absolute path", root.display()),
            ));
        }

        let link = file.link.unwrap_or_else(|| DEFAULT_LINK.to_string());
        validate_link(&link)?;

        let period = resolve_duration("period", file.period.as_ref(), DEFAULT_PERIOD)?;
        let sync_timeout =
            resolve_duration("sync_timeout", file.sync_timeout.as_ref(), DEFAULT_SYNC_TIMEOUT)?;
        let stale_worktree_grace = match &file.stale_worktree_grace {
            Some(value) => value.resolve()?,
            None => DEFAULT_WORKTREE_GRACE,
        };

        let mut track_submodules = BTreeSet::new();
        for name in file.track_submodules {
            if name.trim().is_empty() {
                return Err(invalid("track_submodules", "empty submodule name"));
            }
            track_submodules.insert(name.trim().to_string());
        }

        let (auth, ignored_credentials) = resolve_auth(file.auth.unwrap_or_default())?;

        let mut git_config = Vec::new();
        for (key, value) in file.git_config {
            validate_git_config_key(&key)?;
            git_config.push((key, value));
        }

        let health_file = file.health.unwrap_or_default();
        let health = HealthConfig {
            stale_after: resolve_duration(
                "health.stale_after",
                health_file.stale_after.as_ref(),
                period + sync_timeout,
            )?,
            failure_threshold: match health_file.failure_threshold {
                Some(0) => {
                    return Err(invalid("health.failure_threshold", "must be at least 1"));
                }
                Some(n) => n,
                None => DEFAULT_FAILURE_THRESHOLD,
            },
        };

        let exechook = match file.exechook {
            Some(hook) => Some(ExecHookConfig {
                command: hook.command,
                args: hook.args,
                timeout: resolve_duration(
                    "exechook.timeout",
                    hook.timeout.as_ref(),
                    DEFAULT_HOOK_TIMEOUT,
                )?,
            }),
            None => None,
        };

        let webhook = match file.webhook {
            Some(hook) => {
                validate_http_url("webhook.url", &hook.url)?;
                let method = hook.method.unwrap_or_else(|| "POST".to_string());
                if method.is_empty() || !method.chars().all(|c| c.is_ascii_alphabetic()) {
                    return Err(invalid("webhook.method", format!("'{method}' is not an HTTP method")));
                }
                Some(WebhookConfig {
                    url: hook.url,
                    method: method.to_ascii_uppercase(),
                    success_status: hook.success_status.unwrap_or(200),
                    timeout: resolve_duration(
                        "webhook.timeout",
                        hook.timeout.as_ref(),
                        DEFAULT_HOOK_TIMEOUT,
                    )?,
                })
            }
            None => None,
        };

        let status_socket = match file.status_socket {
            Some(path) => path,
            None => default_socket_path_at(home.ok_or(ConfigError::HomeNotFound)?),
        };

        Ok(Self {
            repo,
            revision,
            root,
            link,
            depth: Depth::from_count(file.depth.unwrap_or(DEFAULT_DEPTH)),
            period,
            sync_timeout,
            one_time: file.one_time.unwrap_or(false),
            submodules: file.submodules.unwrap_or_default(),
            track_submodules,
            auth,
            ignored_credentials,
            git_binary: file.git.unwrap_or_else(|| PathBuf::from("git")),
            git_config,
            gc: file.gc.unwrap_or_default(),
            stale_worktree_grace,
            health,
            exechook,
            webhook,
            touch_file: file.touch_file,
            status_socket,
        })
    }

    /// `from_file_at` convenience wrapper.
    pub fn from_file(file: ConfigFile) -> Result<Self, ConfigError> {
        let home = dirs::home_dir();
        Self::from_file_at(file, home.as_deref())
    }

    /// `Root/worktrees`
    pub fn worktrees_dir(&self) -> PathBuf {
        self.root.join("worktrees")
    }

    /// `Root/<link>`
    pub fn link_path(&self) -> PathBuf {
        self.root.join(&self.link)
    }
}

/// `<home>/.gitmirror/gitmirror.sock`
pub fn default_socket_path_at(home: &Path) -> PathBuf {
    home.join(".gitmirror").join(SOCKET_FILE)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn resolve_duration(
    field: &'static str,
    value: Option<&DurationValue>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let duration = match value {
        Some(value) => value.resolve()?,
        None => default,
    };
    if duration.is_zero() {
        return Err(invalid(field, "must be greater than zero"));
    }
    Ok(duration)
}

fn validate_link(link: &str) -> Result<(), ConfigError> {
    if link.is_empty() {
        return Err(invalid("link", "empty"));
    }
    if link.contains('/') || link.contains('\\') {
        return Err(invalid("link", "must be a single path component under root"));
    }
    if RESERVED_LINK_NAMES.contains(&link) {
        return Err(invalid("link", format!("'{link}' is reserved")));
    }
    Ok(())
}

fn validate_git_config_key(key: &str) -> Result<(), ConfigError> {
    let well_formed = key.contains('.')
        && !key.starts_with('.')
        && !key.ends_with('.')
        && !key.chars().any(|c| c.is_whitespace() || c == '=');
    if well_formed {
        Ok(())
    } else {
        Err(invalid("git_config", format!("'{key}' is not a section.key name")))
    }
}

fn validate_http_url(field: &'static str, url: &str) -> Result<(), ConfigError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(invalid(field, format!("'{url}' is not an http(s) URL")))
    }
}

/// Pick exactly one mechanism: ssh > password > askpass.
fn resolve_auth(file: AuthFile) -> Result<(AuthConfig, Vec<&'static str>), ConfigError> {
    let mut present = Vec::new();
    if file.ssh.is_some() {
        present.push("ssh");
    }
    if file.password.is_some() {
        present.push("password");
    }
    if file.askpass.is_some() {
        present.push("askpass");
    }
    let ignored = present.iter().skip(1).copied().collect();

    if let Some(ssh) = file.ssh {
        if !ssh.key_file.is_file() {
            return Err(invalid(
                "auth.ssh.key_file",
                format!("{} does not exist", ssh.key_file.display()),
            ));
        }
        let known_hosts = match (ssh.verify_host, ssh.known_hosts_file) {
            (false, _) => KnownHosts::Disabled,
            (true, Some(path)) => {
                if !path.is_file() {
                    return Err(invalid(
                        "auth.ssh.known_hosts_file",
                        format!("{} does not exist", path.display()),
                    ));
                }
                KnownHosts::File(path)
            }
            (true, None) => KnownHosts::System,
        };
        return Ok((
            AuthConfig::Ssh {
                key_file: ssh.key_file,
                known_hosts,
            },
            ignored,
        ));
    }

    if let Some(pw) = file.password {
        let password = match (pw.password, pw.password_file) {
            (Some(password), _) => password,
            (None, Some(path)) => std::fs::read_to_string(&path)
                .map_err(|e| io_err(&path, e))?
                .trim_end_matches(['\r', '\n'])
                .to_string(),
            (None, None) => {
                return Err(invalid(
                    "auth.password",
                    "one of password or password_file is required",
                ));
            }
        };
        if pw.username.is_empty() {
            return Err(invalid("auth.password.username", "empty"));
        }
        return Ok((
            AuthConfig::Password {
                username: pw.username,
                password,
            },
            ignored,
        ));
    }

    if let Some(askpass) = file.askpass {
        validate_http_url("auth.askpass.url", &askpass.url)?;
        return Ok((
            AuthConfig::Askpass {
                url: askpass.url,
                username: askpass.username,
            },
            ignored,
        ));
    }

    Ok((AuthConfig::None, ignored))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn minimal() -> ConfigFile {
        ConfigFile {
            repo: Some("https://example.com/repo.git".to_string()),
            root: Some(PathBuf::from("/srv/mirror")),
            ..ConfigFile::default()
        }
    }

    #[test]
    fn defaults_applied_to_minimal_file() {
        let home = TempDir::new().expect("home");
        let config = SyncConfig::from_file_at(minimal(), Some(home.path())).expect("valid");
        assert_eq!(config.link, DEFAULT_LINK);
        assert_eq!(config.depth, Depth::from_count(1));
        assert_eq!(config.revision, RevisionSpec::default());
        assert_eq!(config.submodules, SubmodulePolicy::Recursive);
        assert_eq!(config.health.stale_after, DEFAULT_PERIOD + DEFAULT_SYNC_TIMEOUT);
        assert_eq!(config.status_socket, default_socket_path_at(home.path()));
    }

    #[test]
    fn duration_units() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("30").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration("10d").is_err());
    }

    #[test]
    fn oversized_durations_are_rejected() {
        let minutes = format!("{}m", u64::MAX / 60 + 1);
        assert!(parse_duration(&minutes).is_err());
        let hours = format!("{}h", u64::MAX / 3600 + 1);
        assert!(parse_duration(&hours).is_err());
        assert!(parse_duration(&format!("{}s", u64::MAX)).is_ok());
    }

    #[test]
    fn missing_socket_without_home_is_an_error() {
        let err = SyncConfig::from_file_at(minimal(), None).unwrap_err();
        assert!(matches!(err, ConfigError::HomeNotFound));
    }

    #[test]
    fn overlay_prefers_top_and_merges_sets() {
        let base = ConfigFile {
            link: Some("html".to_string()),
            track_submodules: vec!["a".to_string()],
            ..minimal()
        };
        let top = ConfigFile {
            link: Some("site".to_string()),
            track_submodules: vec!["b".to_string(), "a".to_string()],
            ..ConfigFile::default()
        };
        let merged = base.overlay(top);
        assert_eq!(merged.link.as_deref(), Some("site"));
        assert_eq!(merged.repo.as_deref(), Some("https://example.com/repo.git"));
        assert_eq!(merged.track_submodules, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn password_debug_is_redacted() {
        let auth = AuthConfig::Password {
            username: "bot".to_string(),
            password: "hunter2".to_string(),
        };
        let debug = format!("{auth:?}");
        assert!(debug.contains("bot"));
        assert!(!debug.contains("hunter2"));
    }
}
