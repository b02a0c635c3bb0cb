//! AuthBroker: turns the configured credential mechanism into per-cycle
//! environment for git.
//!
//! Secrets only ever travel through child-process environment variables. The
//! password helper installed below reads them back from its own environment,
//! so nothing secret appears in argv or in the store's config file.

use std::time::Duration;

use gitmirror_core::{AuthConfig, KnownHosts};

use crate::error::SyncError;

const ASKPASS_TIMEOUT: Duration = Duration::from_secs(15);

const USERNAME_VAR: &str = "GITMIRROR_USERNAME";
const PASSWORD_VAR: &str = "GITMIRROR_PASSWORD";

/// Credential helper that answers every `get` with the two variables above.
const INLINE_HELPER: &str =
    "!f() { echo \"username=${GITMIRROR_USERNAME}\"; echo \"password=${GITMIRROR_PASSWORD}\"; }; f";

/// Extra git config entries and environment for one cycle.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub(crate) config: Vec<(String, String)>,
    pub(crate) env: Vec<(String, String)>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<&str> = self.env.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("Credentials")
            .field("config_entries", &self.config.len())
            .field("env", &keys)
            .finish()
    }
}

impl Credentials {
    fn username_password(username: &str, password: &str) -> Self {
        Self {
            config: vec![
                // An empty value resets helpers inherited from system/global config.
                ("credential.helper".to_string(), String::new()),
                ("credential.helper".to_string(), INLINE_HELPER.to_string()),
            ],
            env: vec![
                (USERNAME_VAR.to_string(), username.to_string()),
                (PASSWORD_VAR.to_string(), password.to_string()),
            ],
        }
    }

    fn ssh(key_file: &std::path::Path, known_hosts: &KnownHosts) -> Self {
        let mut command = format!(
            "ssh -i {} -o IdentitiesOnly=yes -o BatchMode=yes",
            shell_quote(&key_file.to_string_lossy())
        );
        match known_hosts {
            KnownHosts::Disabled => {
                command.push_str(" -o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null");
            }
            KnownHosts::File(path) => {
                command.push_str(" -o StrictHostKeyChecking=yes -o UserKnownHostsFile=");
                command.push_str(&shell_quote(&path.to_string_lossy()));
            }
            KnownHosts::System => command.push_str(" -o StrictHostKeyChecking=yes"),
        }
        Self {
            config: Vec::new(),
            env: vec![("GIT_SSH_COMMAND".to_string(), command)],
        }
    }
}

/// Supplies credentials through exactly one mechanism.
#[derive(Debug, Clone)]
pub struct AuthBroker {
    config: AuthConfig,
}

impl AuthBroker {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Credentials for the cycle about to start. Askpass endpoints are queried
    /// on every call.
    pub async fn credentials(&self) -> Result<Credentials, SyncError> {
        match &self.config {
            AuthConfig::None => Ok(Credentials::default()),
            AuthConfig::Ssh {
                key_file,
                known_hosts,
            } => Ok(Credentials::ssh(key_file, known_hosts)),
            AuthConfig::Password { username, password } => {
                Ok(Credentials::username_password(username, password))
            }
            AuthConfig::Askpass { url, username } => {
                let body = fetch_askpass(url.clone()).await?;
                let parsed = parse_credential_lines(&body);
                let username = parsed.username.or_else(|| username.clone());
                match (username, parsed.password) {
                    (Some(user), Some(password)) => {
                        tracing::debug!(url = %url, "askpass credentials refreshed");
                        Ok(Credentials::username_password(&user, &password))
                    }
                    _ => Err(SyncError::AuthFailed {
                        operation: "askpass".to_string(),
                        diagnostics: format!("{url} returned no username/password"),
                    }),
                }
            }
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct CredentialLines {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// `username=…` / `password=…` lines; anything else is ignored.
pub(crate) fn parse_credential_lines(body: &str) -> CredentialLines {
    let mut parsed = CredentialLines::default();
    for line in body.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(value) = line.strip_prefix("username=") {
            parsed.username = Some(value.to_string());
        } else if let Some(value) = line.strip_prefix("password=") {
            parsed.password = Some(value.to_string());
        }
    }
    parsed
}

async fn fetch_askpass(url: String) -> Result<String, SyncError> {
    let target = url.clone();
    let joined = tokio::task::spawn_blocking(move || {
        let agent = ureq::AgentBuilder::new().timeout(ASKPASS_TIMEOUT).build();
        match agent.get(&target).call() {
            Ok(response) => response.into_string().map_err(|e| SyncError::Transport {
                operation: "askpass".to_string(),
                diagnostics: format!("reading {target}: {e}"),
            }),
            Err(ureq::Error::Status(code, _)) => Err(SyncError::AuthFailed {
                operation: "askpass".to_string(),
                diagnostics: format!("{target} returned HTTP {code}"),
            }),
            Err(ureq::Error::Transport(e)) => Err(SyncError::Transport {
                operation: "askpass".to_string(),
                diagnostics: format!("{target}: {e}"),
            }),
        }
    })
    .await;
    match joined {
        Ok(result) => result,
        Err(e) => Err(SyncError::Transport {
            operation: "askpass".to_string(),
            diagnostics: format!("{url}: request task failed: {e}"),
        }),
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}
