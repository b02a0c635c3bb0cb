//! Domain types for gitmirror.
//!
//! Submodule modes, submodule policies and history depth are explicit tagged
//! variants. Call sites match on them instead of threading booleans around.

use std::fmt;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A full commit identifier (SHA-1 or SHA-256 object name), lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommitId(String);

impl CommitId {
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let trimmed = s.trim();
        if is_full_hex(trimmed) {
            Ok(Self(trimmed.to_ascii_lowercase()))
        } else {
            Err(TypeError::InvalidCommitId(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for CommitId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CommitId {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<CommitId> for String {
    fn from(id: CommitId) -> Self {
        id.0
    }
}

fn is_full_hex(s: &str) -> bool {
    (s.len() == 40 || s.len() == 64) && s.bytes().all(|b| b.is_ascii_hexdigit())
}

// ---------------------------------------------------------------------------
// Revision spec
// ---------------------------------------------------------------------------

/// What the operator asked to mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevisionSpec {
    /// A literal, full-length commit id.
    Commit(CommitId),
    /// A ref path (`refs/heads/main`), a branch or tag name, or `HEAD`.
    Symbolic(String),
}

impl RevisionSpec {
    pub const DEFAULT: &'static str = "HEAD";

    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let s = s.trim();
        if is_full_hex(s) {
            return Ok(Self::Commit(CommitId::parse(s)?));
        }
        validate_ref_name(s)?;
        Ok(Self::Symbolic(s.to_string()))
    }

    pub fn is_commit(&self) -> bool {
        matches!(self, Self::Commit(_))
    }
}

impl Default for RevisionSpec {
    fn default() -> Self {
        Self::Symbolic(Self::DEFAULT.to_string())
    }
}

impl fmt::Display for RevisionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Commit(id) => id.fmt(f),
            Self::Symbolic(name) => name.fmt(f),
        }
    }
}

impl FromStr for RevisionSpec {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A subset of `git check-ref-format` rules, enough to reject values that
/// would be interpreted as options or revision expressions.
pub fn validate_ref_name(name: &str) -> Result<(), TypeError> {
    let reject = |reason| {
        Err(TypeError::InvalidRefName {
            name: name.to_string(),
            reason,
        })
    };
    if name.is_empty() {
        return reject("empty");
    }
    if name.starts_with('-') {
        return reject("starts with '-'");
    }
    if name.starts_with('/') || name.ends_with('/') || name.contains("//") {
        return reject("misplaced '/'");
    }
    if name.contains("..") || name.contains("@{") {
        return reject("contains a revision expression");
    }
    if name.ends_with('.') || name.ends_with(".lock") {
        return reject("bad suffix");
    }
    if name
        .chars()
        .any(|c| c.is_control() || c.is_whitespace() || "~^:?*[\\".contains(c))
    {
        return reject("contains a forbidden character");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Depth
// ---------------------------------------------------------------------------

/// History depth requested for fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum Depth {
    /// Complete history (configured as `0`).
    #[default]
    Full,
    /// Only the N most recent ancestors.
    Shallow(NonZeroU32),
}

impl Depth {
    pub fn from_count(n: u32) -> Self {
        match NonZeroU32::new(n) {
            Some(n) => Self::Shallow(n),
            None => Self::Full,
        }
    }

    /// Depth as configured: `0` means full history.
    pub fn count(self) -> u32 {
        match self {
            Self::Full => 0,
            Self::Shallow(n) => n.get(),
        }
    }

    pub fn is_full(self) -> bool {
        matches!(self, Self::Full)
    }
}

impl From<u32> for Depth {
    fn from(n: u32) -> Self {
        Self::from_count(n)
    }
}

impl From<Depth> for u32 {
    fn from(d: Depth) -> Self {
        d.count()
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Shallow(n) => write!(f, "{n}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// How nested repositories are materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubmodulePolicy {
    /// Submodules are left uninitialized.
    Off,
    /// Only the superproject's direct submodules.
    Shallow,
    /// Submodules at every nesting level.
    #[default]
    Recursive,
}

impl fmt::Display for SubmodulePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmodulePolicy::Off => write!(f, "off"),
            SubmodulePolicy::Shallow => write!(f, "shallow"),
            SubmodulePolicy::Recursive => write!(f, "recursive"),
        }
    }
}

impl FromStr for SubmodulePolicy {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "shallow" => Ok(Self::Shallow),
            "recursive" => Ok(Self::Recursive),
            other => Err(TypeError::InvalidValue {
                what: "submodule policy (off, shallow, recursive)",
                value: other.to_string(),
            }),
        }
    }
}

/// Which commit a submodule entry is checked out at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubmoduleMode {
    /// Exactly the commit recorded by the superproject.
    Pinned,
    /// The latest commit on the submodule's own tracked branch.
    RemoteTracking,
}

impl fmt::Display for SubmoduleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmoduleMode::Pinned => write!(f, "pinned"),
            SubmoduleMode::RemoteTracking => write!(f, "remote-tracking"),
        }
    }
}

/// Store garbage-collection behaviour after each published cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GcMode {
    #[default]
    Auto,
    Always,
    Aggressive,
    Off,
}

impl FromStr for GcMode {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "always" => Ok(Self::Always),
            "aggressive" => Ok(Self::Aggressive),
            "off" => Ok(Self::Off),
            other => Err(TypeError::InvalidValue {
                what: "gc mode (auto, always, aggressive, off)",
                value: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Submodule spec
// ---------------------------------------------------------------------------

/// One entry of a superproject's `.gitmodules`, with its tracking mode
/// already decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmoduleSpec {
    pub name: String,
    /// Path relative to the superproject's working tree.
    pub path: PathBuf,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub mode: SubmoduleMode,
    /// `submodule.<name>.shallow`: forces depth 1 for this entry.
    #[serde(default)]
    pub shallow: bool,
}

impl SubmoduleSpec {
    /// Depth for this entry: inherited unless the entry is marked shallow.
    pub fn depth(&self, inherited: Depth) -> Depth {
        if self.shallow {
            Depth::from_count(1)
        } else {
            inherited
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
