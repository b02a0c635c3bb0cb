//! Local git fixtures: bare "remote" repositories driven through a scratch
//! clone with the real `git` binary.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;

use gitmirror_core::{Depth, SyncConfig};
use tempfile::TempDir;

/// Run git in `dir`, panicking with stderr on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=gitmirror-test",
            "-c",
            "user.email=test@example.com",
            "-c",
            "commit.gpgsign=false",
            "-c",
            "protocol.file.allow=always",
            "-c",
            "init.defaultBranch=main",
        ])
        .args(args)
        .current_dir(dir)
        .env_remove("GIT_DIR")
        .env_remove("GIT_WORK_TREE")
        .output()
        .expect("spawn git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A bare repository plus a working clone used to push to it.
pub struct Remote {
    pub bare: PathBuf,
    pub work: PathBuf,
}

impl Remote {
    pub fn new(base: &Path, name: &str) -> Self {
        let bare = base.join(format!("{name}.git"));
        let work = base.join(format!("{name}-work"));
        git(base, &["init", "--quiet", "--bare", bare.to_str().expect("utf8")]);
        git(base, &["init", "--quiet", work.to_str().expect("utf8")]);
        git(&work, &["remote", "add", "origin", bare.to_str().expect("utf8")]);
        Self { bare, work }
    }

    pub fn url(&self) -> String {
        self.bare.to_string_lossy().into_owned()
    }

    /// Write `files`, commit, push to `main`; returns the new commit id.
    pub fn commit(&self, files: &[(&str, &str)], message: &str) -> String {
        for (name, content) in files {
            let path = self.work.join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).expect("mkdir");
            }
            std::fs::write(&path, content).expect("write file");
        }
        git(&self.work, &["add", "-A"]);
        git(&self.work, &["commit", "--quiet", "-m", message]);
        self.push()
    }

    /// Force the remote's `main` back to `id`.
    pub fn reset_to(&self, id: &str) {
        git(&self.work, &["reset", "--quiet", "--hard", id]);
        self.push();
    }

    pub fn push(&self) -> String {
        git(&self.work, &["push", "--quiet", "--force", "origin", "HEAD:refs/heads/main"]);
        self.head()
    }

    pub fn head(&self) -> String {
        git(&self.work, &["rev-parse", "HEAD"])
    }
}

pub fn config(remote: &Remote, root: &Path) -> SyncConfig {
    let mut config = SyncConfig::new(remote.url(), root);
    config.depth = Depth::from_count(1);
    config
        .git_config
        .push(("protocol.file.allow".to_string(), "always".to_string()));
    config
}

pub struct Fixture {
    pub dir: TempDir,
    pub remote: Remote,
    pub root: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let remote = Remote::new(dir.path(), "site");
        let root = dir.path().join("mirror");
        Self { dir, remote, root }
    }

    pub fn config(&self) -> SyncConfig {
        config(&self.remote, &self.root)
    }

    /// Read a file through the published link.
    pub fn published(&self, file: &str) -> String {
        std::fs::read_to_string(self.root.join("current").join(file)).expect("read published file")
    }

    /// Write an executable shell script under the fixture directory.
    pub fn script(&self, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = self.dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        let mut perms = std::fs::metadata(&path).expect("meta").permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).expect("chmod");
        path
    }
}
