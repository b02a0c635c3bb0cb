use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn gitmirror_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("gitmirror"));
    cmd.env("HOME", home).env("RUST_LOG", "warn");
    cmd
}

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=gitmirror-test",
            "-c",
            "user.email=test@example.com",
            "-c",
            "commit.gpgsign=false",
            "-c",
            "init.defaultBranch=main",
        ])
        .args(args)
        .current_dir(dir)
        .output()
        .expect("spawn git");
    assert!(output.status.success(), "git {args:?} failed");
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Bare repository with one commit on `main`.
fn bare_remote(base: &Path) -> (PathBuf, String) {
    let bare = base.join("site.git");
    let work = base.join("site-work");
    git(base, &["init", "--quiet", "--bare", bare.to_str().expect("utf8")]);
    git(base, &["init", "--quiet", work.to_str().expect("utf8")]);
    fs::write(work.join("index.html"), "<h1>hello</h1>").expect("write");
    git(&work, &["add", "-A"]);
    git(&work, &["commit", "--quiet", "-m", "first"]);
    git(&work, &["push", "--quiet", bare.to_str().expect("utf8"), "HEAD:refs/heads/main"]);
    let head = git(&work, &["rev-parse", "HEAD"]);
    (bare, head)
}

// ---------------------------------------------------------------------------
// check
// ---------------------------------------------------------------------------

#[test]
fn check_prints_effective_settings() {
    let home = TempDir::new().expect("home");
    let root = home.path().join("mirror");
    let config = home.path().join("gitmirror.yaml");
    fs::write(
        &config,
        format!(
            "repo: https://example.com/site.git\nref: main\nroot: {}\nperiod: 30s\ntrack_submodules: [theme]\n",
            root.display()
        ),
    )
    .expect("write config");

    gitmirror_cmd(home.path())
        .args(["check", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(contains("configuration is valid"))
        .stdout(contains("recursive"))
        .stdout(contains("theme"))
        .stdout(contains("30s"))
        .stdout(contains(root.display().to_string()));
}

#[test]
fn check_flags_override_file() {
    let home = TempDir::new().expect("home");
    let config = home.path().join("gitmirror.yaml");
    fs::write(
        &config,
        format!(
            "repo: https://example.com/site.git\nroot: {}\ndepth: 5\n",
            home.path().join("mirror").display()
        ),
    )
    .expect("write config");

    gitmirror_cmd(home.path())
        .args(["check", "--json", "--depth", "0", "--link", "live", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(contains("\"depth\": \"full\""))
        .stdout(contains("live"));
}

#[test]
fn check_rejects_missing_repo() {
    let home = TempDir::new().expect("home");
    gitmirror_cmd(home.path())
        .args(["check", "--root"])
        .arg(home.path().join("mirror"))
        .assert()
        .failure()
        .stderr(contains("repo"));
}

#[test]
fn check_rejects_bad_link_name() {
    let home = TempDir::new().expect("home");
    gitmirror_cmd(home.path())
        .args(["check", "--repo", "https://example.com/x.git", "--link", "a/b", "--root"])
        .arg(home.path().join("mirror"))
        .assert()
        .failure()
        .stderr(contains("link"));
}

#[test]
fn relative_root_flag_resolves_against_cwd() {
    let home = TempDir::new().expect("home");
    gitmirror_cmd(home.path())
        .current_dir(home.path())
        .args(["check", "--json", "--repo", "https://example.com/x.git", "--root", "mirror"])
        .assert()
        .success()
        .stdout(contains(home.path().join("mirror").display().to_string()));
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

#[test]
fn one_time_run_publishes_and_exits_zero() {
    let home = TempDir::new().expect("home");
    let (bare, head) = bare_remote(home.path());
    let root = home.path().join("mirror");

    gitmirror_cmd(home.path())
        .args(["run", "--one-time", "--repo"])
        .arg(&bare)
        .arg("--root")
        .arg(&root)
        .assert()
        .success()
        .stdout(contains("published"))
        .stdout(contains(&head[..12]));

    let page = fs::read_to_string(root.join("current/index.html")).expect("published file");
    assert_eq!(page, "<h1>hello</h1>");
}

#[test]
fn one_time_run_with_unknown_ref_exits_nonzero() {
    let home = TempDir::new().expect("home");
    let (bare, _) = bare_remote(home.path());
    let root = home.path().join("mirror");

    gitmirror_cmd(home.path())
        .args(["run", "--one-time", "--ref", "no-such-branch", "--repo"])
        .arg(&bare)
        .arg("--root")
        .arg(&root)
        .assert()
        .failure()
        .stderr(contains("no-such-branch"));
    assert!(fs::symlink_metadata(root.join("current")).is_err());
}

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

#[test]
fn status_without_daemon_fails() {
    let home = TempDir::new().expect("home");
    gitmirror_cmd(home.path())
        .args(["status", "--socket"])
        .arg(home.path().join("absent.sock"))
        .assert()
        .failure()
        .stderr(contains("not running"));
}

#[test]
fn status_reports_running_daemon() {
    let home = TempDir::new().expect("home");
    let (bare, head) = bare_remote(home.path());
    let root = home.path().join("mirror");
    let socket = home.path().join(".gitmirror/gitmirror.sock");

    let mut daemon = gitmirror_cmd(home.path())
        .args(["run", "--period", "1s", "--repo"])
        .arg(&bare)
        .arg("--root")
        .arg(&root)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn daemon");

    let deadline = Instant::now() + Duration::from_secs(30);
    let mut last = None;
    while Instant::now() < deadline {
        let output = gitmirror_cmd(home.path())
            .args(["status", "--json"])
            .output()
            .expect("status");
        if output.status.success() {
            last = Some(String::from_utf8_lossy(&output.stdout).into_owned());
            break;
        }
        sleep(Duration::from_millis(200));
    }

    let stopped = gitmirror_daemon::request_stop(&socket);
    let exit_deadline = Instant::now() + Duration::from_secs(30);
    while daemon.try_wait().expect("try_wait").is_none() && Instant::now() < exit_deadline {
        sleep(Duration::from_millis(100));
    }
    if daemon.try_wait().expect("try_wait").is_none() {
        let _ = daemon.kill();
        panic!("daemon did not stop");
    }

    let body = last.expect("daemon became healthy");
    assert!(body.contains("\"HEALTHY\""), "got: {body}");
    assert!(body.contains(&head), "got: {body}");
    stopped.expect("stop request");
    assert!(!socket.exists());
}
