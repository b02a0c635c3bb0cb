//! Submodule policies and modes through full cycles.

mod common;

use common::{git, Fixture, Remote};
use gitmirror_core::{Depth, SubmodulePolicy, SyncConfig};
use gitmirror_sync::SyncEngine;

struct WithLib {
    fx: Fixture,
    lib: Remote,
    pinned: String,
}

/// Site repository whose `lib` submodule is pinned at the library's first
/// commit, after which the library's `main` moves on.
fn site_with_lib() -> WithLib {
    let fx = Fixture::new();
    let lib = Remote::new(fx.dir.path(), "lib");
    let pinned = lib.commit(&[("lib.txt", "lib v1")], "lib one");

    fx.remote.commit(&[("page.txt", "v1")], "site one");
    git(
        &fx.remote.work,
        &["submodule", "add", "--quiet", "-b", "main", &lib.url(), "lib"],
    );
    git(&fx.remote.work, &["commit", "--quiet", "-m", "add lib"]);
    fx.remote.push();

    lib.commit(&[("lib.txt", "lib v2")], "lib two");
    WithLib { fx, lib, pinned }
}

fn config(fx: &Fixture) -> SyncConfig {
    let mut config = fx.config();
    config.depth = Depth::Full;
    config.submodules = SubmodulePolicy::Recursive;
    config
}

#[tokio::test]
async fn pinned_submodule_checks_out_superproject_commit() {
    let w = site_with_lib();
    let mut engine = SyncEngine::new(config(&w.fx));
    let outcome = engine.run_cycle(None).await.expect("cycle");

    assert_eq!(w.fx.published("lib/lib.txt"), "lib v1");
    let head = git(&outcome.worktree.join("lib"), &["rev-parse", "HEAD"]);
    assert_eq!(head, w.pinned);
    assert!(!outcome.key.as_str().contains('-'), "plain key: {}", outcome.key);
}

#[tokio::test]
async fn submodules_off_leaves_directory_empty() {
    let w = site_with_lib();
    let mut config = config(&w.fx);
    config.submodules = SubmodulePolicy::Off;
    let mut engine = SyncEngine::new(config);
    let outcome = engine.run_cycle(None).await.expect("cycle");
    assert!(!outcome.worktree.join("lib/lib.txt").exists());
}

#[tokio::test]
async fn tracked_submodule_follows_its_branch() {
    let w = site_with_lib();
    let mut config = config(&w.fx);
    config.track_submodules.insert("lib".to_string());
    let mut engine = SyncEngine::new(config);

    let first = engine.run_cycle(None).await.expect("first");
    assert_eq!(w.fx.published("lib/lib.txt"), "lib v2");

    let again = engine.run_cycle(None).await.expect("no movement");
    assert!(!again.changed);
    assert_eq!(again.key, first.key);

    w.lib.commit(&[("lib.txt", "lib v3")], "lib three");
    let moved = engine.run_cycle(None).await.expect("library moved");
    assert!(moved.changed);
    assert_eq!(moved.commit, first.commit, "superproject did not move");
    assert_ne!(moved.key, first.key);
    assert!(
        moved.key.as_str().starts_with(&format!("{}-", first.commit)),
        "fingerprinted key: {}",
        moved.key
    );
    assert_eq!(w.fx.published("lib/lib.txt"), "lib v3");
}

#[tokio::test]
async fn removed_submodule_disappears_from_published_tree() {
    let w = site_with_lib();
    let mut engine = SyncEngine::new(config(&w.fx));
    engine.run_cycle(None).await.expect("with lib");
    assert!(w.fx.root.join("current/lib/lib.txt").exists());

    git(&w.fx.remote.work, &["rm", "--quiet", "lib"]);
    git(&w.fx.remote.work, &["commit", "--quiet", "-m", "drop lib"]);
    w.fx.remote.push();

    let outcome = engine.run_cycle(None).await.expect("without lib");
    assert!(outcome.changed);
    assert!(!w.fx.root.join("current/lib").exists());
    assert_eq!(w.fx.published("page.txt"), "v1");
}

/// `site` pins `lib`, which in turn pins `inner`.
fn nested_site() -> Fixture {
    let fx = Fixture::new();
    let inner = Remote::new(fx.dir.path(), "inner");
    inner.commit(&[("inner.txt", "inner v1")], "inner one");

    let lib = Remote::new(fx.dir.path(), "lib");
    lib.commit(&[("lib.txt", "lib v1")], "lib one");
    git(&lib.work, &["submodule", "add", "--quiet", &inner.url(), "inner"]);
    git(&lib.work, &["commit", "--quiet", "-m", "add inner"]);
    lib.push();

    fx.remote.commit(&[("page.txt", "v1")], "site one");
    git(&fx.remote.work, &["submodule", "add", "--quiet", &lib.url(), "lib"]);
    git(&fx.remote.work, &["commit", "--quiet", "-m", "add lib"]);
    fx.remote.push();
    fx
}

#[tokio::test]
async fn recursive_policy_reaches_nested_submodules() {
    let fx = nested_site();
    let mut engine = SyncEngine::new(config(&fx));
    engine.run_cycle(None).await.expect("cycle");

    assert_eq!(fx.published("lib/lib.txt"), "lib v1");
    assert_eq!(fx.published("lib/inner/inner.txt"), "inner v1");
}

#[tokio::test]
async fn shallow_policy_stops_at_direct_submodules() {
    let fx = nested_site();
    let mut config = config(&fx);
    config.submodules = SubmodulePolicy::Shallow;
    let mut engine = SyncEngine::new(config);
    engine.run_cycle(None).await.expect("cycle");

    assert_eq!(fx.published("lib/lib.txt"), "lib v1");
    assert!(!fx.root.join("current/lib/inner/inner.txt").exists());
}

#[tokio::test]
async fn shallow_entry_overrides_full_depth() {
    let fx = Fixture::new();
    let lib = Remote::new(fx.dir.path(), "lib");
    lib.commit(&[("lib.txt", "lib v1")], "lib one");
    lib.commit(&[("lib.txt", "lib v2")], "lib two");
    lib.commit(&[("lib.txt", "lib v3")], "lib three");

    fx.remote.commit(&[("page.txt", "v1")], "site one");
    // Local-path clones ignore --depth; file:// honours it.
    let url = format!("file://{}", lib.url());
    git(&fx.remote.work, &["submodule", "add", "--quiet", &url, "lib"]);
    git(
        &fx.remote.work,
        &["config", "--file", ".gitmodules", "submodule.lib.shallow", "true"],
    );
    git(&fx.remote.work, &["add", ".gitmodules"]);
    git(&fx.remote.work, &["commit", "--quiet", "-m", "add shallow lib"]);
    fx.remote.push();

    let mut engine = SyncEngine::new(config(&fx));
    let outcome = engine.run_cycle(None).await.expect("cycle");

    assert_eq!(fx.published("lib/lib.txt"), "lib v3");
    let lib_history = git(&outcome.worktree.join("lib"), &["rev-list", "--count", "HEAD"]);
    assert_eq!(lib_history, "1");
    let site_history = git(&outcome.worktree, &["rev-list", "--count", "HEAD"]);
    assert_eq!(site_history, "2");
}

#[tokio::test]
async fn gitlink_without_manifest_entry_is_removed() {
    let w = site_with_lib();
    let mut engine = SyncEngine::new(config(&w.fx));
    engine.run_cycle(None).await.expect("with lib");

    // Keep the gitlink in the tree, drop its `.gitmodules` section.
    git(
        &w.fx.remote.work,
        &["config", "--file", ".gitmodules", "--remove-section", "submodule.lib"],
    );
    git(&w.fx.remote.work, &["add", ".gitmodules"]);
    git(&w.fx.remote.work, &["commit", "--quiet", "-m", "forget lib"]);
    w.fx.remote.push();
    let staged = git(&w.fx.remote.work, &["ls-files", "--stage", "lib"]);
    assert!(staged.starts_with("160000"), "gitlink kept: {staged}");

    let outcome = engine.run_cycle(None).await.expect("without manifest entry");
    assert!(outcome.changed);
    assert!(!outcome.worktree.join("lib").exists());
    assert_eq!(w.fx.published("page.txt"), "v1");
}
