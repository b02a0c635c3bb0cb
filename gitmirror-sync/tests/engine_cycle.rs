//! End-to-end cycles against local bare repositories.

mod common;

use std::time::Duration;

use common::{git, Fixture};
use gitmirror_core::{Depth, RevisionSpec};
use gitmirror_sync::{worktree::WorktreeKey, ErrorKind, SyncEngine};

// ---------------------------------------------------------------------------
// 1. Publishing follows the remote
// ---------------------------------------------------------------------------

#[tokio::test]
async fn publishes_v1_v2_then_v1_again() {
    let fx = Fixture::new();
    let a = fx.remote.commit(&[("page.txt", "v1")], "A");
    let mut engine = SyncEngine::new(fx.config());

    let first = engine.run_cycle(None).await.expect("cycle A");
    assert!(first.changed);
    assert_eq!(first.commit.as_str(), a);
    assert_eq!(fx.published("page.txt"), "v1");

    let b = fx.remote.commit(&[("page.txt", "v2")], "B");
    let second = engine.run_cycle(None).await.expect("cycle B");
    assert!(second.changed);
    assert_eq!(second.commit.as_str(), b);
    assert_eq!(fx.published("page.txt"), "v2");

    fx.remote.reset_to(&a);
    let third = engine.run_cycle(None).await.expect("cycle back to A");
    assert!(third.changed);
    assert_eq!(third.commit.as_str(), a);
    assert_eq!(third.key, first.key);
    assert_eq!(fx.published("page.txt"), "v1");
}

#[tokio::test]
async fn unchanged_remote_is_a_noop_publish() {
    let fx = Fixture::new();
    fx.remote.commit(&[("page.txt", "v1")], "A");
    let mut engine = SyncEngine::new(fx.config());

    let first = engine.run_cycle(None).await.expect("first");
    let link_before = std::fs::read_link(fx.root.join("current")).expect("link");
    let second = engine.run_cycle(None).await.expect("second");

    assert!(!second.changed);
    assert_eq!(first.key, second.key);
    assert_eq!(std::fs::read_link(fx.root.join("current")).expect("link"), link_before);
}

#[tokio::test]
async fn link_is_relative_and_points_into_worktrees() {
    let fx = Fixture::new();
    let a = fx.remote.commit(&[("page.txt", "v1")], "A");
    let mut engine = SyncEngine::new(fx.config());
    engine.run_cycle(None).await.expect("cycle");

    let target = std::fs::read_link(fx.root.join("current")).expect("link");
    assert_eq!(target, std::path::Path::new("worktrees").join(&a));
    assert!(fx.root.join(".git/gitmirror/worktrees").join(format!("{a}.json")).is_file());
}

// ---------------------------------------------------------------------------
// 2. Revision specs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn literal_commit_is_published_even_when_branch_moved() {
    let fx = Fixture::new();
    let a = fx.remote.commit(&[("page.txt", "v1")], "A");
    fx.remote.commit(&[("page.txt", "v2")], "B");

    let mut config = fx.config();
    config.revision = RevisionSpec::parse(&a).expect("spec");
    config.depth = Depth::Full;
    let mut engine = SyncEngine::new(config);
    let outcome = engine.run_cycle(None).await.expect("cycle");
    assert_eq!(outcome.commit.as_str(), a);
    assert_eq!(fx.published("page.txt"), "v1");
}

#[tokio::test]
async fn tag_resolves_to_its_commit() {
    let fx = Fixture::new();
    let a = fx.remote.commit(&[("page.txt", "v1")], "A");
    git(&fx.remote.work, &["tag", "-a", "-m", "release one", "release-1"]);
    git(&fx.remote.work, &["push", "--quiet", "origin", "release-1"]);
    fx.remote.commit(&[("page.txt", "v2")], "B");

    let mut config = fx.config();
    config.revision = RevisionSpec::parse("release-1").expect("spec");
    let mut engine = SyncEngine::new(config);
    let outcome = engine.run_cycle(None).await.expect("cycle");
    assert_eq!(outcome.commit.as_str(), a);
    assert_eq!(fx.published("page.txt"), "v1");
}

#[tokio::test]
async fn unknown_branch_fails_without_publishing() {
    let fx = Fixture::new();
    fx.remote.commit(&[("page.txt", "v1")], "A");
    let mut config = fx.config();
    config.revision = RevisionSpec::parse("does-not-exist").expect("spec");
    let mut engine = SyncEngine::new(config);

    let err = engine.run_cycle(None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownRevision);
    assert!(std::fs::symlink_metadata(fx.root.join("current")).is_err());
}

#[tokio::test]
async fn unreachable_remote_is_transport_failure() {
    let fx = Fixture::new();
    let mut config = fx.config();
    config.repo = fx.dir.path().join("missing.git").to_string_lossy().into_owned();
    let mut engine = SyncEngine::new(config);
    let err = engine.run_cycle(None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert!(err.diagnostics().is_some());
}

// ---------------------------------------------------------------------------
// 3. Depth
// ---------------------------------------------------------------------------

#[tokio::test]
async fn depth_switches_between_shallow_and_full() {
    let fx = Fixture::new();
    fx.remote.commit(&[("page.txt", "1")], "one");
    fx.remote.commit(&[("page.txt", "2")], "two");
    fx.remote.commit(&[("page.txt", "3")], "three");

    let mut engine = SyncEngine::new(fx.config());
    engine.run_cycle(None).await.expect("shallow cycle");
    let published = fx.root.join("current");
    assert_eq!(git(&published, &["rev-list", "--count", "HEAD"]), "1");
    assert_eq!(git(&fx.root, &["rev-parse", "--is-shallow-repository"]), "true");

    let mut config = fx.config();
    config.depth = Depth::Full;
    let mut engine = SyncEngine::new(config);
    let outcome = engine.run_cycle(None).await.expect("full cycle");
    assert!(!outcome.changed, "same commit, same worktree");
    assert_eq!(git(&fx.root, &["rev-parse", "--is-shallow-repository"]), "false");
    assert_eq!(git(&published, &["rev-list", "--count", "HEAD"]), "3");
}

// ---------------------------------------------------------------------------
// 4. Self-healing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn corrupted_store_is_rebuilt_and_republished() {
    let fx = Fixture::new();
    fx.remote.commit(&[("page.txt", "v1")], "A");
    let mut engine = SyncEngine::new(fx.config());
    engine.run_cycle(None).await.expect("first");

    std::fs::write(fx.root.join(".git/HEAD"), b"garbage\n").expect("corrupt HEAD");

    let outcome = engine.run_cycle(None).await.expect("recovering cycle");
    assert!(outcome.rebuilt_store);
    assert_eq!(fx.published("page.txt"), "v1");

    let next = engine.run_cycle(None).await.expect("steady state");
    assert!(!next.rebuilt_store);
    assert!(!next.changed);
}

#[tokio::test]
async fn full_disk_fails_cycle_and_keeps_published_tree() {
    let fx = Fixture::new();
    fx.remote.commit(&[("page.txt", "v1")], "A");
    let full = fx.dir.path().join("disk-full");
    let wrapper = fx.script(
        "full-disk-git",
        &format!(
            "if [ \"$1\" = worktree ] && [ \"$2\" = add ] && [ -e {} ]; then\n\
             echo 'fatal: could not create work tree dir: No space left on device' >&2\n\
             exit 128\n\
             fi\n\
             exec git \"$@\"",
            full.display()
        ),
    );
    let mut config = fx.config();
    config.git_binary = wrapper;
    let mut engine = SyncEngine::new(config);
    engine.run_cycle(None).await.expect("A");

    std::fs::write(&full, "").expect("flag");
    let b = fx.remote.commit(&[("page.txt", "v2")], "B");
    let err = engine.run_cycle(None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Resource);
    assert!(err.diagnostics().unwrap_or_default().contains("No space left"));
    assert_eq!(fx.published("page.txt"), "v1");

    std::fs::remove_file(&full).expect("unflag");
    let outcome = engine.run_cycle(None).await.expect("disk freed");
    assert!(!outcome.rebuilt_store);
    assert_eq!(outcome.commit.as_str(), b);
    assert_eq!(fx.published("page.txt"), "v2");
}

#[tokio::test]
async fn partial_worktree_directory_is_rebuilt() {
    let fx = Fixture::new();
    fx.remote.commit(&[("page.txt", "v1")], "A");
    let mut engine = SyncEngine::new(fx.config());
    engine.run_cycle(None).await.expect("first");

    let b = fx.remote.commit(&[("page.txt", "v2")], "B");
    let stale = fx.root.join("worktrees").join(&b);
    std::fs::create_dir_all(&stale).expect("mkdir");
    std::fs::write(stale.join("page.txt"), "half written").expect("write");

    let outcome = engine.run_cycle(None).await.expect("cycle");
    assert_eq!(outcome.key, WorktreeKey::parse(&b).expect("key"));
    assert_eq!(fx.published("page.txt"), "v2");
}

#[tokio::test]
async fn directory_at_link_path_is_replaced_by_rebuild() {
    let fx = Fixture::new();
    fx.remote.commit(&[("page.txt", "v1")], "A");
    let mut engine = SyncEngine::new(fx.config());
    engine.run_cycle(None).await.expect("first");

    let link = fx.root.join("current");
    std::fs::remove_file(&link).expect("unlink");
    std::fs::create_dir(&link).expect("mkdir");
    std::fs::write(link.join("page.txt"), "stray").expect("write");

    let outcome = engine.run_cycle(None).await.expect("recovering cycle");
    assert!(outcome.rebuilt_store);
    assert!(std::fs::symlink_metadata(&link).expect("meta").file_type().is_symlink());
    assert_eq!(fx.published("page.txt"), "v1");
}

#[tokio::test]
async fn store_inside_foreign_repository_is_not_trusted() {
    let fx = Fixture::new();
    fx.remote.commit(&[("page.txt", "v1")], "A");
    // A root that exists, has content, and sits inside another repository.
    let outer = fx.dir.path().join("outer");
    std::fs::create_dir_all(&outer).expect("mkdir");
    git(&outer, &["init", "--quiet"]);
    let root = outer.join("mirror");
    std::fs::create_dir_all(root.join("worktrees")).expect("mkdir");

    let mut config = fx.config();
    config.root = root.clone();
    let mut engine = SyncEngine::new(config);
    let outcome = engine.run_cycle(None).await.expect("cycle");
    assert!(outcome.rebuilt_store);
    assert!(root.join(".git").is_dir());
    assert_eq!(
        std::fs::read_to_string(root.join("current/page.txt")).expect("read"),
        "v1"
    );
}

// ---------------------------------------------------------------------------
// 5. Timeouts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn slow_fetch_times_out_then_recovers() {
    let fx = Fixture::new();
    fx.remote.commit(&[("page.txt", "v1")], "A");
    let wrapper = fx.script(
        "slow-git",
        "if [ \"$1\" = fetch ]; then sleep 3; fi\nexec git \"$@\"",
    );
    let mut config = fx.config();
    config.git_binary = wrapper;
    let mut engine = SyncEngine::new(config);

    let deadline = tokio::time::Instant::now() + Duration::from_millis(1500);
    let err = engine.run_cycle(Some(deadline)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(std::fs::symlink_metadata(fx.root.join("current")).is_err());

    let deadline = tokio::time::Instant::now() + Duration::from_secs(60);
    engine.run_cycle(Some(deadline)).await.expect("generous deadline");
    assert_eq!(fx.published("page.txt"), "v1");
}

// ---------------------------------------------------------------------------
// 6. Retention
// ---------------------------------------------------------------------------

#[tokio::test]
async fn superseded_worktree_kept_during_grace() {
    let fx = Fixture::new();
    let a = fx.remote.commit(&[("page.txt", "v1")], "A");
    let mut engine = SyncEngine::new(fx.config());
    engine.run_cycle(None).await.expect("A");
    fx.remote.commit(&[("page.txt", "v2")], "B");
    engine.run_cycle(None).await.expect("B");

    assert!(fx.root.join("worktrees").join(&a).is_dir());
}

#[tokio::test]
async fn superseded_worktree_pruned_after_grace() {
    let fx = Fixture::new();
    let a = fx.remote.commit(&[("page.txt", "v1")], "A");
    let mut config = fx.config();
    config.stale_worktree_grace = Duration::ZERO;
    let mut engine = SyncEngine::new(config);
    engine.run_cycle(None).await.expect("A");
    fx.remote.commit(&[("page.txt", "v2")], "B");
    engine.run_cycle(None).await.expect("B");

    assert!(!fx.root.join("worktrees").join(&a).exists());
    assert!(!fx
        .root
        .join(".git/gitmirror/worktrees")
        .join(format!("{a}.json"))
        .exists());
    let listed = git(&fx.root, &["worktree", "list", "--porcelain"]);
    assert!(!listed.contains(&a), "metadata pruned: {listed}");
    assert_eq!(fx.published("page.txt"), "v2");
}
