use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use arthvidya_core::test_helpers::TempDir;
use arthvidya_core::{FileStore, StateManager};
use arthvidya_sync::{
    CycleOutcome, GitTransport, PushOutcome, SyncConfig, SyncError, SyncLoop, SyncPhase, Transport,
    tracked_files,
};

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).into_owned()
}

/// A working copy wired to a bare remote, both under one temp dir.
struct Fixture {
    _tmp: TempDir,
    work: std::path::PathBuf,
    remote: std::path::PathBuf,
    config: SyncConfig,
}

impl Fixture {
    async fn new() -> Self {
        let tmp = TempDir::new();
        let work = tmp.path().join("work");
        let remote = tmp.path().join("remote.git");
        std::fs::create_dir_all(&work).unwrap();
        std::fs::create_dir_all(&remote).unwrap();

        git(&remote, &["init", "--bare", "--quiet"]);
        git(&remote, &["symbolic-ref", "HEAD", "refs/heads/main"]);

        let config = SyncConfig {
            repo_dir: work.clone(),
            ..SyncConfig::default()
        };
        let transport = GitTransport::new(&config);
        assert!(transport.ensure_repo().await.unwrap());
        git(&work, &["config", "user.email", "sync@example.invalid"]);
        git(&work, &["config", "user.name", "Arthvidya Sync"]);
        git(&work, &["config", "commit.gpgsign", "false"]);
        transport
            .set_remote(remote.to_str().unwrap())
            .await
            .unwrap();

        Self {
            _tmp: tmp,
            work,
            remote,
            config,
        }
    }

    fn transport(&self) -> GitTransport {
        GitTransport::new(&self.config)
    }

    fn manager(&self) -> StateManager {
        StateManager::new(Arc::new(FileStore::open(&self.work).unwrap()))
    }

    fn remote_log(&self) -> String {
        git(&self.remote, &["log", "--format=%s", "main"])
    }
}

#[tokio::test]
async fn push_commits_and_publishes_documents() {
    if !git_available() {
        eprintln!("git not found, skipping");
        return;
    }
    let fx = Fixture::new().await;
    fx.manager().init_files().unwrap();

    let outcome = fx
        .transport()
        .push(&tracked_files(&fx.work))
        .await
        .unwrap();
    let PushOutcome::Pushed { files, message } = outcome else {
        panic!("expected a push, got {outcome:?}");
    };
    assert_eq!(files.len(), 3);
    assert!(message.starts_with("Auto-sync game state - "));

    let log = fx.remote_log();
    assert_eq!(log.lines().count(), 1);
    assert!(log.starts_with("Auto-sync game state - "));
    let tree = git(&fx.remote, &["ls-tree", "--name-only", "main"]);
    assert!(tree.contains("game_state.json"));
    assert!(tree.contains("player_actions.json"));
    assert!(tree.contains("control_commands.json"));
}

#[tokio::test]
async fn unchanged_documents_do_not_commit() {
    if !git_available() {
        eprintln!("git not found, skipping");
        return;
    }
    let fx = Fixture::new().await;
    fx.manager().init_files().unwrap();

    let mut sync = SyncLoop::new(fx.transport(), tracked_files(&fx.work), &fx.config);
    assert_eq!(sync.run_cycle().await, CycleOutcome::Pushed { files: 3 });
    assert_eq!(sync.run_cycle().await, CycleOutcome::NothingToSync);
    assert_eq!(fx.remote_log().lines().count(), 1);
}

#[tokio::test]
async fn missing_files_are_a_noop() {
    if !git_available() {
        eprintln!("git not found, skipping");
        return;
    }
    let fx = Fixture::new().await;
    let outcome = fx
        .transport()
        .push(&tracked_files(&fx.work))
        .await
        .unwrap();
    assert_eq!(outcome, PushOutcome::NothingToSync);
}

#[tokio::test]
async fn only_changed_files_produce_a_new_commit() {
    if !git_available() {
        eprintln!("git not found, skipping");
        return;
    }
    let fx = Fixture::new().await;
    let manager = fx.manager();
    manager.init_files().unwrap();
    let transport = fx.transport();
    transport.push(&tracked_files(&fx.work)).await.unwrap();

    arthvidya_core::producer::send_command(&manager, "roll_dice").unwrap();
    let outcome = transport.push(&tracked_files(&fx.work)).await.unwrap();
    assert!(matches!(outcome, PushOutcome::Pushed { .. }));
    assert_eq!(fx.remote_log().lines().count(), 2);

    let changed = git(&fx.remote, &["show", "--name-only", "--format=", "main"]);
    assert_eq!(changed.trim(), "control_commands.json");
}

#[tokio::test]
async fn pull_brings_remote_changes_into_the_working_copy() {
    if !git_available() {
        eprintln!("git not found, skipping");
        return;
    }
    let fx = Fixture::new().await;
    fx.manager().init_files().unwrap();
    fx.transport()
        .push(&tracked_files(&fx.work))
        .await
        .unwrap();

    // The other side clones, queues an action and pushes.
    let other = fx._tmp.path().join("other");
    git(
        fx._tmp.path(),
        &["clone", "--quiet", fx.remote.to_str().unwrap(), "other"],
    );
    git(&other, &["config", "user.email", "game@example.invalid"]);
    git(&other, &["config", "user.name", "Game"]);
    git(&other, &["config", "commit.gpgsign", "false"]);
    let other_manager = StateManager::new(Arc::new(FileStore::open(&other).unwrap()));
    arthvidya_core::producer::send_player_action(&other_manager, "T3", "buy_property").unwrap();
    git(&other, &["commit", "--quiet", "-am", "queue action"]);
    git(&other, &["push", "--quiet", "origin", "main"]);

    assert!(fx.manager().load_player_actions().is_empty());
    fx.transport().pull().await.unwrap();
    let actions = fx.manager().load_player_actions();
    assert_eq!(actions["T3"].action, "buy_property");
}

#[tokio::test]
async fn push_to_unreachable_remote_fails_in_publishing() {
    if !git_available() {
        eprintln!("git not found, skipping");
        return;
    }
    let fx = Fixture::new().await;
    fx.manager().init_files().unwrap();
    let transport = fx.transport();
    transport
        .set_remote("/nonexistent/arthvidya-remote.git")
        .await
        .unwrap();

    let err = transport
        .push(&tracked_files(&fx.work))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Command { .. }));
    assert_eq!(err.phase(), Some(SyncPhase::Publishing));

    // The local commit stays and is still pending publication.
    let log = git(&fx.work, &["log", "--format=%s"]);
    assert_eq!(log.lines().count(), 1);
    assert!(transport.has_unpublished_commits().await.unwrap());
}

#[tokio::test]
async fn failed_first_push_is_published_once_remote_returns() {
    if !git_available() {
        eprintln!("git not found, skipping");
        return;
    }
    let fx = Fixture::new().await;
    fx.manager().init_files().unwrap();
    let transport = fx.transport();
    transport
        .set_remote("/nonexistent/arthvidya-remote.git")
        .await
        .unwrap();

    let mut sync = SyncLoop::new(fx.transport(), tracked_files(&fx.work), &fx.config);
    assert!(sync.run_cycle().await.is_failure());
    assert_eq!(sync.status().consecutive_failures, 1);

    transport
        .set_remote(fx.remote.to_str().unwrap())
        .await
        .unwrap();
    assert_eq!(sync.run_cycle().await, CycleOutcome::Pushed { files: 3 });
    assert_eq!(sync.status().consecutive_failures, 0);

    let log = fx.remote_log();
    assert_eq!(log.lines().count(), 1);
    assert!(log.starts_with("Auto-sync game state - "));

    assert_eq!(sync.run_cycle().await, CycleOutcome::NothingToSync);
    assert!(!transport.has_unpublished_commits().await.unwrap());
}

#[tokio::test]
async fn failed_later_push_is_retried_on_next_cycle() {
    if !git_available() {
        eprintln!("git not found, skipping");
        return;
    }
    let fx = Fixture::new().await;
    let manager = fx.manager();
    manager.init_files().unwrap();
    let transport = fx.transport();
    let mut sync = SyncLoop::new(fx.transport(), tracked_files(&fx.work), &fx.config);
    assert_eq!(sync.run_cycle().await, CycleOutcome::Pushed { files: 3 });

    // Move the bare remote away so the push after the next edit fails.
    let parked = fx._tmp.path().join("parked.git");
    std::fs::rename(&fx.remote, &parked).unwrap();
    arthvidya_core::producer::send_command(&manager, "next_turn").unwrap();
    assert!(sync.run_cycle().await.is_failure());
    assert!(transport.has_unpublished_commits().await.unwrap());

    std::fs::rename(&parked, &fx.remote).unwrap();
    assert!(matches!(
        sync.run_cycle().await,
        CycleOutcome::Pushed { .. }
    ));
    assert_eq!(fx.remote_log().lines().count(), 2);
    let changed = git(&fx.remote, &["show", "--name-only", "--format=", "main"]);
    assert_eq!(changed.trim(), "control_commands.json");
    assert_eq!(sync.run_cycle().await, CycleOutcome::NothingToSync);
}

#[tokio::test]
async fn ensure_repo_is_idempotent() {
    if !git_available() {
        eprintln!("git not found, skipping");
        return;
    }
    let fx = Fixture::new().await;
    assert!(!fx.transport().ensure_repo().await.unwrap());
    let status = fx.transport().status().await.unwrap();
    assert!(status.is_empty());
}
