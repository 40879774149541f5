use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kitguard_core::{
    CheckpointManager, KitError, RestoreMode, RollbackFailure, RollbackState,
};
use kitguard_git::{GitError, VcsClient};
use kitguard_logging::{LogFormat, Logger};
use tempfile::TempDir;

/// Records every argv and answers from per-verb scripts (default: empty stdout).
#[derive(Default)]
struct FakeVcs {
    calls: Mutex<Vec<Vec<String>>>,
    scripts: Mutex<HashMap<String, VecDeque<Result<String, String>>>>,
}

impl FakeVcs {
    fn respond(&self, verb: &str, response: Result<&str, &str>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(verb.to_string())
            .or_default()
            .push_back(response.map(String::from).map_err(String::from));
    }

    fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    fn verbs(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c[0].clone()).collect()
    }
}

#[async_trait]
impl VcsClient for FakeVcs {
    async fn run(&self, args: &[&str]) -> Result<String, GitError> {
        self.calls
            .lock()
            .unwrap()
            .push(args.iter().map(|a| a.to_string()).collect());

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(args[0])
            .and_then(|queue| queue.pop_front());

        match scripted {
            Some(Ok(stdout)) => Ok(stdout),
            Some(Err(stderr)) => Err(GitError::CommandFailed {
                command: format!("git {}", args.join(" ")),
                stderr,
                exit_code: Some(1),
            }),
            None => Ok(String::new()),
        }
    }
}

fn manager() -> (Arc<FakeVcs>, CheckpointManager) {
    let vcs = Arc::new(FakeVcs::default());
    let manager = CheckpointManager::new(vcs.clone(), Arc::new(Logger::disabled()));
    (vcs, manager)
}

// ============================================================
// create
// ============================================================

#[tokio::test]
async fn test_create_stages_commits_and_tags() {
    let (vcs, manager) = manager();
    vcs.respond("status", Ok("M  src/lib.rs\n?? new.rs\n"));

    let created = manager.create(Some("before refactor")).await.unwrap();

    assert!(created.id.as_str().starts_with("kit-"));
    assert!(created.id.as_str().ends_with("-before-refactor"));
    assert!(created.committed);
    assert!(created.message().contains("Checkpoint created"));
    assert!(created.message().contains(created.id.as_str()));

    let calls = vcs.calls();
    assert_eq!(calls[0], vec!["add", "-A"]);
    assert_eq!(calls[1], vec!["status", "--porcelain"]);
    assert_eq!(calls[2][0], "commit");
    assert_eq!(calls[3], vec!["tag".to_string(), created.id.to_string()]);
}

#[tokio::test]
async fn test_create_with_clean_tree_only_tags() {
    let (vcs, manager) = manager();

    let created = manager.create(None).await.unwrap();

    assert!(!created.committed);
    assert_eq!(vcs.verbs(), vec!["add", "status", "tag"]);
    assert!(created.message().contains("no changes"));
}

#[tokio::test]
async fn test_create_label_cannot_inject_arguments() {
    let (vcs, manager) = manager();

    let created = manager.create(Some("x; rm -rf / $(id)")).await.unwrap();

    assert!(created.id.as_str().ends_with("-x-rm-rf-id"));
    let tag_call = vcs.calls().pop().unwrap();
    assert_eq!(tag_call.len(), 2);
}

#[tokio::test]
async fn test_create_surfaces_git_failure() {
    let (vcs, manager) = manager();
    vcs.respond("add", Err("fatal: not a git repository"));

    let result = manager.create(Some("x")).await;

    assert!(matches!(result, Err(KitError::Vcs(_))));
    assert_eq!(vcs.verbs(), vec!["add"]);
}

// ============================================================
// list
// ============================================================

#[tokio::test]
async fn test_list_newest_first() {
    let (vcs, manager) = manager();
    vcs.respond(
        "tag",
        Ok("kit-2024-01-01T00-00-00-000Z\nkit-2024-03-01T00-00-00-000Z-b\nv1.0\nkit-v1.0\nkit-latest\nkit-2024-02-01T00-00-00-000Z-a\n"),
    );

    let ids = manager.list().await.unwrap();
    let ids: Vec<&str> = ids.iter().map(|id| id.as_str()).collect();

    assert_eq!(
        ids,
        vec![
            "kit-2024-03-01T00-00-00-000Z-b",
            "kit-2024-02-01T00-00-00-000Z-a",
            "kit-2024-01-01T00-00-00-000Z",
        ]
    );
    assert_eq!(vcs.calls()[0], vec!["tag", "--list", "kit-*"]);
}

#[tokio::test]
async fn test_list_empty() {
    let (_vcs, manager) = manager();
    assert!(manager.list().await.unwrap().is_empty());
    assert!(manager.latest().await.unwrap().is_none());
}

// ============================================================
// restore
// ============================================================

#[tokio::test]
async fn test_restore_rejects_invalid_ids_before_git() {
    let (vcs, manager) = manager();

    for bad in ["main", "../kit-x", "kit-x;reboot", "kit-", "-b evil"] {
        let result = manager.restore(bad, true).await;
        assert!(matches!(result, Err(KitError::Validation { .. })), "{}", bad);
    }

    assert!(vcs.calls().is_empty());
}

#[tokio::test]
async fn test_restore_on_branch() {
    let (vcs, manager) = manager();

    let outcome = manager
        .restore("kit-2024-01-01T00-00-00-test", true)
        .await
        .unwrap();

    assert_eq!(
        outcome.mode,
        RestoreMode::Branch("kitguard/restore-2024-01-01T00-00-00-test".to_string())
    );
    assert!(outcome.message().contains("branch"));
    assert_eq!(
        vcs.calls().last().unwrap(),
        &vec![
            "checkout",
            "-b",
            "kitguard/restore-2024-01-01T00-00-00-test",
            "kit-2024-01-01T00-00-00-test"
        ]
    );
}

#[tokio::test]
async fn test_restore_detached() {
    let (vcs, manager) = manager();

    let outcome = manager
        .restore("kit-2024-01-01T00-00-00-test", false)
        .await
        .unwrap();

    assert_eq!(outcome.mode, RestoreMode::Detached);
    assert!(outcome.message().contains("DETACHED HEAD"));
    assert_eq!(vcs.verbs(), vec!["rev-parse", "status", "checkout"]);
    assert_eq!(
        vcs.calls().last().unwrap(),
        &vec!["checkout", "--detach", "kit-2024-01-01T00-00-00-test"]
    );
}

#[tokio::test]
async fn test_restore_on_branch_checks_branch_and_tree_first() {
    let (vcs, manager) = manager();

    manager
        .restore("kit-2024-01-01T00-00-00-000Z", true)
        .await
        .unwrap();

    let calls = vcs.calls();
    assert_eq!(
        calls[1],
        vec![
            "rev-parse",
            "--verify",
            "--quiet",
            "refs/heads/kitguard/restore-2024-01-01T00-00-00-000Z"
        ]
    );
    assert_eq!(calls[2], vec!["status", "--porcelain"]);
    assert_eq!(calls[3][0], "checkout");
}

#[tokio::test]
async fn test_restore_refuses_dirty_tree() {
    let (vcs, manager) = manager();
    vcs.respond("status", Ok(" M src/lib.rs\n?? scratch.txt\n"));

    let result = manager.restore("kit-2024-01-01T00-00-00-000Z", false).await;

    match result {
        Err(KitError::DirtyTree { files }) => {
            assert_eq!(files, vec!["src/lib.rs", "scratch.txt"]);
        }
        other => panic!("expected dirty tree error, got {:?}", other),
    }
    assert!(!vcs.verbs().contains(&"checkout".to_string()));
}

#[tokio::test]
async fn test_restore_refuses_existing_restore_branch() {
    let (vcs, manager) = manager();
    vcs.respond("rev-parse", Ok("3f2a9c1e\n"));
    vcs.respond("rev-parse", Ok("3f2a9c1e\n"));

    let result = manager.restore("kit-2024-01-01T00-00-00-000Z", true).await;

    match result {
        Err(KitError::Validation { field, reason }) => {
            assert_eq!(field, "createBranch");
            assert!(reason.contains("kitguard/restore-2024-01-01T00-00-00-000Z"));
            assert!(reason.contains("already exists"));
        }
        other => panic!("expected validation error, got {:?}", other),
    }
    assert_eq!(vcs.verbs(), vec!["rev-parse", "rev-parse"]);
}

#[tokio::test]
async fn test_restore_missing_tag_is_not_found() {
    let (vcs, manager) = manager();
    vcs.respond("rev-parse", Err(""));

    let result = manager.restore("kit-missing", false).await;

    assert!(matches!(result, Err(KitError::NotFound { .. })));
    assert_eq!(vcs.verbs(), vec!["rev-parse"]);
}

#[tokio::test]
async fn test_restore_checkout_failure_is_error() {
    let (vcs, manager) = manager();
    vcs.respond(
        "checkout",
        Err("error: Your local changes would be overwritten by checkout"),
    );

    let result = manager.restore("kit-a", false).await;
    assert!(matches!(result, Err(KitError::Vcs(_))));
}

// ============================================================
// auto_rollback
// ============================================================

#[tokio::test]
async fn test_rollback_picks_newest_checkpoint() {
    let (vcs, manager) = manager();
    vcs.respond(
        "tag",
        Ok("kit-2024-01-01T00-00-00-000Z\nkit-2024-03-01T00-00-00-000Z\nkit-2024-02-01T00-00-00-000Z\n"),
    );

    let report = manager.auto_rollback("tests failed", None).await;

    assert!(report.is_done());
    assert!(report.message().contains("kit-2024-03-01T00-00-00-000Z"));
    assert!(report.message().contains("tests failed"));
    assert_eq!(
        vcs.calls().last().unwrap(),
        &vec!["checkout", "--detach", "kit-2024-03-01T00-00-00-000Z"]
    );
}

#[tokio::test]
async fn test_rollback_without_checkpoints_does_not_restore() {
    let (vcs, manager) = manager();

    let report = manager.auto_rollback("build broke", None).await;

    assert!(report.is_no_checkpoint());
    assert!(report.message().contains("No checkpoint"));
    assert_eq!(vcs.verbs(), vec!["tag"]);
}

#[tokio::test]
async fn test_rollback_with_explicit_id_skips_selection() {
    let (vcs, manager) = manager();

    let report = manager
        .auto_rollback("manual", Some("kit-2024-01-01T00-00-00-test"))
        .await;

    assert!(report.is_done());
    assert_eq!(vcs.verbs(), vec!["rev-parse", "status", "checkout"]);
}

#[tokio::test]
async fn test_rollback_restore_failure_reports_failed() {
    let (vcs, manager) = manager();
    vcs.respond("tag", Ok("kit-2024-01-01T00-00-00-000Z\n"));
    vcs.respond("checkout", Err("checkout failed"));

    let report = manager.auto_rollback("test", None).await;

    assert!(!report.is_done());
    assert!(report.message().contains("failed"));
    assert!(matches!(
        report.state,
        RollbackState::Failed {
            failure: RollbackFailure::Restore { .. }
        }
    ));
}

#[tokio::test]
async fn test_rollback_ignores_foreign_prefixed_tags() {
    let (vcs, manager) = manager();
    vcs.respond(
        "tag",
        Ok("kit-2024-01-01T00-00-00-000Z-safe\nkit-v1.0\nkit-zzz\n"),
    );

    let report = manager.auto_rollback("tests failed", None).await;

    assert!(report.is_done(), "{}", report.message());
    assert_eq!(
        vcs.calls().last().unwrap(),
        &vec!["checkout", "--detach", "kit-2024-01-01T00-00-00-000Z-safe"]
    );
}

#[tokio::test]
async fn test_rollback_with_only_foreign_tags_finds_nothing() {
    let (vcs, manager) = manager();
    vcs.respond("tag", Ok("kit-v1.0\nkit-release\n"));

    let report = manager.auto_rollback("tests failed", None).await;

    assert!(report.is_no_checkpoint());
    assert_eq!(vcs.verbs(), vec!["tag"]);
}

#[tokio::test]
async fn test_rollback_with_dirty_tree_fails() {
    let (vcs, manager) = manager();
    vcs.respond("tag", Ok("kit-2024-01-01T00-00-00-000Z\n"));
    vcs.respond("status", Ok(" M a.txt\n"));

    let report = manager.auto_rollback("tests failed", None).await;

    assert!(!report.is_done());
    assert!(report.message().contains("failed"));
    assert!(report.message().contains("a.txt"));
    assert!(!vcs.verbs().contains(&"checkout".to_string()));
}

#[tokio::test]
async fn test_rollback_invalid_explicit_id_runs_nothing() {
    let (vcs, manager) = manager();

    let report = manager.auto_rollback("test", Some("HEAD~3")).await;

    assert!(report.message().contains("failed"));
    assert!(vcs.calls().is_empty());
}

#[tokio::test]
async fn test_rollback_is_audited() {
    let dir = TempDir::new().unwrap();
    let audit = dir.path().join("audit.log");
    let vcs = Arc::new(FakeVcs::default());
    vcs.respond("tag", Ok("kit-2024-05-01T12-00-00-000Z-only\n"));
    let logger = Arc::new(Logger::with_file(LogFormat::Silent, &audit).unwrap());
    let manager = CheckpointManager::new(vcs, logger);

    manager.auto_rollback("lint failed", None).await;

    let log = std::fs::read_to_string(&audit).unwrap();
    let events: Vec<serde_json::Value> = log
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let names: Vec<&str> = events.iter().map(|e| e["event"].as_str().unwrap()).collect();

    assert_eq!(
        names,
        vec!["rollback_started", "checkpoint_restored", "rollback_completed"]
    );
    assert_eq!(events[2]["id"], "kit-2024-05-01T12-00-00-000Z-only");
    assert_eq!(events[2]["reason"], "lint failed");
}
