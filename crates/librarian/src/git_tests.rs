// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

async fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .await
        .unwrap();
    assert!(
        output.status.success(),
        "git {args:?}: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

async fn repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    git(dir.path(), &["init", "-q"]).await;
    git(dir.path(), &["config", "user.email", "librarian@localhost"]).await;
    git(dir.path(), &["config", "user.name", "librarian"]).await;
    dir
}

#[tokio::test]
async fn commits_changes_and_reports_paths() {
    let dir = repo().await;
    std::fs::write(dir.path().join("notes.md"), "remember this\n").unwrap();
    std::fs::create_dir(dir.path().join("topics")).unwrap();
    std::fs::write(dir.path().join("topics/auth.md"), "auth notes\n").unwrap();

    let changed = commit_artifacts(dir.path(), "librarian(c1): two notes")
        .await
        .unwrap();
    let mut changed = changed;
    changed.sort();
    assert_eq!(changed, ["notes.md", "topics/auth.md"]);

    // Work tree is clean after the commit.
    let changed = commit_artifacts(dir.path(), "librarian(c1): nothing")
        .await
        .unwrap();
    assert!(changed.is_empty());
}

#[tokio::test]
async fn no_changes_means_no_commit() {
    let dir = repo().await;
    let changed = commit_artifacts(dir.path(), "librarian(c1): empty").await.unwrap();
    assert!(changed.is_empty());
}

#[tokio::test]
async fn modified_files_are_committed_too() {
    let dir = repo().await;
    std::fs::write(dir.path().join("notes.md"), "v1\n").unwrap();
    commit_artifacts(dir.path(), "librarian(c1): v1").await.unwrap();

    std::fs::write(dir.path().join("notes.md"), "v2\n").unwrap();
    let changed = commit_artifacts(dir.path(), "librarian(c2): v2").await.unwrap();
    assert_eq!(changed, ["notes.md"]);
}

#[tokio::test]
async fn ensure_repo_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    ensure_repo(dir.path()).await.unwrap();
    assert!(dir.path().join(".git").exists());
    ensure_repo(dir.path()).await.unwrap();
}

#[tokio::test]
async fn commit_outside_a_repo_fails_loudly() {
    let dir = tempfile::tempdir().unwrap();
    let err = commit_artifacts(dir.path(), "librarian(c1): nope")
        .await
        .unwrap_err();
    assert!(matches!(err, GitError::Command { .. }), "got {err:?}");
}
