// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Version-control plumbing for the artifact directory.
//!
//! The worker serializes artifact writes (one job at a time), so these
//! helpers can assume exclusive use of the work tree.

use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Timeout for individual git commands.
const GIT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum GitError {
    #[error("git {command} failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("git {command} timed out after {}s", GIT_TIMEOUT.as_secs())]
    Timeout { command: String },

    #[error("io error running git: {0}")]
    Io(#[from] std::io::Error),
}

async fn run_git(dir: &Path, args: &[&str]) -> Result<String, GitError> {
    let command = args.join(" ");
    let mut cmd = Command::new("git");
    cmd.arg("-C").arg(dir).args(args);
    let output = tokio::time::timeout(GIT_TIMEOUT, cmd.output())
        .await
        .map_err(|_| GitError::Timeout {
            command: command.clone(),
        })??;
    if !output.status.success() {
        return Err(GitError::Command {
            command,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Stage and commit every change under `dir`.
///
/// Returns the list of changed paths; an empty list means nothing changed
/// and no commit was made.
pub async fn commit_artifacts(dir: &Path, message: &str) -> Result<Vec<String>, GitError> {
    run_git(dir, &["add", "-A"]).await?;

    let status = run_git(dir, &["status", "--porcelain"]).await?;
    let changed: Vec<String> = status
        .lines()
        .filter_map(|line| line.get(3..))
        .map(str::to_string)
        .filter(|p| !p.is_empty())
        .collect();
    if changed.is_empty() {
        return Ok(Vec::new());
    }

    run_git(dir, &["commit", "-m", message]).await?;
    Ok(changed)
}

/// Initialize a repository if `dir` is not already inside one.
pub async fn ensure_repo(dir: &Path) -> Result<(), GitError> {
    if run_git(dir, &["rev-parse", "--git-dir"]).await.is_ok() {
        return Ok(());
    }
    run_git(dir, &["init"]).await?;
    Ok(())
}

#[cfg(test)]
#[path = "git_tests.rs"]
mod tests;
