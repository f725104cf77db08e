// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal-multiplexer hosting for managed services.
//!
//! Each service runs in a detached tmux session named `claudia-<service>`,
//! so it survives supervisor restarts and stays inspectable by hand.

use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Timeout for tmux commands.
const TMUX_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum TmuxError {
    #[error("tmux spawn failed: {0}")]
    SpawnFailed(String),

    #[error("tmux command failed: {0}")]
    CommandFailed(String),

    #[error("tmux timed out")]
    Timeout,
}

async fn run_tmux(args: &[&str]) -> Result<std::process::Output, TmuxError> {
    let mut cmd = Command::new("tmux");
    cmd.args(args);
    tokio::time::timeout(TMUX_TIMEOUT, cmd.output())
        .await
        .map_err(|_| TmuxError::Timeout)?
        .map_err(|e| TmuxError::CommandFailed(e.to_string()))
}

/// Tmux-backed service host.
#[derive(Clone, Default)]
pub struct TmuxSessions;

impl TmuxSessions {
    pub fn new() -> Self {
        Self
    }

    fn session_id(name: &str) -> String {
        format!("claudia-{name}")
    }

    /// Start `cmd` detached in a fresh session, replacing a stale one.
    pub async fn spawn(&self, name: &str, cwd: &Path, cmd: &str) -> Result<String, TmuxError> {
        if !cwd.exists() {
            return Err(TmuxError::SpawnFailed(format!(
                "working directory does not exist: {}",
                cwd.display()
            )));
        }
        let session_id = Self::session_id(name);

        if self.is_alive(&session_id).await? {
            tracing::warn!(session_id, "session already exists, killing first");
            let _ = run_tmux(&["kill-session", "-t", &session_id]).await;
        }

        let cwd = cwd.display().to_string();
        let output = run_tmux(&[
            "new-session",
            "-d",
            "-s",
            &session_id,
            "-c",
            &cwd,
            cmd,
        ])
        .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TmuxError::SpawnFailed(stderr.to_string()));
        }
        Ok(session_id)
    }

    pub async fn is_alive(&self, session_id: &str) -> Result<bool, TmuxError> {
        let output = run_tmux(&["has-session", "-t", session_id]).await?;
        Ok(output.status.success())
    }

    pub async fn kill(&self, session_id: &str) -> Result<(), TmuxError> {
        let output = run_tmux(&["kill-session", "-t", session_id]).await?;
        if !output.status.success() {
            return Err(TmuxError::CommandFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }
        Ok(())
    }

    /// Capture the last `lines` of a session's pane.
    pub async fn capture_output(&self, session_id: &str, lines: u32) -> Result<String, TmuxError> {
        let start = format!("-{lines}");
        let output = run_tmux(&["capture-pane", "-t", session_id, "-p", "-S", &start]).await?;
        if !output.status.success() {
            return Err(TmuxError::CommandFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
#[path = "tmux_tests.rs"]
mod tests;
