// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Launching agent child processes.
//!
//! The launcher is the seam between the manager and the external agent
//! CLI: production spawns the real binary speaking line-delimited JSON on
//! stdio; tests script a fake. A launched child is a pair of channels plus
//! an abort hook.

use async_trait::async_trait;
use claudia_core::AgentEvent;
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Errors from launching or speaking to a child.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to spawn agent process: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("agent binary not configured")]
    NotConfigured,
}

/// Everything needed to start (or resume) one agent child.
#[derive(Debug, Clone, Default)]
pub struct LaunchSpec {
    pub session_id: String,
    pub cwd: String,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub thinking: Option<bool>,
    pub effort: Option<String>,
    pub permission_mode: Option<String>,
    /// Resume an existing external session rather than creating one.
    pub resume: bool,
}

/// Inputs pushed to a running child over its message channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChildInput {
    User { content: String },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
    PermissionMode { mode: String },
}

/// A running child: push inputs, pull events, fire `abort_tx` to kill.
pub struct ChildHandle {
    pub input_tx: mpsc::Sender<ChildInput>,
    pub event_rx: mpsc::Receiver<AgentEvent>,
    pub abort_tx: oneshot::Sender<()>,
}

impl ChildHandle {
    pub fn new(
        input_tx: mpsc::Sender<ChildInput>,
        event_rx: mpsc::Receiver<AgentEvent>,
        abort_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            input_tx,
            event_rx,
            abort_tx,
        }
    }

    /// Take the handle apart for a session to own piecewise.
    pub fn split(
        self,
    ) -> (
        mpsc::Sender<ChildInput>,
        mpsc::Receiver<AgentEvent>,
        oneshot::Sender<()>,
    ) {
        (self.input_tx, self.event_rx, self.abort_tx)
    }
}

/// Creates agent children.
#[async_trait]
pub trait AgentLauncher: Send + Sync + 'static {
    async fn launch(&self, spec: &LaunchSpec) -> Result<ChildHandle, LaunchError>;
}

/// Spawns the external agent CLI with stream-JSON stdio.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    pub program: PathBuf,
    /// Arguments prepended before the generated ones.
    pub base_args: Vec<String>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
        }
    }

    fn build_command(&self, spec: &LaunchSpec) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.base_args);
        cmd.arg("--input-format").arg("stream-json");
        cmd.arg("--output-format").arg("stream-json");
        if spec.resume {
            cmd.arg("--resume").arg(&spec.session_id);
        } else {
            cmd.arg("--session-id").arg(&spec.session_id);
        }
        if let Some(model) = &spec.model {
            cmd.arg("--model").arg(model);
        }
        if let Some(prompt) = &spec.system_prompt {
            cmd.arg("--append-system-prompt").arg(prompt);
        }
        if let Some(effort) = &spec.effort {
            cmd.arg("--effort").arg(effort);
        }
        if spec.thinking == Some(false) {
            cmd.arg("--no-thinking");
        }
        if let Some(mode) = &spec.permission_mode {
            cmd.arg("--permission-mode").arg(mode);
        }
        cmd.current_dir(&spec.cwd);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::null());
        cmd.kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl AgentLauncher for ProcessLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> Result<ChildHandle, LaunchError> {
        let mut child = self.build_command(spec).spawn()?;
        let stdin = child.stdin.take().ok_or(LaunchError::NotConfigured)?;
        let stdout = child.stdout.take().ok_or(LaunchError::NotConfigured)?;

        let (input_tx, mut input_rx) = mpsc::channel::<ChildInput>(32);
        let (event_tx, event_rx) = mpsc::channel::<AgentEvent>(256);
        let (abort_tx, mut abort_rx) = oneshot::channel::<()>();

        // Writer: serialize inputs as JSON lines. The channel closing ends
        // the child's stdin, which is its signal to finish up.
        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(input) = input_rx.recv().await {
                let Ok(mut line) = serde_json::to_vec(&input) else {
                    continue;
                };
                line.push(b'\n');
                if stdin.write_all(&line).await.is_err() {
                    break;
                }
                if stdin.flush().await.is_err() {
                    break;
                }
            }
        });

        // Reader: one JSON event per line. Unparseable lines are skipped so
        // a newer child cannot wedge the stream. The abort signal kills the
        // process, which ends the read loop.
        let session_id = spec.session_id.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                tokio::select! {
                    _ = &mut abort_rx => {
                        debug!(session_id, "abort requested, killing child");
                        let _ = child.start_kill();
                        break;
                    }
                    line = lines.next_line() => {
                        match line {
                            Ok(Some(line)) => {
                                let trimmed = line.trim();
                                if trimmed.is_empty() {
                                    continue;
                                }
                                match serde_json::from_str::<AgentEvent>(trimmed) {
                                    Ok(event) => {
                                        if event_tx.send(event).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(e) => {
                                        debug!(session_id, error = %e, "skipping unparseable line");
                                    }
                                }
                            }
                            Ok(None) => break,
                            Err(e) => {
                                warn!(session_id, error = %e, "child stream read error");
                                break;
                            }
                        }
                    }
                }
            }
            let _ = child.wait().await;
            // event_tx drops here; the session reader observes the close.
        });

        Ok(ChildHandle::new(input_tx, event_rx, abort_tx))
    }
}

#[cfg(test)]
#[path = "launcher_tests.rs"]
mod tests;
