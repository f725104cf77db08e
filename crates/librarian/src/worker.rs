// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The librarian worker loop.
//!
//! One background task services the conversation queue. At most one
//! conversation is `processing` across the system: the queue pop refuses
//! to hand out work while another row holds that status, which also guards
//! against dual workers after a restart. The worker holds no locks while
//! awaiting the agent.

use crate::git;
use crate::transcript::{
    commit_message, context_block, format_transcript, parse_reply, ReplyOutcome,
};
use async_trait::async_trait;
use claudia_core::{Clock, Conversation, ConversationId, RpcError, SessionId};
use claudia_store::{ConversationUpdate, Store};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tracing::{debug, info, warn};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct LibrarianConfig {
    /// Idle poll interval when nothing is queued.
    pub interval: Duration,
    /// Conversations queued per `memory.process` wake.
    pub batch_size: usize,
    /// Conversations with fewer entries are skipped.
    pub min_entries: usize,
    /// Formatted transcripts above this are skipped.
    pub max_transcript_bytes: usize,
    /// Archived conversations of the same file supplied as context.
    pub context_conversations: usize,
    /// How long to wait for the agent's reply.
    pub reply_timeout: Duration,
    /// The private workspace the worker's sessions run in.
    pub workspace_cwd: PathBuf,
    /// Version-controlled directory the agent writes artifacts into.
    pub artifact_dir: PathBuf,
    /// Role prompt prefixed to every job session.
    pub system_prompt: String,
}

impl Default for LibrarianConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            batch_size: 5,
            min_entries: 2,
            max_transcript_bytes: 100 * 1024,
            context_conversations: 2,
            reply_timeout: Duration::from_secs(5 * 60),
            workspace_cwd: PathBuf::from("."),
            artifact_dir: PathBuf::from("."),
            system_prompt: "You are the librarian. Read the transcript and either reply \
                            SKIP: <reason> or write notes under the archive and reply \
                            SUMMARY: <one line>."
                .to_string(),
        }
    }
}

/// The slice of the gateway the worker needs: open a dedicated session,
/// exchange one long prompt for one reply, close.
#[async_trait]
pub trait AgentGateway: Send + Sync + 'static {
    async fn open_session(&self, cwd: &str, system_prompt: &str) -> Result<SessionId, RpcError>;

    /// Send `content` and wait (up to `timeout`) for the assistant's full
    /// reply text.
    async fn ask(
        &self,
        session_id: &SessionId,
        content: String,
        timeout: Duration,
    ) -> Result<String, RpcError>;

    async fn close_session(&self, session_id: &SessionId);
}

/// Handle for waking and stopping the worker.
pub struct LibrarianHandle {
    wake: Arc<Notify>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl LibrarianHandle {
    /// Cancel the worker's sleep so it polls immediately.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// The background worker.
pub struct LibrarianWorker<C: Clock> {
    store: Arc<Store>,
    gateway: Arc<dyn AgentGateway>,
    config: LibrarianConfig,
    clock: C,
    wake: Arc<Notify>,
}

impl<C: Clock> LibrarianWorker<C> {
    pub fn new(
        store: Arc<Store>,
        gateway: Arc<dyn AgentGateway>,
        config: LibrarianConfig,
        clock: C,
    ) -> Self {
        Self {
            store,
            gateway,
            config,
            clock,
            wake: Arc::new(Notify::new()),
        }
    }

    /// Queue up to `batch_size` ready conversations and wake the worker.
    /// This is the `memory.process` entrypoint. Returns the queued ids.
    pub fn process_ready(&self) -> Result<Vec<ConversationId>, claudia_store::StoreError> {
        let queued = self
            .store
            .conversations_queue_ready(self.config.batch_size, self.clock.now_ms())?;
        if !queued.is_empty() {
            info!(queued = queued.len(), "conversations queued for the librarian");
        }
        self.wake.notify_one();
        Ok(queued)
    }

    /// Spawn the worker loop. The worker stays shared so `memory.process`
    /// can keep queueing through it.
    pub fn spawn(self: &Arc<Self>) -> LibrarianHandle {
        let worker = Arc::clone(self);
        let wake = Arc::clone(&self.wake);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        tokio::spawn(async move {
            loop {
                // Drain everything available, then sleep until woken.
                loop {
                    match worker.step().await {
                        Ok(true) => continue,
                        Ok(false) => break,
                        Err(e) => {
                            warn!(error = %e, "librarian step failed");
                            break;
                        }
                    }
                }
                tokio::select! {
                    _ = worker.wake.notified() => {}
                    _ = tokio::time::sleep(worker.config.interval) => {}
                    _ = &mut shutdown_rx => {
                        debug!("librarian shutting down");
                        return;
                    }
                }
            }
        });
        LibrarianHandle {
            wake,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Process at most one conversation. Returns whether one was handled.
    pub async fn step(&self) -> Result<bool, claudia_store::StoreError> {
        // The pop refuses to hand out work while another conversation is
        // processing (including a stuck row from before a restart).
        let Some(conversation) = self.store.conversation_pop_queued(self.clock.now_ms())? else {
            return Ok(false);
        };
        let id = conversation.id.clone();
        debug!(conversation_id = %id, source_file = %conversation.source_file, "processing");

        match self.process(&conversation).await {
            Ok(()) => {}
            Err(e) => {
                // Any failure is a rollback, never a dead worker.
                warn!(conversation_id = %id, error = %e, "job failed, requeueing");
                let _ = self.store.conversation_requeue(&id, self.clock.now_ms());
            }
        }
        Ok(true)
    }

    async fn process(&self, conversation: &Conversation) -> Result<(), JobError> {
        let entries = self.store.conversation_entries(conversation)?;

        // Skip rules come before any session is created.
        if entries.is_empty() {
            self.skip(conversation, "no entries found").await?;
            return Ok(());
        }
        if entries.len() < self.config.min_entries {
            self.skip(conversation, "below entry threshold").await?;
            return Ok(());
        }
        let transcript = format_transcript(&entries);
        if transcript.len() > self.config.max_transcript_bytes {
            self.skip(
                conversation,
                &format!(
                    "transcript size {} exceeds ceiling {}",
                    transcript.len(),
                    self.config.max_transcript_bytes
                ),
            )
            .await?;
            return Ok(());
        }

        let previous = self.store.conversations_recent_archived(
            &conversation.source_file,
            self.config.context_conversations,
        )?;
        let content = format!("{}{}", context_block(&previous), transcript);

        // Fresh session per job, always closed afterwards.
        let session_id = self
            .gateway
            .open_session(
                &self.config.workspace_cwd.to_string_lossy(),
                &self.config.system_prompt,
            )
            .await
            .map_err(JobError::Gateway)?;
        let reply = self
            .gateway
            .ask(&session_id, content, self.config.reply_timeout)
            .await;
        self.gateway.close_session(&session_id).await;
        let reply = reply.map_err(JobError::Gateway)?;

        match parse_reply(&reply) {
            ReplyOutcome::Skip { reason } => {
                self.skip(conversation, &reason).await?;
            }
            ReplyOutcome::Summary { summary } => {
                let message = commit_message(conversation.id.as_str(), &summary);
                let files = git::commit_artifacts(&self.config.artifact_dir, &message).await?;
                let update = ConversationUpdate {
                    summary: Some(summary),
                    files_written: if files.is_empty() {
                        None
                    } else {
                        Some(files.join("\n"))
                    },
                    metadata: None,
                };
                self.store
                    .conversation_mark_archived(&conversation.id, &update, self.clock.now_ms())?;
                info!(conversation_id = %conversation.id, files = files.len(), "archived");
            }
        }
        Ok(())
    }

    async fn skip(&self, conversation: &Conversation, reason: &str) -> Result<(), JobError> {
        info!(conversation_id = %conversation.id, reason, "skipped");
        self.store
            .conversation_mark_skipped(&conversation.id, reason, self.clock.now_ms())?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
enum JobError {
    #[error(transparent)]
    Store(#[from] claudia_store::StoreError),

    #[error("gateway error: {0}")]
    Gateway(RpcError),

    #[error(transparent)]
    Git(#[from] git::GitError),
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
