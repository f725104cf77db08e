// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent session manager.
//!
//! Sessions wrap a lazily spawned child process; multiple turns share one
//! long-lived child fed through a push-based input channel. The manager
//! republishes child events unchanged as `sse.*` bus events, synthesizes
//! lifecycle events, keeps streams well-bracketed through interrupts, and
//! auto-answers interactive tools after `message_stop`.

use crate::interactive::mode_bypasses;
use crate::journal::SessionJournal;
use crate::launcher::{AgentLauncher, ChildInput, LaunchError, LaunchSpec};
use crate::projector::{ToolDecision, TurnTracker};
use claudia_core::{BusEvent, Clock, ErrorKind, RpcError, SessionId};
use claudia_store::{Store, StoreError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Default staleness window: five minutes without an event.
pub const DEFAULT_STALE_AFTER_MS: i64 = 5 * 60 * 1000;

/// Errors surfaced by manager operations.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("missing context: {0}")]
    MissingContext(String),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<AgentError> for RpcError {
    fn from(err: AgentError) -> Self {
        match &err {
            AgentError::MissingContext(msg) => {
                RpcError::new(ErrorKind::MissingContext, msg.clone())
            }
            AgentError::Launch(e) => RpcError::new(ErrorKind::ExternalFailure, e.to_string()),
            AgentError::Store(e) => RpcError::from(match e {
                StoreError::Busy(m) => StoreError::Busy(m.clone()),
                other => StoreError::Conflict(other.to_string()),
            }),
        }
    }
}

/// Manager-level defaults applied to sessions that do not override them.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub default_model: Option<String>,
    pub default_thinking: Option<bool>,
    pub default_effort: Option<String>,
    pub stale_after_ms: i64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            default_model: None,
            default_thinking: None,
            default_effort: None,
            stale_after_ms: DEFAULT_STALE_AFTER_MS,
        }
    }
}

/// Health view of one live session.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub cwd: String,
    pub running: bool,
    pub last_event_ms: i64,
    pub stale: bool,
}

struct SessionInner {
    id: SessionId,
    spec: LaunchSpec,
    tracker: Mutex<TurnTracker>,
    input_tx: Mutex<Option<mpsc::Sender<ChildInput>>>,
    abort_tx: Mutex<Option<oneshot::Sender<()>>>,
    permission_mode: Mutex<Option<String>>,
    /// Serializes concurrent first-prompt launches.
    launch_lock: tokio::sync::Mutex<()>,
    /// Once a child has run, later launches resume the external session.
    ran_before: AtomicBool,
    /// Bumped per launch; a stale reader must not touch newer state.
    generation: std::sync::atomic::AtomicU64,
    abort_requested: AtomicBool,
    closing: AtomicBool,
    last_event_ms: AtomicI64,
}

/// Owns the set of live agent sessions.
pub struct SessionManager<C: Clock> {
    launcher: Arc<dyn AgentLauncher>,
    store: Arc<Store>,
    sink: mpsc::Sender<BusEvent>,
    journal: Option<SessionJournal>,
    config: ManagerConfig,
    clock: C,
    sessions: Mutex<HashMap<SessionId, Arc<SessionInner>>>,
}

impl<C: Clock> SessionManager<C> {
    pub fn new(
        launcher: Arc<dyn AgentLauncher>,
        store: Arc<Store>,
        sink: mpsc::Sender<BusEvent>,
        journal: Option<SessionJournal>,
        config: ManagerConfig,
        clock: C,
    ) -> Self {
        Self {
            launcher,
            store,
            sink,
            journal,
            config,
            clock,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn spec_for(
        &self,
        session_id: &SessionId,
        cwd: String,
        model: Option<String>,
        system_prompt: Option<String>,
        thinking: Option<bool>,
        effort: Option<String>,
        resume: bool,
    ) -> LaunchSpec {
        LaunchSpec {
            session_id: session_id.as_str().to_string(),
            cwd,
            model: model.or_else(|| self.config.default_model.clone()),
            system_prompt,
            thinking: thinking.or(self.config.default_thinking),
            effort: effort.or_else(|| self.config.default_effort.clone()),
            permission_mode: None,
            resume,
        }
    }

    fn register(&self, session_id: SessionId, spec: LaunchSpec) -> Arc<SessionInner> {
        let inner = Arc::new(SessionInner {
            id: session_id.clone(),
            spec,
            tracker: Mutex::new(TurnTracker::new()),
            input_tx: Mutex::new(None),
            abort_tx: Mutex::new(None),
            permission_mode: Mutex::new(None),
            launch_lock: tokio::sync::Mutex::new(()),
            ran_before: AtomicBool::new(false),
            generation: std::sync::atomic::AtomicU64::new(0),
            abort_requested: AtomicBool::new(false),
            closing: AtomicBool::new(false),
            last_event_ms: AtomicI64::new(self.clock.now_ms()),
        });
        self.sessions.lock().insert(session_id, Arc::clone(&inner));
        inner
    }

    /// Create a session. The child is spawned lazily on first prompt.
    pub fn create(
        &self,
        cwd: String,
        model: Option<String>,
        system_prompt: Option<String>,
        thinking: Option<bool>,
        effort: Option<String>,
    ) -> SessionId {
        let id = SessionId::generate();
        let spec = self.spec_for(&id, cwd, model, system_prompt, thinking, effort, false);
        self.register(id.clone(), spec);
        info!(session_id = %id, "session created");
        id
    }

    /// Re-attach a known external session id; the child resumes on first
    /// prompt.
    pub fn resume(
        &self,
        session_id: SessionId,
        cwd: String,
        model: Option<String>,
        system_prompt: Option<String>,
        thinking: Option<bool>,
        effort: Option<String>,
    ) -> SessionId {
        let spec = self.spec_for(
            &session_id,
            cwd,
            model,
            system_prompt,
            thinking,
            effort,
            true,
        );
        self.register(session_id.clone(), spec);
        info!(session_id = %session_id, "session resumed");
        session_id
    }

    fn get(&self, session_id: &SessionId) -> Option<Arc<SessionInner>> {
        self.sessions.lock().get(session_id).cloned()
    }

    /// Enqueue a user turn, lazily spawning or resuming the child.
    ///
    /// A prompt to an unknown (or closed) session auto-resumes when `cwd`
    /// is supplied; without it the call fails with `MissingContext`.
    pub async fn prompt(
        &self,
        session_id: &SessionId,
        content: String,
        cwd: Option<String>,
    ) -> Result<(), AgentError> {
        let inner = match self.get(session_id) {
            Some(inner) => inner,
            None => {
                let Some(cwd) = cwd else {
                    return Err(AgentError::MissingContext(format!(
                        "cwd required to resume unknown session {session_id}"
                    )));
                };
                let spec = self.spec_for(session_id, cwd, None, None, None, None, true);
                self.register(session_id.clone(), spec)
            }
        };

        let input_tx = self.ensure_child(&inner).await?;
        if input_tx.send(ChildInput::User { content }).await.is_err() {
            // Child fell over between spawn and send; reader will report it.
            return Err(AgentError::MissingContext(format!(
                "session {session_id} input channel closed"
            )));
        }
        let _ = self.store.session_touch(session_id, self.clock.now_ms());
        Ok(())
    }

    async fn ensure_child(
        &self,
        inner: &Arc<SessionInner>,
    ) -> Result<mpsc::Sender<ChildInput>, AgentError> {
        let _launching = inner.launch_lock.lock().await;
        if let Some(tx) = inner.input_tx.lock().clone() {
            return Ok(tx);
        }

        let mut spec = inner.spec.clone();
        spec.permission_mode = inner.permission_mode.lock().clone();
        if inner.ran_before.load(Ordering::SeqCst) {
            spec.resume = true;
        }
        let handle = self.launcher.launch(&spec).await?;
        inner.ran_before.store(true, Ordering::SeqCst);
        // A fresh child starts with a clean abort slate.
        inner.abort_requested.store(false, Ordering::SeqCst);
        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (input_tx, event_rx, abort_tx) = handle.split();

        *inner.input_tx.lock() = Some(input_tx.clone());
        // Keep the abort hook where interrupt() and close() can reach it.
        *inner.abort_tx.lock() = Some(abort_tx);

        self.publish(
            &inner.id,
            "session.process_started",
            serde_json::json!({ "session_id": inner.id }),
        )
        .await;

        let reader = ReaderCtx {
            inner: Arc::clone(inner),
            generation,
            sink: self.sink.clone(),
            store: Arc::clone(&self.store),
            journal: self.journal.clone(),
            clock: self.clock.clone(),
        };
        tokio::spawn(run_reader(reader, event_rx));

        Ok(input_tx)
    }

    /// Abort the current turn, keeping the stream well-bracketed.
    pub async fn interrupt(&self, session_id: &SessionId) -> bool {
        let Some(inner) = self.get(session_id) else {
            return false;
        };
        inner.abort_requested.store(true, Ordering::SeqCst);
        if let Some(abort) = inner.abort_tx.lock().take() {
            let _ = abort.send(());
        }

        let synthetic = inner.tracker.lock().synthetic_stops();
        for event in synthetic {
            let name = format!("sse.{}", event.name());
            let payload = serde_json::json!({
                "session_id": session_id,
                "event": event,
                "synthetic": true,
            });
            self.publish(session_id, &name, payload).await;
        }
        let _ = self.store.session_touch(session_id, self.clock.now_ms());
        true
    }

    /// Change the permission mode; forwarded to a running child.
    pub async fn set_permission_mode(&self, session_id: &SessionId, mode: String) -> bool {
        let Some(inner) = self.get(session_id) else {
            return false;
        };
        *inner.permission_mode.lock() = Some(mode.clone());
        let tx = inner.input_tx.lock().clone();
        if let Some(tx) = tx {
            let _ = tx.send(ChildInput::PermissionMode { mode }).await;
        }
        true
    }

    /// Deliver a tool result to a running child.
    pub async fn send_tool_result(
        &self,
        session_id: &SessionId,
        tool_use_id: String,
        content: String,
        is_error: bool,
    ) -> bool {
        let Some(inner) = self.get(session_id) else {
            return false;
        };
        let tx = inner.input_tx.lock().clone();
        match tx {
            Some(tx) => tx
                .send(ChildInput::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                })
                .await
                .is_ok(),
            None => false,
        }
    }

    /// Close a session, killing its child. Returns false when unknown.
    pub async fn close(&self, session_id: &SessionId) -> bool {
        let Some(inner) = self.sessions.lock().remove(session_id) else {
            return false;
        };
        inner.closing.store(true, Ordering::SeqCst);
        // Dropping the input sender ends stdin; the abort hook kills a
        // child that does not exit on its own.
        *inner.input_tx.lock() = None;
        if let Some(abort) = inner.abort_tx.lock().take() {
            let _ = abort.send(());
        }
        debug!(session_id = %session_id, "session closed");
        true
    }

    pub async fn close_all(&self) {
        let ids: Vec<SessionId> = self.sessions.lock().keys().cloned().collect();
        for id in ids {
            self.close(&id).await;
        }
    }

    /// Health view of every live session.
    pub fn list(&self) -> Vec<SessionInfo> {
        let now = self.clock.now_ms();
        self.sessions
            .lock()
            .values()
            .map(|inner| {
                let last = inner.last_event_ms.load(Ordering::SeqCst);
                SessionInfo {
                    id: inner.id.clone(),
                    cwd: inner.spec.cwd.clone(),
                    running: inner.input_tx.lock().is_some(),
                    last_event_ms: last,
                    stale: now - last > self.config.stale_after_ms,
                }
            })
            .collect()
    }

    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.sessions.lock().contains_key(session_id)
    }

    async fn publish(&self, session_id: &SessionId, event: &str, payload: serde_json::Value) {
        if let Some(journal) = &self.journal {
            journal.append(session_id, self.clock.now_ms(), event, &payload);
        }
        let _ = self.sink.send(BusEvent::new(event, payload)).await;
    }
}

struct ReaderCtx<C: Clock> {
    inner: Arc<SessionInner>,
    generation: u64,
    sink: mpsc::Sender<BusEvent>,
    store: Arc<Store>,
    journal: Option<SessionJournal>,
    clock: C,
}

impl<C: Clock> ReaderCtx<C> {
    async fn publish(&self, event: &str, payload: serde_json::Value) {
        if let Some(journal) = &self.journal {
            journal.append(&self.inner.id, self.clock.now_ms(), event, &payload);
        }
        let _ = self.sink.send(BusEvent::new(event, payload)).await;
    }
}

/// Pump one session's child events until the stream ends.
async fn run_reader<C: Clock>(
    ctx: ReaderCtx<C>,
    mut event_rx: mpsc::Receiver<claudia_core::AgentEvent>,
) {
    let session_id = ctx.inner.id.clone();
    while let Some(event) = event_rx.recv().await {
        let now = ctx.clock.now_ms();
        ctx.inner.last_event_ms.store(now, Ordering::SeqCst);
        let _ = ctx.store.session_touch(&session_id, now);

        let decisions = ctx.inner.tracker.lock().apply(&event);

        let name = format!("sse.{}", event.name());
        ctx.publish(
            &name,
            serde_json::json!({ "session_id": session_id, "event": event }),
        )
        .await;

        let bypassing = ctx
            .inner
            .permission_mode
            .lock()
            .as_deref()
            .is_some_and(mode_bypasses);
        for decision in decisions {
            match decision {
                ToolDecision::AutoReply {
                    tool_use_id,
                    name,
                    content,
                } => {
                    // The permission mode wins over the template path.
                    if bypassing {
                        debug!(session_id = %session_id, tool = name, "bypass mode, no auto-reply");
                        continue;
                    }
                    let tx = ctx.inner.input_tx.lock().clone();
                    if let Some(tx) = tx {
                        let _ = tx
                            .send(ChildInput::ToolResult {
                                tool_use_id,
                                content: content.to_string(),
                                is_error: false,
                            })
                            .await;
                    }
                }
                ToolDecision::Forward {
                    tool_use_id,
                    name,
                    input,
                } => {
                    ctx.publish(
                        "session.request_tool_results",
                        serde_json::json!({
                            "session_id": session_id,
                            "tool_use_id": tool_use_id,
                            "name": name,
                            "input": input,
                        }),
                    )
                    .await;
                }
            }
        }
    }

    // Stream ended: classify why. A reader of a replaced child must not
    // touch the successor's channels or misreport its death.
    if ctx.inner.generation.load(Ordering::SeqCst) != ctx.generation {
        return;
    }
    *ctx.inner.input_tx.lock() = None;
    let payload = serde_json::json!({ "session_id": session_id });
    if ctx.inner.closing.load(Ordering::SeqCst) || ctx.inner.abort_requested.load(Ordering::SeqCst)
    {
        ctx.publish("session.process_ended", payload).await;
    } else {
        // Unexpected death: close whatever is open so clients still see a
        // well-formed stream, then report the failure.
        let synthetic = ctx.inner.tracker.lock().synthetic_stops();
        for event in synthetic {
            let name = format!("sse.{}", event.name());
            ctx.publish(
                &name,
                serde_json::json!({
                    "session_id": session_id,
                    "event": event,
                    "synthetic": true,
                }),
            )
            .await;
        }
        warn!(session_id = %session_id, "agent process died");
        ctx.publish("session.process_died", payload).await;
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
