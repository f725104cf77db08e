// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Method dispatch.
//!
//! Precedence: gateway-intrinsic methods first, then extension-registered
//! methods by fully-qualified name. Unknown methods fail with
//! `UnknownMethod`. Every dispatch checks the envelope's deadline first;
//! nested calls derive a child envelope and are depth-bounded.

use crate::hub::HubHandle;
use claudia_agents::SessionManager;
use claudia_core::{Clock, Envelope, ErrorKind, EventGlob, RpcError, SessionId, WorkspaceId};
use claudia_extensions::ExtensionRegistry;
use claudia_librarian::LibrarianWorker;
use claudia_store::Store;
use claudia_voice::TtsBridge;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Intrinsic methods, in `method.list` order.
const INTRINSIC_METHODS: &[(&str, &str)] = &[
    ("extension.list", "List registered extensions and their health"),
    ("memory.process", "Queue ready conversations for the librarian"),
    ("method.list", "List every dispatchable method"),
    ("session.close", "Close a live session"),
    ("session.get", "Fetch a session record"),
    ("session.history", "Read a session's event journal"),
    ("session.info", "Live session health"),
    ("session.interrupt", "Abort the session's current turn"),
    ("session.permission-mode", "Change a session's permission mode"),
    ("session.prompt", "Send a user turn to a session"),
    ("session.reset", "Replace a session with a fresh one"),
    ("session.switch", "Archive the active session and start another"),
    ("session.tool-result", "Deliver a tool result to a session"),
    ("status", "Gateway health and uptime"),
    ("subscribe", "Add event subscriptions for this connection"),
    ("unsubscribe", "Remove event subscriptions for this connection"),
    ("voice.disable", "Stop voicing a session"),
    ("voice.enable", "Voice a session to this connection"),
    ("workspace.create-session", "Create a session in a workspace"),
    ("workspace.get", "Fetch one workspace"),
    ("workspace.get-or-create", "Fetch or lazily create a workspace by cwd"),
    ("workspace.list", "List workspaces"),
    ("workspace.list-sessions", "List a workspace's sessions"),
];

/// Routes requests to handlers.
pub struct Dispatcher<C: Clock> {
    pub(crate) store: Arc<Store>,
    pub(crate) manager: Arc<SessionManager<C>>,
    pub(crate) registry: Arc<ExtensionRegistry>,
    pub(crate) hub: HubHandle,
    pub(crate) librarian: Arc<LibrarianWorker<C>>,
    pub(crate) bridge: Arc<TtsBridge>,
    pub(crate) journal: claudia_agents::SessionJournal,
    pub(crate) clock: C,
    pub(crate) started: Instant,
}

impl<C: Clock> Dispatcher<C> {
    /// Dispatch one request. Exactly one result per call.
    pub async fn dispatch(
        &self,
        method: &str,
        params: Value,
        envelope: &Envelope,
    ) -> Result<Value, RpcError> {
        envelope.check_deadline(self.clock.now_ms())?;

        match method {
            "workspace.list" => self.workspace_list(),
            "workspace.get" => self.workspace_get(params),
            "workspace.get-or-create" => self.workspace_get_or_create(params),
            "workspace.list-sessions" => self.workspace_list_sessions(params),
            "workspace.create-session" => self.create_session(params).await,
            "session.info" => self.session_info(params),
            "session.get" => self.session_get(params),
            "session.history" => self.session_history(params),
            "session.prompt" => self.session_prompt(params).await,
            "session.interrupt" => self.session_interrupt(params).await,
            "session.permission-mode" => self.session_permission_mode(params).await,
            "session.tool-result" => self.session_tool_result(params).await,
            "session.close" => self.session_close(params).await,
            "session.switch" => self.session_switch(params).await,
            "session.reset" => self.session_reset(params).await,
            "extension.list" => Ok(extension_list(&self.registry)),
            "method.list" => Ok(self.method_list()),
            "memory.process" => self.memory_process(),
            "voice.enable" => self.voice_enable(params, envelope),
            "voice.disable" => self.voice_disable(params),
            "subscribe" => self.subscribe(params, envelope, true),
            "unsubscribe" => self.subscribe(params, envelope, false),
            "status" => self.status(),
            _ => self.dispatch_extension(method, params, envelope).await,
        }
    }

    /// Internal call used by handlers and extension-originated calls:
    /// derives a child envelope and applies the depth guardrail.
    pub async fn call(
        &self,
        method: &str,
        params: Value,
        envelope: &Envelope,
    ) -> Result<Value, RpcError> {
        let child = envelope.child();
        child.check_depth()?;
        Box::pin(self.dispatch(method, params, &child)).await
    }

    async fn dispatch_extension(
        &self,
        method: &str,
        params: Value,
        envelope: &Envelope,
    ) -> Result<Value, RpcError> {
        let Some((extension_id, host)) = self.registry.method_host(method) else {
            return Err(RpcError::unknown_method(method));
        };
        debug!(method, extension = %extension_id, "dispatching to extension");
        host.call(method, params, envelope.clone()).await
    }

    // ── workspace ────────────────────────────────────────────────────────

    fn workspace_list(&self) -> Result<Value, RpcError> {
        let workspaces = self.store.workspace_list().map_err(RpcError::from)?;
        Ok(json!({ "workspaces": workspaces }))
    }

    fn workspace_get(&self, params: Value) -> Result<Value, RpcError> {
        let id = require_str(&params, "workspace_id")?;
        let workspace = self
            .store
            .workspace_get(&WorkspaceId::new(id))
            .map_err(RpcError::from)?
            .ok_or_else(|| RpcError::invalid_params(format!("no workspace: {id}")))?;
        Ok(json!({ "workspace": workspace }))
    }

    fn workspace_get_or_create(&self, params: Value) -> Result<Value, RpcError> {
        let cwd = require_str(&params, "cwd")?;
        let name = params.get("name").and_then(Value::as_str);
        let workspace = self
            .store
            .workspace_get_or_create(cwd, name, self.clock.now_ms())
            .map_err(RpcError::from)?;
        Ok(json!({ "workspace": workspace }))
    }

    fn workspace_list_sessions(&self, params: Value) -> Result<Value, RpcError> {
        let id = require_str(&params, "workspace_id")?;
        let sessions = self
            .store
            .session_list_for_workspace(&WorkspaceId::new(id))
            .map_err(RpcError::from)?;
        Ok(json!({ "sessions": sessions }))
    }

    // ── session ──────────────────────────────────────────────────────────

    async fn create_session(&self, params: Value) -> Result<Value, RpcError> {
        let workspace = match params.get("workspace_id").and_then(Value::as_str) {
            Some(id) => self
                .store
                .workspace_get(&WorkspaceId::new(id))
                .map_err(RpcError::from)?
                .ok_or_else(|| RpcError::invalid_params(format!("no workspace: {id}")))?,
            None => {
                let cwd = require_str(&params, "cwd")?;
                self.store
                    .workspace_get_or_create(cwd, None, self.clock.now_ms())
                    .map_err(RpcError::from)?
            }
        };
        let title = params.get("title").and_then(Value::as_str);
        let model = params
            .get("model")
            .and_then(Value::as_str)
            .map(str::to_string);
        let system_prompt = params
            .get("system_prompt")
            .and_then(Value::as_str)
            .map(str::to_string);

        let session_id =
            self.manager
                .create(workspace.cwd.clone(), model, system_prompt, None, None);
        let record = self
            .store
            .session_create(
                &session_id,
                &workspace.id,
                session_id.as_str(),
                title,
                self.clock.now_ms(),
            )
            .map_err(RpcError::from)?;
        self.hub
            .publish(claudia_core::BusEvent::new(
                "session.created",
                json!({ "session": record }),
            ))
            .await;
        Ok(json!({ "session": record }))
    }

    fn session_info(&self, params: Value) -> Result<Value, RpcError> {
        let id = SessionId::new(require_str(&params, "session_id")?);
        let info = self.manager.list().into_iter().find(|s| s.id == id);
        Ok(json!({ "session": info }))
    }

    fn session_get(&self, params: Value) -> Result<Value, RpcError> {
        let id = SessionId::new(require_str(&params, "session_id")?);
        let record = self.store.session_get(&id).map_err(RpcError::from)?;
        Ok(json!({ "session": record }))
    }

    fn session_history(&self, params: Value) -> Result<Value, RpcError> {
        let id = SessionId::new(require_str(&params, "session_id")?);
        Ok(json!({ "events": self.journal.read(&id) }))
    }

    async fn session_prompt(&self, params: Value) -> Result<Value, RpcError> {
        let id = SessionId::new(require_str(&params, "session_id")?);
        let content = require_str(&params, "content")?.to_string();
        let cwd = params
            .get("cwd")
            .and_then(Value::as_str)
            .map(str::to_string);
        self.manager
            .prompt(&id, content, cwd)
            .await
            .map_err(RpcError::from)?;
        Ok(json!({ "accepted": true }))
    }

    async fn session_interrupt(&self, params: Value) -> Result<Value, RpcError> {
        let id = SessionId::new(require_str(&params, "session_id")?);
        Ok(json!({ "interrupted": self.manager.interrupt(&id).await }))
    }

    async fn session_permission_mode(&self, params: Value) -> Result<Value, RpcError> {
        let id = SessionId::new(require_str(&params, "session_id")?);
        let mode = require_str(&params, "mode")?.to_string();
        Ok(json!({ "updated": self.manager.set_permission_mode(&id, mode).await }))
    }

    async fn session_tool_result(&self, params: Value) -> Result<Value, RpcError> {
        let id = SessionId::new(require_str(&params, "session_id")?);
        let tool_use_id = require_str(&params, "tool_use_id")?.to_string();
        let content = require_str(&params, "content")?.to_string();
        let is_error = params
            .get("is_error")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let delivered = self
            .manager
            .send_tool_result(&id, tool_use_id, content, is_error)
            .await;
        Ok(json!({ "delivered": delivered }))
    }

    async fn session_close(&self, params: Value) -> Result<Value, RpcError> {
        let id = SessionId::new(require_str(&params, "session_id")?);
        Ok(json!({ "closed": self.manager.close(&id).await }))
    }

    /// Archive the workspace's active session and start a fresh one.
    async fn session_switch(&self, params: Value) -> Result<Value, RpcError> {
        self.create_session(params).await
    }

    /// Close a session's child and replace its record in one move.
    async fn session_reset(&self, params: Value) -> Result<Value, RpcError> {
        let id = SessionId::new(require_str(&params, "session_id")?);
        let record = self
            .store
            .session_get(&id)
            .map_err(RpcError::from)?
            .ok_or_else(|| RpcError::session_not_found(id.as_str()))?;
        self.manager.close(&id).await;
        self.create_session(json!({ "workspace_id": record.workspace_id })).await
    }

    // ── introspection & the rest ─────────────────────────────────────────

    fn method_list(&self) -> Value {
        let mut methods: Vec<Value> = INTRINSIC_METHODS
            .iter()
            .map(|(name, description)| json!({ "name": name, "description": description }))
            .collect();
        for decl in self.registry.method_list() {
            methods.push(json!({
                "name": decl.name,
                "description": decl.description,
                "inputSchema": decl.input_schema,
            }));
        }
        json!({ "methods": methods })
    }

    fn memory_process(&self) -> Result<Value, RpcError> {
        let queued = self.librarian.process_ready().map_err(RpcError::from)?;
        Ok(json!({ "queued": queued.len() }))
    }

    fn voice_enable(&self, params: Value, envelope: &Envelope) -> Result<Value, RpcError> {
        let id = SessionId::new(require_str(&params, "session_id")?);
        let Some(connection_id) = envelope.connection_id.clone() else {
            return Err(RpcError::missing_context(
                "voice.enable requires a client connection",
            ));
        };
        self.bridge.enable(id, connection_id);
        Ok(json!({ "enabled": true }))
    }

    fn voice_disable(&self, params: Value) -> Result<Value, RpcError> {
        let id = SessionId::new(require_str(&params, "session_id")?);
        Ok(json!({ "disabled": self.bridge.disable(&id) }))
    }

    fn subscribe(
        &self,
        params: Value,
        envelope: &Envelope,
        add: bool,
    ) -> Result<Value, RpcError> {
        let Some(connection_id) = envelope.connection_id.clone() else {
            return Err(RpcError::missing_context(
                "subscriptions require a client connection",
            ));
        };
        let globs = parse_globs(&params)?;
        if let Some(source) = params.get("source").and_then(Value::as_str) {
            self.hub
                .set_source(&connection_id, Some(source.to_string()));
        }
        let active = if add {
            self.hub.subscribe(&connection_id, globs)
        } else {
            self.hub.unsubscribe(&connection_id, globs)
        };
        Ok(json!({ "subscriptions": active }))
    }

    fn status(&self) -> Result<Value, RpcError> {
        let conversations = self
            .store
            .conversation_status_counts()
            .map_err(RpcError::from)?;
        Ok(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_secs": self.started.elapsed().as_secs(),
            "connections": self.hub.connection_count(),
            "sessions": self.manager.list(),
            "conversations": conversations.into_iter().collect::<std::collections::BTreeMap<_, _>>(),
            "dropped_events": self.hub.dropped_events(),
        }))
    }
}

fn extension_list(registry: &ExtensionRegistry) -> Value {
    let extensions: Vec<Value> = registry
        .snapshots()
        .into_iter()
        .map(|(id, snapshot)| json!({ "id": id, "snapshot": snapshot }))
        .collect();
    json!({ "extensions": extensions })
}

fn require_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, RpcError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::new(ErrorKind::InvalidParams, format!("missing param: {key}")))
}

fn parse_globs(params: &Value) -> Result<Vec<EventGlob>, RpcError> {
    let events = params
        .get("events")
        .and_then(Value::as_array)
        .ok_or_else(|| RpcError::invalid_params("missing param: events"))?;
    let globs: Vec<EventGlob> = events
        .iter()
        .filter_map(Value::as_str)
        .map(EventGlob::from)
        .collect();
    if globs.is_empty() {
        return Err(RpcError::invalid_params("events must be a list of globs"));
    }
    Ok(globs)
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
