// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Assembly of the whole control plane.
//!
//! Wires the store, session manager, extension hosts, ingestion watcher,
//! librarian worker, voice bridge, and the hub into one running gateway.
//! Each subsystem opens its own store handle against the shared file.

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::hub::{Hub, HubHandle};
use async_trait::async_trait;
use claudia_agents::{
    AgentLauncher, ManagerConfig, ProcessLauncher, SessionJournal, SessionManager,
};
use claudia_core::{AgentEvent, Clock, RpcError, SessionId, SystemClock};
use claudia_extensions::{ExtensionHost, ExtensionRegistry, HostConfig, HostSignal};
use claudia_ingest::{ClaudeLogParser, IngestOptions, IngestPipeline, LogWatcher, WatcherHandle};
use claudia_librarian::{AgentGateway, LibrarianConfig, LibrarianHandle, LibrarianWorker};
use claudia_store::Store;
use claudia_voice::{HttpTtsClient, TtsBridge, TtsBridgeConfig, TtsClient};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Pluggable collaborators, defaulted from config in production.
pub struct GatewayDeps {
    pub launcher: Arc<dyn AgentLauncher>,
    pub tts: Arc<dyn TtsClient>,
}

impl GatewayDeps {
    pub fn from_config(config: &Config) -> Self {
        Self {
            launcher: Arc::new(ProcessLauncher::new(&config.agent_binary)),
            tts: Arc::new(HttpTtsClient::new(
                config
                    .tts_endpoint
                    .clone()
                    .unwrap_or_else(|| "http://127.0.0.1:8880/v1/tts".to_string()),
                config.tts_voice.clone(),
            )),
        }
    }
}

/// The assembled control plane.
pub struct Gateway<C: Clock> {
    pub dispatcher: Arc<Dispatcher<C>>,
    pub hub: HubHandle,
    pub manager: Arc<SessionManager<C>>,
    pub store: Arc<Store>,
    watcher: parking_lot::Mutex<Option<WatcherHandle>>,
    librarian: parking_lot::Mutex<Option<LibrarianHandle>>,
    hosts: Vec<ExtensionHost>,
}

impl Gateway<SystemClock> {
    /// Build and start everything from config.
    pub fn build(
        config: &Config,
        deps: GatewayDeps,
    ) -> Result<Arc<Self>, claudia_store::StoreError> {
        Self::assemble(config, deps, SystemClock)
    }
}

impl<C: Clock> Gateway<C> {
    pub fn assemble(
        config: &Config,
        deps: GatewayDeps,
        clock: C,
    ) -> Result<Arc<Self>, claudia_store::StoreError> {
        let store_path = config.store_path();
        let open = |_what: &str| -> Result<Arc<Store>, claudia_store::StoreError> {
            Ok(Arc::new(Store::open(&store_path)?))
        };

        let registry = Arc::new(ExtensionRegistry::new());
        let (hub, hub_handle) = Hub::new(Arc::clone(&registry));
        tokio::spawn(hub.run());

        let store = open("gateway")?;
        let journal = SessionJournal::new(config.sessions_dir());
        let manager = Arc::new(SessionManager::new(
            Arc::clone(&deps.launcher),
            Arc::clone(&store),
            hub_handle.sink(),
            Some(journal.clone()),
            ManagerConfig {
                default_model: config.default_model.clone(),
                ..ManagerConfig::default()
            },
            clock.clone(),
        ));

        // Voice: bridge fed from the hub tap.
        let bridge = Arc::new(TtsBridge::new(
            Arc::clone(&deps.tts),
            hub_handle.sink(),
            TtsBridgeConfig {
                audio_dir: Some(config.audio_dir()),
                ..TtsBridgeConfig::default()
            },
        ));
        {
            let bridge = Arc::clone(&bridge);
            let mut tap = hub_handle.tap();
            tokio::spawn(async move {
                while let Ok(event) = tap.recv().await {
                    bridge.handle_event(&event).await;
                }
            });
        }

        // Ingestion: recovery plus watcher, its own store handle.
        let pipeline = Arc::new(IngestPipeline::new(
            open("ingest")?,
            Arc::new(ClaudeLogParser),
            config.agent_log_dir.clone(),
            IngestOptions {
                segment: claudia_ingest::SegmentOptions {
                    gap_minutes: config.gap_minutes,
                    ..Default::default()
                },
                ..IngestOptions::default()
            },
            clock.clone(),
        ));
        let watcher = match LogWatcher::new(Arc::clone(&pipeline)).start() {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "log watcher unavailable, ingestion is manual only");
                None
            }
        };

        // Librarian: private workspace, artifact repo, its own store handle.
        {
            let artifact_dir = config.artifact_dir.clone();
            tokio::spawn(async move {
                let _ = std::fs::create_dir_all(&artifact_dir);
                if let Err(e) = claudia_librarian::git::ensure_repo(&artifact_dir).await {
                    warn!(error = %e, "artifact directory is not a repository");
                }
            });
        }
        let agent_gateway = Arc::new(ManagerGateway {
            manager: Arc::clone(&manager),
            store: Arc::clone(&store),
            hub: hub_handle.clone(),
            clock: clock.clone(),
        });
        let librarian = Arc::new(LibrarianWorker::new(
            open("librarian")?,
            agent_gateway,
            LibrarianConfig {
                workspace_cwd: config.librarian_workspace.clone(),
                artifact_dir: config.artifact_dir.clone(),
                ..LibrarianConfig::default()
            },
            clock.clone(),
        ));
        let _ = std::fs::create_dir_all(&config.librarian_workspace);
        let librarian_handle = librarian.spawn();

        let dispatcher = Arc::new(Dispatcher {
            store: Arc::clone(&store),
            manager: Arc::clone(&manager),
            registry: Arc::clone(&registry),
            hub: hub_handle.clone(),
            librarian,
            bridge,
            journal,
            clock,
            started: Instant::now(),
        });

        // Extension hosts last: their calls route through the dispatcher.
        let mut hosts = Vec::new();
        for entry in &config.extensions {
            let host_config = HostConfig {
                launcher: entry.launcher.clone(),
                entrypoint: entry.entrypoint.clone(),
                config: entry.config.clone(),
                max_backoff: Duration::from_secs(30),
            };
            let (signals_tx, signals_rx) = mpsc::channel(64);
            let host = ExtensionHost::start(host_config, signals_tx);
            tokio::spawn(route_host_signals(
                host.clone(),
                signals_rx,
                Arc::clone(&registry),
                hub_handle.clone(),
                Arc::clone(&dispatcher),
            ));
            hosts.push(host);
        }

        info!(extensions = hosts.len(), "gateway assembled");
        Ok(Arc::new(Self {
            dispatcher,
            hub: hub_handle,
            manager,
            store,
            watcher: parking_lot::Mutex::new(watcher),
            librarian: parking_lot::Mutex::new(Some(librarian_handle)),
            hosts,
        }))
    }

    /// Orderly shutdown: sessions, hosts, watcher, worker.
    pub async fn shutdown(&self) {
        self.manager.close_all().await;
        for host in &self.hosts {
            host.stop().await;
        }
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.shutdown();
        }
        if let Some(librarian) = self.librarian.lock().take() {
            librarian.shutdown();
        }
    }
}

/// Pump one host's signals into the registry, hub, and dispatcher.
async fn route_host_signals<C: Clock>(
    host: ExtensionHost,
    mut signals: mpsc::Receiver<HostSignal>,
    registry: Arc<ExtensionRegistry>,
    hub: HubHandle,
    dispatcher: Arc<Dispatcher<C>>,
) {
    while let Some(signal) = signals.recv().await {
        match signal {
            HostSignal::Registered(manifest) => {
                info!(extension = %manifest.id, methods = manifest.methods.len(), "extension registered");
                registry.register(host.clone(), manifest);
            }
            HostSignal::Event(event) => {
                hub.publish(event).await;
            }
            HostSignal::Call {
                method,
                params,
                envelope,
                respond,
            } => {
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    let result = dispatcher.call(&method, params, &envelope).await;
                    let _ = respond.send(result);
                });
            }
        }
    }
}

/// The librarian's view of the core: dedicated sessions in a private
/// workspace, one prompt, one collected reply.
struct ManagerGateway<C: Clock> {
    manager: Arc<SessionManager<C>>,
    store: Arc<Store>,
    hub: HubHandle,
    clock: C,
}

#[async_trait]
impl<C: Clock> AgentGateway for ManagerGateway<C> {
    async fn open_session(&self, cwd: &str, system_prompt: &str) -> Result<SessionId, RpcError> {
        let workspace = self
            .store
            .workspace_get_or_create(cwd, Some("librarian"), self.clock.now_ms())
            .map_err(RpcError::from)?;
        let session_id = self.manager.create(
            workspace.cwd.clone(),
            None,
            Some(system_prompt.to_string()),
            None,
            None,
        );
        self.store
            .session_create(
                &session_id,
                &workspace.id,
                session_id.as_str(),
                Some("librarian job"),
                self.clock.now_ms(),
            )
            .map_err(RpcError::from)?;
        Ok(session_id)
    }

    async fn ask(
        &self,
        session_id: &SessionId,
        content: String,
        timeout: Duration,
    ) -> Result<String, RpcError> {
        let mut tap = self.hub.tap();
        self.manager
            .prompt(session_id, content, None)
            .await
            .map_err(RpcError::from)?;

        let collect = async {
            let mut reply = String::new();
            loop {
                let event = match tap.recv().await {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(_) => {
                        return Err(RpcError::external("event bus closed mid-reply"));
                    }
                };
                if event.payload.get("session_id").and_then(|v| v.as_str())
                    != Some(session_id.as_str())
                {
                    continue;
                }
                match event.event.as_str() {
                    "sse.content_block_start" | "sse.content_block_delta" => {
                        if let Some(agent_event) = event
                            .payload
                            .get("event")
                            .cloned()
                            .and_then(|v| serde_json::from_value::<AgentEvent>(v).ok())
                        {
                            if let Some(text) = agent_event.text_payload() {
                                reply.push_str(text);
                            }
                        }
                    }
                    "sse.turn_stop" => return Ok(reply),
                    "session.process_died" => {
                        return Err(RpcError::external("agent process died mid-reply"));
                    }
                    _ => {}
                }
            }
        };

        match tokio::time::timeout(timeout, collect).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::new(
                claudia_core::ErrorKind::DeadlineExceeded,
                "no reply within the job timeout",
            )),
        }
    }

    async fn close_session(&self, session_id: &SessionId) {
        self.manager.close(session_id).await;
        let _ = self.store.session_archive(session_id);
    }
}

#[cfg(test)]
#[path = "app_tests.rs"]
mod tests;
