// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Extension host supervisor.
//!
//! Spawns the extension subprocess, parses its stdout line by line, routes
//! messages, and restarts on exit with capped exponential backoff. Writes
//! to the child are serialized by a per-host lock so frames never
//! interleave. When the process dies, every pending call fails with
//! `ExtensionDied`.

use crate::protocol::{
    CoreToExtension, ExtensionManifest, ExtensionToCore, SOURCE_RESPONSE_METHOD,
};
use claudia_core::{BusEvent, ConnectionId, Envelope, ErrorKind, RpcError};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Default cap on restart backoff.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Base delay for the first restart.
const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Host lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    Spawning,
    Registered,
    Dead,
}

/// How a host is started and supervised.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Launcher command, e.g. `["node"]` or `["sh", "-c"]`.
    pub launcher: Vec<String>,
    /// Entrypoint path passed as the final argument.
    pub entrypoint: PathBuf,
    /// Config object serialized into `CLAUDIA_EXTENSION_CONFIG`.
    pub config: serde_json::Value,
    pub max_backoff: Duration,
}

impl HostConfig {
    pub fn new(launcher: Vec<String>, entrypoint: impl Into<PathBuf>) -> Self {
        Self {
            launcher,
            entrypoint: entrypoint.into(),
            config: serde_json::Value::Null,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

/// Signals a host raises toward the gateway.
#[derive(Debug)]
pub enum HostSignal {
    /// The extension (re-)registered.
    Registered(ExtensionManifest),
    /// The extension emitted a bus event.
    Event(BusEvent),
    /// The extension invokes a method; reply via `respond`.
    Call {
        method: String,
        params: serde_json::Value,
        envelope: Envelope,
        respond: oneshot::Sender<Result<serde_json::Value, RpcError>>,
    },
}

/// Health view of one host.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct HostSnapshot {
    pub status: HostStatus,
    pub restarts: u32,
    pub manifest: Option<ExtensionManifest>,
}

type Pending = Mutex<HashMap<String, oneshot::Sender<Result<serde_json::Value, RpcError>>>>;

struct HostShared {
    config: HostConfig,
    /// Per-host write lock: one frame at a time.
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    pending: Pending,
    manifest: Mutex<Option<ExtensionManifest>>,
    status: Mutex<HostStatus>,
    restarts: AtomicU32,
    stopped: AtomicBool,
    stop_notify: tokio::sync::Notify,
    signals: mpsc::Sender<HostSignal>,
}

/// One supervised extension subprocess.
#[derive(Clone)]
pub struct ExtensionHost {
    shared: Arc<HostShared>,
}

impl ExtensionHost {
    /// Start supervising. Signals (registration, events, calls) arrive on
    /// `signals`.
    pub fn start(config: HostConfig, signals: mpsc::Sender<HostSignal>) -> Self {
        let shared = Arc::new(HostShared {
            config,
            stdin: tokio::sync::Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
            manifest: Mutex::new(None),
            status: Mutex::new(HostStatus::Spawning),
            restarts: AtomicU32::new(0),
            stopped: AtomicBool::new(false),
            stop_notify: tokio::sync::Notify::new(),
            signals,
        });
        tokio::spawn(supervise(Arc::clone(&shared)));
        Self { shared }
    }

    pub fn snapshot(&self) -> HostSnapshot {
        HostSnapshot {
            status: *self.shared.status.lock(),
            restarts: self.shared.restarts.load(Ordering::SeqCst),
            manifest: self.shared.manifest.lock().clone(),
        }
    }

    pub fn manifest(&self) -> Option<ExtensionManifest> {
        self.shared.manifest.lock().clone()
    }

    /// Stop supervising and kill the child.
    pub async fn stop(&self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
        // notify_one leaves a permit so a pump that is not yet waiting
        // still observes the stop.
        self.shared.stop_notify.notify_one();
        *self.shared.stdin.lock().await = None;
        fail_pending(&self.shared, "host stopped");
    }

    /// Invoke one of the extension's methods. A propagated deadline bounds
    /// the wait for the reply.
    pub async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
        envelope: Envelope,
    ) -> Result<serde_json::Value, RpcError> {
        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().insert(id.clone(), tx);

        let remaining = envelope.remaining_ms(system_now_ms());
        let frame = CoreToExtension::Req {
            id: id.clone(),
            method: method.to_string(),
            params,
            envelope,
        };
        if let Err(e) = self.write_frame(&frame).await {
            self.shared.pending.lock().remove(&id);
            return Err(e);
        }

        let reply = match remaining {
            Some(ms) => {
                let budget = Duration::from_millis(ms.max(0) as u64);
                match tokio::time::timeout(budget, rx).await {
                    Ok(reply) => reply,
                    Err(_) => {
                        self.shared.pending.lock().remove(&id);
                        return Err(RpcError::deadline_exceeded());
                    }
                }
            }
            None => rx.await,
        };
        match reply {
            Ok(result) => result,
            Err(_) => Err(RpcError::new(
                ErrorKind::ExtensionDied,
                "extension exited before replying",
            )),
        }
    }

    /// Deliver a broadcast event the extension subscribed to.
    pub async fn deliver_event(
        &self,
        event: &str,
        payload: serde_json::Value,
        envelope: Envelope,
    ) -> Result<(), RpcError> {
        self.write_frame(&CoreToExtension::Event {
            event: event.to_string(),
            payload,
            envelope,
        })
        .await
    }

    /// Deliver a source-routed event as a special call and await the ack.
    pub async fn deliver_source_event(
        &self,
        source: &str,
        event: &BusEvent,
    ) -> Result<serde_json::Value, RpcError> {
        self.call(
            SOURCE_RESPONSE_METHOD,
            serde_json::json!({ "source": source, "event": event }),
            Envelope::default(),
        )
        .await
    }

    async fn write_frame(&self, frame: &CoreToExtension) -> Result<(), RpcError> {
        let mut line = serde_json::to_vec(frame)
            .map_err(|e| RpcError::new(ErrorKind::ExternalFailure, e.to_string()))?;
        line.push(b'\n');

        let mut guard = self.shared.stdin.lock().await;
        let Some(stdin) = guard.as_mut() else {
            return Err(RpcError::new(
                ErrorKind::ExtensionDied,
                "extension process not running",
            ));
        };
        stdin
            .write_all(&line)
            .await
            .map_err(|e| RpcError::new(ErrorKind::ExtensionDied, e.to_string()))?;
        stdin
            .flush()
            .await
            .map_err(|e| RpcError::new(ErrorKind::ExtensionDied, e.to_string()))
    }
}

/// Fail every pending call with `ExtensionDied`.
fn fail_pending(shared: &HostShared, reason: &str) {
    let pending: Vec<_> = shared.pending.lock().drain().collect();
    for (_, tx) in pending {
        let _ = tx.send(Err(RpcError::new(ErrorKind::ExtensionDied, reason)));
    }
}

/// The supervision loop: spawn, pump, reap, back off, repeat.
async fn supervise(shared: Arc<HostShared>) {
    let mut attempt: u32 = 0;
    loop {
        if shared.stopped.load(Ordering::SeqCst) {
            break;
        }

        *shared.status.lock() = HostStatus::Spawning;
        match spawn_child(&shared.config) {
            Ok((child, stdin)) => {
                *shared.stdin.lock().await = Some(stdin);
                let clean_exit = pump_child(&shared, child).await;
                *shared.stdin.lock().await = None;
                *shared.status.lock() = HostStatus::Dead;
                fail_pending(&shared, "extension process exited");
                if clean_exit {
                    attempt = 0;
                }
            }
            Err(e) => {
                warn!(entrypoint = %shared.config.entrypoint.display(), error = %e, "spawn failed");
                *shared.status.lock() = HostStatus::Dead;
            }
        }

        if shared.stopped.load(Ordering::SeqCst) {
            break;
        }
        attempt = attempt.saturating_add(1);
        shared.restarts.fetch_add(1, Ordering::SeqCst);
        let delay = backoff_delay(attempt, shared.config.max_backoff);
        debug!(attempt, delay_ms = delay.as_millis() as u64, "restarting extension");
        tokio::time::sleep(delay).await;
    }
}

/// Exponential backoff with jitter, capped.
fn backoff_delay(attempt: u32, max: Duration) -> Duration {
    let exp = BACKOFF_BASE.saturating_mul(2u32.saturating_pow(attempt.min(16)));
    let capped = exp.min(max);
    let jitter = rand::rng().random_range(0.8..1.2);
    capped.mul_f64(jitter).min(max)
}

fn spawn_child(config: &HostConfig) -> Result<(Child, ChildStdin), std::io::Error> {
    let (program, args) = config
        .launcher
        .split_first()
        .ok_or_else(|| std::io::Error::other("empty launcher command"))?;
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.arg(&config.entrypoint);
    if !config.config.is_null() {
        cmd.env("CLAUDIA_EXTENSION_CONFIG", config.config.to_string());
    }
    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::null());
    cmd.kill_on_drop(true);
    let mut child = cmd.spawn()?;
    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| std::io::Error::other("no stdin pipe"))?;
    Ok((child, stdin))
}

/// Pump one child's stdout until it exits. Returns true when the exit was
/// a stop request rather than a crash.
async fn pump_child(shared: &Arc<HostShared>, mut child: Child) -> bool {
    let Some(stdout) = child.stdout.take() else {
        let _ = child.kill().await;
        return false;
    };
    let mut lines = BufReader::new(stdout).lines();
    let mut registered = false;

    loop {
        tokio::select! {
            _ = shared.stop_notify.notified() => {
                let _ = child.kill().await;
                let _ = child.wait().await;
                return true;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let message = match serde_json::from_str::<ExtensionToCore>(trimmed) {
                        Ok(m) => m,
                        Err(e) => {
                            debug!(error = %e, "skipping unparseable extension line");
                            continue;
                        }
                    };
                    handle_message(shared, message, &mut registered).await;
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "extension stdout read error");
                    break;
                }
            }
        }
    }
    let _ = child.wait().await;
    info!(entrypoint = %shared.config.entrypoint.display(), "extension exited");
    shared.stopped.load(Ordering::SeqCst)
}

/// Dispatch one parsed message from the extension.
async fn handle_message(shared: &Arc<HostShared>, message: ExtensionToCore, registered: &mut bool) {
    match message {
        ExtensionToCore::Register { extension } => {
            // Duplicates replace prior state.
            *shared.manifest.lock() = Some(extension.clone());
            *shared.status.lock() = HostStatus::Registered;
            *registered = true;
            let _ = shared.signals.send(HostSignal::Registered(extension)).await;
        }
        _ if !*registered => {
            warn!("extension spoke before registering; dropping message");
        }
        ExtensionToCore::Event {
            event,
            payload,
            source,
            connection_id,
            tags,
        } => {
            let bus_event = BusEvent {
                event,
                payload,
                connection_id: connection_id.map(ConnectionId::new),
                source,
                tags,
            };
            let _ = shared.signals.send(HostSignal::Event(bus_event)).await;
        }
        ExtensionToCore::Res {
            id,
            ok,
            payload,
            error,
        } => {
            let waiter = shared.pending.lock().remove(&id);
            if let Some(tx) = waiter {
                let result = if ok {
                    Ok(payload.unwrap_or(serde_json::Value::Null))
                } else {
                    Err(error.unwrap_or_else(|| {
                        RpcError::new(ErrorKind::ExternalFailure, "extension error")
                    }))
                };
                let _ = tx.send(result);
            } else {
                debug!(id, "res for unknown pending call");
            }
        }
        ExtensionToCore::Call {
            id,
            method,
            params,
            envelope,
        } => {
            let result = route_call(shared, &method, params, envelope).await;
            let frame = match result {
                Ok(payload) => CoreToExtension::CallRes {
                    id,
                    ok: true,
                    payload: Some(payload),
                    error: None,
                },
                Err(error) => CoreToExtension::CallRes {
                    id,
                    ok: false,
                    payload: None,
                    error: Some(error),
                },
            };
            write_frame_shared(shared, &frame).await;
        }
        ExtensionToCore::Unknown => {}
    }
}

/// Apply the call guardrails, then hand the call to the gateway.
async fn route_call(
    shared: &Arc<HostShared>,
    method: &str,
    params: serde_json::Value,
    envelope: Envelope,
) -> Result<serde_json::Value, RpcError> {
    envelope.check_depth()?;
    envelope.check_deadline(system_now_ms())?;

    let (tx, rx) = oneshot::channel();
    let signal = HostSignal::Call {
        method: method.to_string(),
        params,
        envelope,
        respond: tx,
    };
    if shared.signals.send(signal).await.is_err() {
        return Err(RpcError::new(
            ErrorKind::NotSupported,
            "no outgoing call route registered",
        ));
    }
    rx.await.unwrap_or_else(|_| {
        Err(RpcError::new(
            ErrorKind::NotSupported,
            "call dropped without a reply",
        ))
    })
}

fn system_now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Write a frame under the per-host stdin lock.
async fn write_frame_shared(shared: &Arc<HostShared>, frame: &CoreToExtension) {
    let Ok(mut line) = serde_json::to_vec(frame) else {
        return;
    };
    line.push(b'\n');
    let mut guard = shared.stdin.lock().await;
    if let Some(stdin) = guard.as_mut() {
        let _ = stdin.write_all(&line).await;
        let _ = stdin.flush().await;
    }
}

#[cfg(test)]
#[path = "host_tests.rs"]
mod tests;
