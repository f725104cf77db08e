// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection frame handling.
//!
//! Inbound frames are processed in receive order; each connection owns a
//! bounded outbound queue drained by a writer task. The gateway pings idle
//! connections and closes those that miss two consecutive pongs. Exactly
//! one response is emitted per request id; a disconnected client gets
//! nothing.

use crate::dispatch::Dispatcher;
use crate::hub::{HubHandle, OUTBOUND_BACKLOG};
use claudia_core::{
    Clock, ClientFrame, ConnectionId, Envelope, RequestId, RpcError, ServerFrame,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Idle interval between liveness pings.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Consecutive unanswered pings before the connection is closed.
const MAX_MISSED_PONGS: u32 = 2;

/// Wire transport for one client, as the connection task sees it.
///
/// The WebSocket layer adapts the real socket; tests drive channels.
pub trait FrameTransport: Send + 'static {
    fn next(
        &mut self,
    ) -> impl std::future::Future<Output = Option<Result<String, String>>> + Send;
    fn send(
        &mut self,
        frame: String,
    ) -> impl std::future::Future<Output = Result<(), String>> + Send;
}

/// Drive one client connection until it disconnects.
pub async fn serve_connection<T, C>(
    mut transport: T,
    dispatcher: Arc<Dispatcher<C>>,
    hub: HubHandle,
) where
    T: FrameTransport,
    C: Clock,
{
    let connection_id = ConnectionId::generate();
    info!(connection = %connection_id, "client connected");

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerFrame>(OUTBOUND_BACKLOG);
    hub.attach(connection_id.clone(), outbound_tx.clone());

    let missed_pongs = Arc::new(AtomicU32::new(0));
    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; swallow it.
    ping.tick().await;

    loop {
        tokio::select! {
            // Outbound queue → wire.
            frame = outbound_rx.recv() => {
                let Some(frame) = frame else { break };
                let Ok(text) = serde_json::to_string(&frame) else { continue };
                if transport.send(text).await.is_err() {
                    break;
                }
            }

            // Wire → dispatch, in receive order.
            inbound = transport.next() => {
                match inbound {
                    Some(Ok(text)) => {
                        if let Some(frame) = parse_frame(&text) {
                            handle_frame(
                                frame,
                                &connection_id,
                                &dispatcher,
                                &outbound_tx,
                                &missed_pongs,
                            )
                            .await;
                        }
                    }
                    Some(Err(e)) => {
                        debug!(connection = %connection_id, error = %e, "read error");
                        break;
                    }
                    None => break,
                }
            }

            // Liveness.
            _ = ping.tick() => {
                let missed = missed_pongs.fetch_add(1, Ordering::SeqCst);
                if missed >= MAX_MISSED_PONGS {
                    warn!(connection = %connection_id, "liveness window elapsed, closing");
                    break;
                }
                let _ = outbound_tx
                    .send(ServerFrame::Ping { id: RequestId::generate() })
                    .await;
            }
        }
    }

    hub.detach(&connection_id);
    info!(connection = %connection_id, "client disconnected");
}

fn parse_frame(text: &str) -> Option<ClientFrame> {
    match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => Some(frame),
        Err(e) => {
            debug!(error = %e, "unparseable client frame");
            None
        }
    }
}

async fn handle_frame<C: Clock>(
    frame: ClientFrame,
    connection_id: &ConnectionId,
    dispatcher: &Arc<Dispatcher<C>>,
    outbound: &mpsc::Sender<ServerFrame>,
    missed_pongs: &Arc<AtomicU32>,
) {
    match frame {
        ClientFrame::Request { id, method, params } => {
            let mut envelope = Envelope::for_connection(connection_id.clone());
            let deadline = params
                .get("deadlineMs")
                .or_else(|| params.get("deadline_ms"))
                .and_then(|v| v.as_i64());
            if let Some(deadline) = deadline {
                envelope.deadline_ms = Some(deadline);
            }
            let response = match dispatcher.dispatch(&method, params, &envelope).await {
                Ok(payload) => ServerFrame::ok(id, payload),
                Err(error) => ServerFrame::err(id, error),
            };
            // Responses are never shed.
            let _ = outbound.send(response).await;
        }
        ClientFrame::Pong { .. } => {
            missed_pongs.store(0, Ordering::SeqCst);
        }
        ClientFrame::Unknown => {
            // Tolerated; a future client may speak newer frames.
        }
    }
}

/// Build an error response frame (used by the server layer for oversized
/// or malformed payloads it rejects before dispatch).
pub fn reject(id: RequestId, error: RpcError) -> ServerFrame {
    ServerFrame::err(id, error)
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
