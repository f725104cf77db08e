// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket server surface.
//!
//! One route: `GET /ws` upgrades to the frame protocol; `GET /healthz`
//! answers the supervisor's probes. One WebSocket text message carries one
//! JSON frame.

use crate::app::Gateway;
use crate::connection::{serve_connection, FrameTransport};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use claudia_core::SystemClock;
use std::sync::Arc;
use tracing::info;

/// Build the router.
pub fn router(gateway: Arc<Gateway<SystemClock>>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/healthz", get(healthz))
        .with_state(gateway)
}

/// Bind and serve until the process is stopped.
pub async fn serve(gateway: Arc<Gateway<SystemClock>>, bind: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "gateway listening");
    axum::serve(listener, router(gateway)).await
}

async fn healthz(State(gateway): State<Arc<Gateway<SystemClock>>>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "ok": true,
        "connections": gateway.hub.connection_count(),
    }))
}

async fn ws_handler(
    State(gateway): State<Arc<Gateway<SystemClock>>>,
    upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| async move {
        let transport = WsTransport { socket };
        serve_connection(transport, Arc::clone(&gateway.dispatcher), gateway.hub.clone()).await;
    })
}

struct WsTransport {
    socket: WebSocket,
}

impl FrameTransport for WsTransport {
    async fn next(&mut self) -> Option<Result<String, String>> {
        loop {
            match self.socket.recv().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(text.to_string())),
                Some(Ok(Message::Close(_))) | None => return None,
                // Transport-level pings are handled by axum; other frame
                // kinds are not part of the protocol.
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Some(Err(e.to_string())),
            }
        }
    }

    async fn send(&mut self, frame: String) -> Result<(), String> {
        self.socket
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| e.to_string())
    }
}
