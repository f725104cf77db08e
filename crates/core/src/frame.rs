// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client ↔ gateway wire frames.
//!
//! One WebSocket text message carries exactly one JSON object of this shape.
//! Serializes with `{"type": "req" | "res" | "event" | "ping" | "pong"}`.

use crate::error::RpcError;
use crate::id::RequestId;
use serde::{Deserialize, Serialize};

/// Frames a client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    #[serde(rename = "req")]
    Request {
        id: RequestId,
        method: String,
        #[serde(default)]
        params: serde_json::Value,
    },

    #[serde(rename = "pong")]
    Pong { id: RequestId },

    /// Catch-all so newer clients do not kill the connection.
    #[serde(other)]
    Unknown,
}

/// Frames the gateway sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    #[serde(rename = "res")]
    Response {
        id: RequestId,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<RpcError>,
    },

    #[serde(rename = "event")]
    Event {
        event: String,
        payload: serde_json::Value,
    },

    #[serde(rename = "ping")]
    Ping { id: RequestId },
}

impl ServerFrame {
    pub fn ok(id: RequestId, payload: serde_json::Value) -> Self {
        ServerFrame::Response {
            id,
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn err(id: RequestId, error: RpcError) -> Self {
        ServerFrame::Response {
            id,
            ok: false,
            payload: None,
            error: Some(error),
        }
    }

    pub fn event(event: impl Into<String>, payload: serde_json::Value) -> Self {
        ServerFrame::Event {
            event: event.into(),
            payload,
        }
    }

    /// True for frames that may be shed under backpressure.
    ///
    /// Responses and pings must always be delivered; only broadcast events
    /// are candidates, and the hub further restricts shedding to the
    /// documented droppable globs.
    pub fn droppable(&self) -> bool {
        matches!(self, ServerFrame::Event { .. })
    }
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
