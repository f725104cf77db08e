// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-request envelope propagated across method dispatch.
//!
//! Every inbound request implicitly carries an envelope; handlers that make
//! nested calls derive a child envelope so tracing, routing tags, and the
//! deadline flow through. Depth is bounded to break call cycles between
//! extensions.

use crate::error::{ErrorKind, RpcError};
use crate::id::{ConnectionId, TraceId};
use serde::{Deserialize, Serialize};

/// Compile-time maximum nested call depth. The ninth nested call fails.
pub const MAX_CALL_DEPTH: u8 = 8;

/// Context travelling with a request through dispatch and nested calls.
///
/// On the extension wire the fields appear camelCased (`connectionId`,
/// `deadlineMs`, …), matching the framed protocol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Originating client connection, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<ConnectionId>,
    /// Free-form routing tags supplied by the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<serde_json::Value>,
    /// Source routing token (e.g. a phone number, a browser tab).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Correlation id; minted at the edge when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<TraceId>,
    /// Nested call depth, 0 at the edge.
    #[serde(default)]
    pub depth: u8,
    /// Absolute deadline in epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<i64>,
}

impl Envelope {
    /// Envelope for a request arriving on a client connection.
    pub fn for_connection(connection_id: ConnectionId) -> Self {
        Self {
            connection_id: Some(connection_id),
            trace_id: Some(TraceId::generate()),
            ..Self::default()
        }
    }

    /// Derive the envelope for a nested call made while handling this one.
    ///
    /// Increments depth and keeps everything else. Callers must check
    /// [`Envelope::check_depth`] on the derived value before dispatching.
    pub fn child(&self) -> Self {
        let mut child = self.clone();
        child.depth = self.depth.saturating_add(1);
        if child.trace_id.is_none() {
            child.trace_id = Some(TraceId::generate());
        }
        child
    }

    /// Fail with `CallCycle` when the depth bound is exceeded.
    pub fn check_depth(&self) -> Result<(), RpcError> {
        if self.depth > MAX_CALL_DEPTH {
            Err(RpcError::call_cycle(self.depth))
        } else {
            Ok(())
        }
    }

    /// Fail with `DeadlineExceeded` when the deadline already passed.
    pub fn check_deadline(&self, now_ms: i64) -> Result<(), RpcError> {
        match self.deadline_ms {
            Some(deadline) if deadline <= now_ms => Err(RpcError::new(
                ErrorKind::DeadlineExceeded,
                format!("deadline passed {}ms ago", now_ms - deadline),
            )),
            _ => Ok(()),
        }
    }

    /// Milliseconds of budget remaining, if a deadline is set.
    pub fn remaining_ms(&self, now_ms: i64) -> Option<i64> {
        self.deadline_ms.map(|d| d - now_ms)
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
