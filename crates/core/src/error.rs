// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The error taxonomy carried in response frames.
//!
//! Every failure that crosses the RPC boundary is one of these kinds; the
//! originating message is preserved alongside. Internal crates use their own
//! thiserror enums and convert at the boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Kind tags for RPC-visible failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No handler registered for the requested method.
    UnknownMethod,
    /// Params failed schema or shape validation.
    InvalidParams,
    /// The operation needs a prerequisite the caller omitted (e.g. `cwd`
    /// when resuming an unknown session).
    MissingContext,
    /// The request's deadline elapsed before dispatch or completion.
    DeadlineExceeded,
    /// The request was cancelled.
    Canceled,
    /// A chain of nested calls exceeded the depth bound.
    CallCycle,
    /// The host has no route for this kind of call.
    NotSupported,
    /// The extension process exited while the call was pending.
    ExtensionDied,
    /// The extension's `register` message was malformed or out of order.
    ExtensionRegisterFailed,
    /// The session was closed before or during the operation.
    SessionClosed,
    /// No session with the given id.
    SessionNotFound,
    /// A store write conflicted with concurrent state.
    StoreConflict,
    /// The store could not be reached within the busy-wait bound.
    StoreUnavailable,
    /// A collaborator outside the core failed; message carries the cause.
    ExternalFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnknownMethod => "unknown_method",
            ErrorKind::InvalidParams => "invalid_params",
            ErrorKind::MissingContext => "missing_context",
            ErrorKind::DeadlineExceeded => "deadline_exceeded",
            ErrorKind::Canceled => "canceled",
            ErrorKind::CallCycle => "call_cycle",
            ErrorKind::NotSupported => "not_supported",
            ErrorKind::ExtensionDied => "extension_died",
            ErrorKind::ExtensionRegisterFailed => "extension_register_failed",
            ErrorKind::SessionClosed => "session_closed",
            ErrorKind::SessionNotFound => "session_not_found",
            ErrorKind::StoreConflict => "store_conflict",
            ErrorKind::StoreUnavailable => "store_unavailable",
            ErrorKind::ExternalFailure => "external_failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The tagged error value placed in the `error` field of a response.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct RpcError {
    pub kind: ErrorKind,
    pub message: String,
}

impl RpcError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unknown_method(method: &str) -> Self {
        Self::new(ErrorKind::UnknownMethod, format!("unknown method: {method}"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParams, message)
    }

    pub fn missing_context(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MissingContext, message)
    }

    pub fn deadline_exceeded() -> Self {
        Self::new(ErrorKind::DeadlineExceeded, "deadline elapsed")
    }

    pub fn call_cycle(depth: u8) -> Self {
        Self::new(
            ErrorKind::CallCycle,
            format!("call depth {depth} exceeds bound (possible cycle)"),
        )
    }

    pub fn extension_died(extension: &str) -> Self {
        Self::new(
            ErrorKind::ExtensionDied,
            format!("extension exited: {extension}"),
        )
    }

    pub fn session_not_found(id: &str) -> Self {
        Self::new(ErrorKind::SessionNotFound, format!("no session: {id}"))
    }

    pub fn external(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExternalFailure, message)
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
