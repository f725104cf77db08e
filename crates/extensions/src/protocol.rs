// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The framed stdio protocol between the core and an extension.
//!
//! One JSON object per line in both directions. The first message an
//! extension sends must be `register`; a duplicate `register` replaces the
//! prior manifest.

use claudia_core::{Envelope, RpcError};
use serde::{Deserialize, Serialize};

/// One method an extension offers, by fully-qualified name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodDecl {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<serde_json::Value>,
}

/// What an extension registers: identity, methods, events, source routes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionManifest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub methods: Vec<MethodDecl>,
    /// Event-name globs the extension wants delivered.
    #[serde(default)]
    pub events: Vec<String>,
    /// Source routing tokens owned by this extension.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_routes: Vec<String>,
}

/// Messages an extension sends to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtensionToCore {
    Register {
        extension: ExtensionManifest,
    },

    Event {
        event: String,
        payload: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
        #[serde(
            default,
            rename = "connectionId",
            skip_serializing_if = "Option::is_none"
        )]
        connection_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tags: Option<serde_json::Value>,
    },

    /// Reply to a core-initiated `req`.
    Res {
        id: String,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<RpcError>,
    },

    /// The extension invokes another method through the core.
    Call {
        id: String,
        method: String,
        #[serde(default)]
        params: serde_json::Value,
        #[serde(flatten)]
        envelope: Envelope,
    },

    #[serde(other)]
    Unknown,
}

/// Messages the core sends to an extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoreToExtension {
    /// Invoke one of the extension's registered methods.
    Req {
        id: String,
        method: String,
        #[serde(default)]
        params: serde_json::Value,
        #[serde(flatten)]
        envelope: Envelope,
    },

    /// A broadcast event matching one of the extension's subscriptions.
    Event {
        event: String,
        payload: serde_json::Value,
        #[serde(flatten)]
        envelope: Envelope,
    },

    /// Reply to an extension-initiated `call`.
    CallRes {
        id: String,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<RpcError>,
    },
}

/// Method name of the special request delivering a source-routed event.
pub const SOURCE_RESPONSE_METHOD: &str = "__sourceResponse";

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
