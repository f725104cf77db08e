// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! claudia-extensions: out-of-process extension hosts.
//!
//! Each extension runs as a subprocess speaking line-delimited JSON on its
//! stdio. The supervisor spawns it, expects a `register` message first,
//! routes calls both directions with depth/deadline guardrails, reaps
//! exits, and restarts with capped exponential backoff.

pub mod host;
pub mod protocol;
pub mod registry;

pub use host::{ExtensionHost, HostConfig, HostSignal, HostSnapshot, HostStatus};
pub use protocol::{CoreToExtension, ExtensionManifest, ExtensionToCore, MethodDecl};
pub use registry::ExtensionRegistry;
