// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! claudia-supervisor: process supervision and the local dashboard.
//!
//! An independent process that hosts the gateway and worker services in a
//! terminal multiplexer, health-checks them over HTTP, restarts them with
//! exponential backoff, and serves a small dashboard. Services are started
//! detached and survive supervisor restarts; live agent children of a
//! crashed gateway are orphaned, never adopted.

pub mod dashboard;
pub mod services;
pub mod tmux;

pub use dashboard::{router, DashboardState};
pub use services::{ServiceSpec, ServiceState, Supervisor, SupervisorConfig};
pub use tmux::TmuxSessions;
