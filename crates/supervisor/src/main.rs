// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Claudia supervisor
//!
//! Hosts the gateway in a terminal multiplexer, health-checks it, restarts
//! it with backoff, and serves the dashboard on a local port.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use claudia_supervisor::{router, DashboardState, ServiceSpec, Supervisor, SupervisorConfig};
use std::sync::Arc;
use tracing::info;

const DEFAULT_DASHBOARD_BIND: &str = "127.0.0.1:4610";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cwd = std::env::current_dir()?;
    let gateway_cmd =
        std::env::var("CLAUDIA_GATEWAY_CMD").unwrap_or_else(|_| "claudiad".to_string());
    let gateway_health = std::env::var("CLAUDIA_GATEWAY_HEALTH")
        .unwrap_or_else(|_| "http://127.0.0.1:4600/healthz".to_string());

    let supervisor = Supervisor::new(
        vec![ServiceSpec {
            name: "gateway".to_string(),
            command: gateway_cmd,
            cwd,
            health_url: gateway_health,
        }],
        SupervisorConfig::default(),
    );
    tokio::spawn(Arc::clone(&supervisor).run());

    let bind = std::env::var("CLAUDIA_DASHBOARD_BIND")
        .unwrap_or_else(|_| DEFAULT_DASHBOARD_BIND.to_string());
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(addr = %listener.local_addr()?, "dashboard listening");
    axum::serve(listener, router(DashboardState { supervisor })).await?;
    Ok(())
}
