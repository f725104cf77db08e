// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The local HTTP dashboard.
//!
//! `GET /` renders a minimal HTML table, `GET /status` the JSON view,
//! `GET /api/logs/<name>` a service's captured pane, and
//! `POST /restart/<service>` forces a restart.

use crate::services::Supervisor;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

#[derive(Clone)]
pub struct DashboardState {
    pub supervisor: Arc<Supervisor>,
}

pub fn router(state: DashboardState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/status", get(status))
        .route("/api/logs", get(logs_index))
        .route("/api/logs/{name}", get(logs))
        .route("/restart/{service}", post(restart))
        .with_state(state)
}

async fn index(State(state): State<DashboardState>) -> Html<String> {
    let mut rows = String::new();
    for service in state.supervisor.states() {
        let status = if service.healthy { "up" } else { "down" };
        rows.push_str(&format!(
            "<tr><td>{}</td><td class=\"{status}\">{status}</td><td>{}</td><td>{}</td></tr>\n",
            service.name,
            service.restarts,
            service.last_error.unwrap_or_default(),
        ));
    }
    Html(format!(
        "<!doctype html><html><head><title>claudia</title><style>\
         body{{font-family:monospace;margin:2rem}}table{{border-collapse:collapse}}\
         td,th{{border:1px solid #888;padding:4px 10px}}\
         .up{{color:green}}.down{{color:red}}</style></head><body>\
         <h1>claudia supervisor</h1>\
         <table><tr><th>service</th><th>status</th><th>restarts</th><th>last error</th></tr>\
         {rows}</table></body></html>"
    ))
}

async fn status(State(state): State<DashboardState>) -> impl IntoResponse {
    axum::Json(serde_json::json!({ "services": state.supervisor.states() }))
}

async fn logs_index(State(state): State<DashboardState>) -> impl IntoResponse {
    axum::Json(serde_json::json!({ "services": state.supervisor.service_names() }))
}

async fn logs(
    State(state): State<DashboardState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.supervisor.capture_logs(&name, 200).await {
        Some(output) => (StatusCode::OK, output),
        None => (StatusCode::NOT_FOUND, format!("no logs for {name}\n")),
    }
}

async fn restart(
    State(state): State<DashboardState>,
    Path(service): Path<String>,
) -> impl IntoResponse {
    if state.supervisor.restart(&service).await {
        (StatusCode::OK, format!("restarted {service}\n"))
    } else {
        (StatusCode::NOT_FOUND, format!("unknown service {service}\n"))
    }
}

#[cfg(test)]
#[path = "dashboard_tests.rs"]
mod tests;
