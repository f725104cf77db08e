// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Service supervision.
//!
//! Each managed service declares a spawn command and a health URL. The
//! supervisor polls health, restarts unhealthy services with capped
//! exponential backoff, and exposes per-service state to the dashboard.
//! A healthy check resets the backoff.

use crate::tmux::TmuxSessions;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// One managed service.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub name: String,
    pub command: String,
    pub cwd: PathBuf,
    /// HTTP endpoint answering 200 when healthy.
    pub health_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceState {
    pub name: String,
    pub healthy: bool,
    pub restarts: u32,
    pub last_error: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub check_interval: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(5),
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
        }
    }
}

struct ServiceRuntime {
    spec: ServiceSpec,
    state: ServiceState,
    failures: u32,
    /// Earliest instant the next restart may run.
    cooldown_until: Option<tokio::time::Instant>,
}

/// Supervises the configured services.
pub struct Supervisor {
    tmux: TmuxSessions,
    config: SupervisorConfig,
    client: reqwest::Client,
    services: Mutex<HashMap<String, ServiceRuntime>>,
}

impl Supervisor {
    pub fn new(specs: Vec<ServiceSpec>, config: SupervisorConfig) -> Arc<Self> {
        let services = specs
            .into_iter()
            .map(|spec| {
                let runtime = ServiceRuntime {
                    state: ServiceState {
                        name: spec.name.clone(),
                        healthy: false,
                        restarts: 0,
                        last_error: None,
                        session_id: None,
                    },
                    spec,
                    failures: 0,
                    cooldown_until: None,
                };
                (runtime.spec.name.clone(), runtime)
            })
            .collect();
        Arc::new(Self {
            tmux: TmuxSessions::new(),
            config,
            client: reqwest::Client::new(),
            services: Mutex::new(services),
        })
    }

    pub fn states(&self) -> Vec<ServiceState> {
        let services = self.services.lock();
        let mut states: Vec<ServiceState> =
            services.values().map(|s| s.state.clone()).collect();
        states.sort_by(|a, b| a.name.cmp(&b.name));
        states
    }

    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Run the supervision loop forever.
    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.check_interval);
        loop {
            interval.tick().await;
            let names = self.service_names();
            for name in names {
                self.check_one(&name).await;
            }
        }
    }

    async fn check_one(&self, name: &str) {
        let (health_url, cooldown) = {
            let services = self.services.lock();
            let Some(runtime) = services.get(name) else {
                return;
            };
            (runtime.spec.health_url.clone(), runtime.cooldown_until)
        };

        let healthy = self.probe(&health_url).await;
        if healthy {
            let mut services = self.services.lock();
            if let Some(runtime) = services.get_mut(name) {
                runtime.state.healthy = true;
                runtime.state.last_error = None;
                runtime.failures = 0;
                runtime.cooldown_until = None;
            }
            return;
        }

        // Unhealthy; restart unless still cooling down.
        if let Some(until) = cooldown {
            if tokio::time::Instant::now() < until {
                return;
            }
        }
        self.restart(name).await;
    }

    async fn probe(&self, url: &str) -> bool {
        match self
            .client
            .get(url)
            .timeout(Duration::from_secs(3))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// (Re)start a service. Also the `/restart/<service>` entrypoint.
    pub async fn restart(&self, name: &str) -> bool {
        let spec = {
            let services = self.services.lock();
            match services.get(name) {
                Some(runtime) => runtime.spec.clone(),
                None => return false,
            }
        };

        info!(service = name, "restarting");
        let result = self.tmux.spawn(&spec.name, &spec.cwd, &spec.command).await;

        let mut services = self.services.lock();
        let Some(runtime) = services.get_mut(name) else {
            return false;
        };
        match result {
            Ok(session_id) => {
                runtime.state.session_id = Some(session_id);
                runtime.state.restarts = runtime.state.restarts.saturating_add(1);
                runtime.state.healthy = false;
                runtime.failures = runtime.failures.saturating_add(1);
                let backoff = backoff_delay(
                    runtime.failures,
                    self.config.backoff_base,
                    self.config.backoff_max,
                );
                runtime.cooldown_until = Some(tokio::time::Instant::now() + backoff);
                true
            }
            Err(e) => {
                warn!(service = name, error = %e, "restart failed");
                runtime.state.last_error = Some(e.to_string());
                runtime.failures = runtime.failures.saturating_add(1);
                let backoff = backoff_delay(
                    runtime.failures,
                    self.config.backoff_base,
                    self.config.backoff_max,
                );
                runtime.cooldown_until = Some(tokio::time::Instant::now() + backoff);
                false
            }
        }
    }

    /// Pane output for the dashboard's log view.
    pub async fn capture_logs(&self, name: &str, lines: u32) -> Option<String> {
        let session_id = {
            let services = self.services.lock();
            services.get(name)?.state.session_id.clone()?
        };
        self.tmux.capture_output(&session_id, lines).await.ok()
    }
}

/// Exponential backoff, capped.
pub(crate) fn backoff_delay(failures: u32, base: Duration, max: Duration) -> Duration {
    base.saturating_mul(2u32.saturating_pow(failures.saturating_sub(1).min(16)))
        .min(max)
}

#[cfg(test)]
#[path = "services_tests.rs"]
mod tests;
