// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Claudia gateway daemon (claudiad)
//!
//! Long-lived process that multiplexes WebSocket clients, supervises
//! extension hosts, manages agent sessions, ingests external session
//! logs, and runs the librarian worker.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use claudia_gateway::{app::GatewayDeps, Config, Gateway};
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("claudiad {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("claudiad {}", env!("CARGO_PKG_VERSION"));
                println!("Claudia gateway daemon - the control plane behind the web client");
                println!();
                println!("USAGE:");
                println!("    claudiad");
                println!();
                println!("Listens for WebSocket clients on the configured bind address");
                println!("(default 127.0.0.1:4600). Configure via");
                println!("$CLAUDIA_DATA_DIR/config.toml.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            other => {
                eprintln!("error: unexpected argument '{other}'");
                eprintln!("Usage: claudiad [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;
    std::fs::create_dir_all(&config.data_dir)?;

    rotate_log_if_needed(&config.log_path());
    let _log_guard = setup_logging(&config)?;

    info!("starting gateway");
    let gateway = match Gateway::build(&config, GatewayDeps::from_config(&config)) {
        Ok(gateway) => gateway,
        Err(e) => {
            error!("failed to assemble gateway: {e}");
            return Err(e.into());
        }
    };

    // Signal ready for whoever is waiting on startup (supervisor, CLI).
    println!("READY");

    let bind = config.bind.clone();
    let server = {
        let gateway = std::sync::Arc::clone(&gateway);
        tokio::spawn(async move {
            if let Err(e) = claudia_gateway::server::serve(gateway, &bind).await {
                error!("server error: {e}");
            }
        })
    };

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }

    server.abort();
    // Give in-flight deliveries a beat before tearing sessions down.
    tokio::time::sleep(Duration::from_millis(100)).await;
    gateway.shutdown().await;
    info!("gateway stopped");
    Ok(())
}

/// Maximum log file size before rotation (10 MiB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Rotated logs to keep (gateway.log.1, .2).
const MAX_ROTATED_LOGS: u32 = 2;

/// Rotate the log file if it exceeds [`MAX_LOG_SIZE`].
///
/// Shifts `gateway.log` → `.1` → `.2`, deleting the oldest. Best-effort:
/// rotation failures must not stop the daemon.
fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };
    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, std::io::Error> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let log_path = config.log_path();
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let dir = log_path
        .parent()
        .map(std::path::Path::to_path_buf)
        .unwrap_or_else(|| std::path::PathBuf::from("."));
    let file = log_path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_else(|| "gateway.log".into());
    let file_appender = tracing_appender::rolling::never(dir, file);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
