// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File watcher driving the pipeline incrementally.
//!
//! Filesystem notifications are debounced into a pending set; a single
//! worker drains the set one file at a time, so two events for the same
//! file can never interleave and the directory pass stays serial.

use crate::pipeline::IngestPipeline;
use claudia_core::Clock;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Debounce window between a write burst and the file's pass.
const DEBOUNCE: Duration = Duration::from_millis(400);

/// Interval for the readiness-promotion poll.
const PROMOTE_INTERVAL: Duration = Duration::from_secs(30);

/// Running watcher; dropping the handle stops it.
pub struct WatcherHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl WatcherHandle {
    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Watches the log base directory and feeds the pipeline.
pub struct LogWatcher<C: Clock> {
    pipeline: Arc<IngestPipeline<C>>,
}

impl<C: Clock> LogWatcher<C> {
    pub fn new(pipeline: Arc<IngestPipeline<C>>) -> Self {
        Self { pipeline }
    }

    /// Start watching. Performs recovery and one full directory pass first,
    /// then processes debounced notifications until shutdown.
    pub fn start(self) -> Result<WatcherHandle, notify::Error> {
        let (event_tx, event_rx) = mpsc::channel::<PathBuf>(256);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let base = self.pipeline.base_dir().to_path_buf();
        let mut watcher: RecommendedWatcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                if let Ok(event) = res {
                    if matches!(
                        event.kind,
                        notify::EventKind::Create(_) | notify::EventKind::Modify(_)
                    ) {
                        for path in event.paths {
                            let _ = event_tx.blocking_send(path);
                        }
                    }
                }
            })?;
        watcher.watch(&base, RecursiveMode::Recursive)?;

        tokio::spawn(watch_loop(self.pipeline, watcher, event_rx, shutdown_rx));

        Ok(WatcherHandle {
            shutdown_tx: Some(shutdown_tx),
        })
    }
}

async fn watch_loop<C: Clock>(
    pipeline: Arc<IngestPipeline<C>>,
    _watcher: RecommendedWatcher,
    mut event_rx: mpsc::Receiver<PathBuf>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    if let Err(e) = pipeline.recover() {
        warn!(error = %e, "ingestion recovery failed");
    }
    match pipeline.ingest_directory() {
        Ok(stats) => info!(
            files = stats.files_processed,
            entries = stats.entries_inserted,
            failed = stats.files_failed,
            "initial directory pass complete"
        ),
        Err(e) => warn!(error = %e, "initial directory pass failed"),
    }

    let mut pending: BTreeSet<PathBuf> = BTreeSet::new();
    let mut flush = tokio::time::interval(DEBOUNCE);
    let mut promote = tokio::time::interval(PROMOTE_INTERVAL);

    loop {
        tokio::select! {
            Some(path) = event_rx.recv() => {
                if is_log_file(&path) {
                    pending.insert(path);
                }
            }

            _ = flush.tick() => {
                // Drain serially; one file at a time, never interleaved.
                while let Some(path) = pending.pop_first() {
                    let pipeline = Arc::clone(&pipeline);
                    let result = tokio::task::spawn_blocking(move || {
                        pipeline.ingest_file(&path)
                    }).await;
                    match result {
                        Ok(Ok(stats)) => {
                            if stats.entries_inserted > 0 {
                                debug!(entries = stats.entries_inserted, "ingested");
                            }
                        }
                        Ok(Err(e)) => warn!(error = %e, "file pass failed"),
                        Err(e) => warn!(error = %e, "file pass panicked"),
                    }
                }
            }

            _ = promote.tick() => {
                if let Err(e) = pipeline.promote_ready() {
                    warn!(error = %e, "readiness promotion failed");
                }
            }

            _ = &mut shutdown_rx => {
                debug!("watcher shutdown requested");
                break;
            }
        }
    }
}

fn is_log_file(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ext == "jsonl" || ext == "log")
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
