// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session append-only event journal.
//!
//! Every event the manager fans out is also appended to
//! `sessions/<sessionId>/events.jsonl` under the data directory. Append
//! failures are logged and swallowed; the journal is an audit artifact, not
//! a dependency of the live stream.

use claudia_core::SessionId;
use std::io::Write;
use std::path::PathBuf;
use tracing::warn;

/// Appends journal lines for sessions under one base directory.
#[derive(Debug, Clone)]
pub struct SessionJournal {
    base: PathBuf,
}

impl SessionJournal {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn path_for(&self, session_id: &SessionId) -> PathBuf {
        self.base.join(session_id.as_str()).join("events.jsonl")
    }

    /// Append one event line: `{"ts":…,"event":…,"payload":…}`.
    pub fn append(&self, session_id: &SessionId, ts_ms: i64, event: &str, payload: &serde_json::Value) {
        let line = serde_json::json!({
            "ts": ts_ms,
            "event": event,
            "payload": payload,
        });
        if let Err(e) = self.append_line(session_id, &line.to_string()) {
            warn!(session_id = %session_id, error = %e, "journal append failed");
        }
    }

    fn append_line(&self, session_id: &SessionId, line: &str) -> std::io::Result<()> {
        let path = self.path_for(session_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        writeln!(file, "{line}")
    }

    /// Read a session's journal back as parsed lines (newest last).
    pub fn read(&self, session_id: &SessionId) -> Vec<serde_json::Value> {
        let Ok(content) = std::fs::read_to_string(self.path_for(session_id)) else {
            return Vec::new();
        };
        content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }
}

#[cfg(test)]
#[path = "journal_tests.rs"]
mod tests;
