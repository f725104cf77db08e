// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transcript entries: immutable once committed, ordered by (timestamp, id).

use crate::db::Store;
use crate::error::StoreError;
use claudia_core::{Role, SessionId, TranscriptEntry};
use rusqlite::{params, Connection, Row};

/// An entry produced by the parser, not yet committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub session_id: SessionId,
    pub source_file: String,
    pub role: Role,
    pub content: String,
    pub tool_names: Option<String>,
    pub timestamp: i64,
    pub cwd: Option<String>,
}

fn row_to_entry(row: &Row<'_>) -> Result<TranscriptEntry, rusqlite::Error> {
    let role: String = row.get(3)?;
    Ok(TranscriptEntry {
        id: row.get(0)?,
        session_id: SessionId::new(row.get::<_, String>(1)?),
        source_file: row.get(2)?,
        role: Role::parse(&role).unwrap_or(Role::User),
        content: row.get(4)?,
        tool_names: row.get(5)?,
        timestamp: row.get(6)?,
        cwd: row.get(7)?,
        ingested_at: row.get(8)?,
    })
}

const COLS: &str = "id, session_id, source_file, role, content, tool_names, \
                    timestamp, cwd, ingested_at";

/// Insert a batch of entries. Callable inside a transaction.
pub(crate) fn insert_entries(
    conn: &Connection,
    entries: &[NewEntry],
    now_ms: i64,
) -> Result<usize, rusqlite::Error> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO entries
         (session_id, source_file, role, content, tool_names, timestamp, cwd, ingested_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    for entry in entries {
        stmt.execute(params![
            entry.session_id.as_str(),
            entry.source_file,
            entry.role.as_str(),
            entry.content,
            entry.tool_names,
            entry.timestamp,
            entry.cwd,
            now_ms
        ])?;
    }
    Ok(entries.len())
}

/// Delete every entry for a file. Callable inside a transaction.
pub(crate) fn delete_entries_for_file(
    conn: &Connection,
    source_file: &str,
) -> Result<usize, rusqlite::Error> {
    conn.execute("DELETE FROM entries WHERE source_file = ?1", [source_file])
}

/// Delete entries strictly newer than `after_ts`. Callable inside a
/// transaction; used by crash recovery to roll back an in-flight pass.
pub(crate) fn delete_entries_after(
    conn: &Connection,
    source_file: &str,
    after_ts: i64,
) -> Result<usize, rusqlite::Error> {
    conn.execute(
        "DELETE FROM entries WHERE source_file = ?1 AND timestamp > ?2",
        params![source_file, after_ts],
    )
}

/// All entries for a file in (timestamp, id) order. Callable inside a
/// transaction so segmentation sees the pass's own inserts.
pub(crate) fn entries_for_file(
    conn: &Connection,
    source_file: &str,
) -> Result<Vec<TranscriptEntry>, rusqlite::Error> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {COLS} FROM entries WHERE source_file = ?1 ORDER BY timestamp, id"
    ))?;
    let rows = stmt.query_map([source_file], row_to_entry)?;
    rows.collect()
}

impl Store {
    pub fn entries_for_file(&self, source_file: &str) -> Result<Vec<TranscriptEntry>, StoreError> {
        self.with_conn(|conn| entries_for_file(conn, source_file))
    }

    /// Entries inside a conversation's time window, in order.
    pub fn entries_in_range(
        &self,
        source_file: &str,
        first_ts: i64,
        last_ts: i64,
    ) -> Result<Vec<TranscriptEntry>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {COLS} FROM entries
                 WHERE source_file = ?1 AND timestamp >= ?2 AND timestamp <= ?3
                 ORDER BY timestamp, id"
            ))?;
            let rows = stmt.query_map(params![source_file, first_ts, last_ts], row_to_entry)?;
            rows.collect()
        })
    }

    pub fn entry_count_for_file(&self, source_file: &str) -> Result<i64, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM entries WHERE source_file = ?1",
                [source_file],
                |row| row.get(0),
            )
        })
    }
}

#[cfg(test)]
#[path = "entries_tests.rs"]
mod tests;
