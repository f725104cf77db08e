// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-ingestion state and the transactional file pass.
//!
//! The two-phase protocol: `mark_ingesting` captures the high-water mark,
//! `commit_file_pass` applies one pass (delete/insert/rebuild) atomically,
//! `mark_idle` advances the offset. Crash recovery rolls back any file left
//! in `ingesting` and flags it for a full re-import.

use crate::conversations::{rebuild_conversations, SegmentSpec};
use crate::db::Store;
use crate::entries::{
    delete_entries_after, delete_entries_for_file, entries_for_file, insert_entries, NewEntry,
};
use crate::error::StoreError;
use claudia_core::{FileIngestState, IngestStatus, TranscriptEntry};
use rusqlite::{params, OptionalExtension, Row};
use tracing::{info, warn};

/// Outcome of one committed file pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassStats {
    pub entries_inserted: usize,
    pub conversations_upserted: usize,
    pub conversations_removed: usize,
    pub max_entry_ts: Option<i64>,
}

fn row_to_state(row: &Row<'_>) -> Result<FileIngestState, rusqlite::Error> {
    let status: String = row.get(2)?;
    Ok(FileIngestState {
        file_key: row.get(0)?,
        source: row.get(1)?,
        status: IngestStatus::parse(&status).unwrap_or_default(),
        last_modified: row.get(3)?,
        file_size: row.get(4)?,
        last_processed_offset: row.get(5)?,
        last_entry_ts: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

const COLS: &str = "file_key, source, status, last_modified, file_size, \
                    last_processed_offset, last_entry_ts, created_at, updated_at";

impl Store {
    pub fn file_state(&self, file_key: &str) -> Result<Option<FileIngestState>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {COLS} FROM ingest_files WHERE file_key = ?1"),
                [file_key],
                row_to_state,
            )
            .optional()
        })
    }

    /// Whether recovery flagged this file for a full re-import.
    pub fn file_needs_reimport(&self, file_key: &str) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let flag: Option<i64> = conn
                .query_row(
                    "SELECT force_reimport FROM ingest_files WHERE file_key = ?1",
                    [file_key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(flag.unwrap_or(0) != 0)
        })
    }

    /// Request a full re-import on the next pass (manual repair surface).
    pub fn file_request_reimport(&self, file_key: &str, now_ms: i64) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE ingest_files SET force_reimport = 1, updated_at = ?2 WHERE file_key = ?1",
                params![file_key, now_ms],
            )?;
            Ok(changed > 0)
        })
    }

    /// Phase 1: upsert the row and mark it `ingesting`, capturing the byte
    /// size this pass will read up to.
    pub fn file_mark_ingesting(
        &self,
        file_key: &str,
        source: &str,
        file_size: i64,
        last_modified: i64,
        now_ms: i64,
    ) -> Result<FileIngestState, StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO ingest_files
                 (file_key, source, status, last_modified, file_size, created_at, updated_at)
                 VALUES (?1, ?2, 'ingesting', ?3, ?4, ?5, ?5)
                 ON CONFLICT(file_key) DO UPDATE SET
                     status = 'ingesting',
                     last_modified = ?3,
                     file_size = ?4,
                     updated_at = ?5",
                params![file_key, source, last_modified, file_size, now_ms],
            )?;
            Ok(())
        })?;
        self.file_state(file_key)?
            .ok_or_else(|| StoreError::Conflict(format!("ingest row vanished: {file_key}")))
    }

    /// Phase 2: apply one pass atomically.
    ///
    /// Optionally deletes the file's existing entries (forced re-import or
    /// detected truncation), inserts the new ones, then rebuilds the file's
    /// conversations from everything now on disk using `segment`.
    pub fn commit_file_pass(
        &self,
        file_key: &str,
        delete_existing: bool,
        new_entries: &[NewEntry],
        segment: impl FnOnce(&[TranscriptEntry]) -> Vec<SegmentSpec>,
        now_ms: i64,
    ) -> Result<PassStats, StoreError> {
        self.with_tx(|tx| {
            if delete_existing {
                delete_entries_for_file(tx, file_key).map_err(StoreError::from_sqlite)?;
            }
            let inserted =
                insert_entries(tx, new_entries, now_ms).map_err(StoreError::from_sqlite)?;
            let all = entries_for_file(tx, file_key).map_err(StoreError::from_sqlite)?;
            let segments = segment(&all);
            let (upserted, removed) = rebuild_conversations(tx, file_key, &segments, now_ms)
                .map_err(StoreError::from_sqlite)?;
            Ok(PassStats {
                entries_inserted: inserted,
                conversations_upserted: upserted,
                conversations_removed: removed,
                max_entry_ts: all.last().map(|e| e.timestamp),
            })
        })
    }

    /// Phase 3: back to `idle` with the offset advanced to the captured
    /// size and the newest committed entry timestamp recorded.
    pub fn file_mark_idle(
        &self,
        file_key: &str,
        processed_offset: i64,
        last_entry_ts: Option<i64>,
        now_ms: i64,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE ingest_files
                 SET status = 'idle',
                     last_processed_offset = ?2,
                     last_entry_ts = COALESCE(?3, last_entry_ts),
                     force_reimport = 0,
                     updated_at = ?4
                 WHERE file_key = ?1",
                params![file_key, processed_offset, last_entry_ts, now_ms],
            )?;
            Ok(())
        })
    }

    pub fn files_ingesting(&self) -> Result<Vec<FileIngestState>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {COLS} FROM ingest_files WHERE status = 'ingesting'"
            ))?;
            let rows = stmt.query_map([], row_to_state)?;
            rows.collect()
        })
    }

    pub fn files_all(&self) -> Result<Vec<FileIngestState>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare_cached(&format!("SELECT {COLS} FROM ingest_files ORDER BY file_key"))?;
            let rows = stmt.query_map([], row_to_state)?;
            rows.collect()
        })
    }

    /// Crash recovery for interrupted ingestion.
    ///
    /// For every file left in `ingesting`: delete entries newer than its
    /// `last_entry_ts` (all entries when none was recorded), rebuild the
    /// file's conversations from what remains, reset the row to `idle`, and
    /// flag it for a full re-import so the next pass converges. Returns the
    /// recovered file keys.
    pub fn recover_interrupted_files(
        &self,
        mut segment: impl FnMut(&[TranscriptEntry]) -> Vec<SegmentSpec>,
        now_ms: i64,
    ) -> Result<Vec<String>, StoreError> {
        let stuck = self.files_ingesting()?;
        let mut recovered = Vec::with_capacity(stuck.len());
        for state in stuck {
            let file_key = state.file_key.clone();
            let result = self.with_tx(|tx| {
                let dropped = match state.last_entry_ts {
                    Some(ts) => delete_entries_after(tx, &file_key, ts)
                        .map_err(StoreError::from_sqlite)?,
                    None => delete_entries_for_file(tx, &file_key)
                        .map_err(StoreError::from_sqlite)?,
                };
                let remaining = entries_for_file(tx, &file_key).map_err(StoreError::from_sqlite)?;
                let segments = segment(&remaining);
                rebuild_conversations(tx, &file_key, &segments, now_ms)
                    .map_err(StoreError::from_sqlite)?;
                tx.execute(
                    "UPDATE ingest_files
                     SET status = 'idle', force_reimport = 1, updated_at = ?2
                     WHERE file_key = ?1",
                    params![file_key, now_ms],
                )
                .map_err(StoreError::from_sqlite)?;
                Ok(dropped)
            });
            match result {
                Ok(dropped) => {
                    info!(file_key, dropped, "recovered interrupted ingestion");
                    recovered.push(file_key);
                }
                Err(e) => {
                    // One bad file must not stop recovery of the rest.
                    warn!(file_key, error = %e, "failed to recover file");
                }
            }
        }
        Ok(recovered)
    }
}

#[cfg(test)]
#[path = "files_tests.rs"]
mod tests;
