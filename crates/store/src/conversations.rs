// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conversation rows and their status machine.
//!
//! Segmentation owns non-terminal rows (`active`, `ready`); the librarian
//! owns `queued → processing → archived | skipped`. Terminal rows are never
//! rebuilt. `status_at` is stamped on every transition, terminal included.

use crate::db::Store;
use crate::error::StoreError;
use claudia_core::{Conversation, ConversationId, ConversationStatus, SessionId};
use rusqlite::{params, Connection, OptionalExtension, Row};

/// One segment produced by the splitter, keyed by its first entry time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSpec {
    pub session_id: SessionId,
    pub first_message_at: i64,
    pub last_message_at: i64,
    pub entry_count: i64,
}

/// Terminal outcome written by the librarian on archive.
#[derive(Debug, Clone, Default)]
pub struct ConversationUpdate {
    pub summary: Option<String>,
    pub files_written: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

fn row_to_conversation(row: &Row<'_>) -> Result<Conversation, rusqlite::Error> {
    let status: String = row.get(6)?;
    let metadata: Option<String> = row.get(9)?;
    Ok(Conversation {
        id: ConversationId::new(row.get::<_, String>(0)?),
        session_id: SessionId::new(row.get::<_, String>(1)?),
        source_file: row.get(2)?,
        first_message_at: row.get(3)?,
        last_message_at: row.get(4)?,
        entry_count: row.get(5)?,
        status: ConversationStatus::parse(&status).unwrap_or_default(),
        summary: row.get(7)?,
        files_written: row.get(8)?,
        metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
        status_at: row.get(10)?,
        processed_at: row.get(11)?,
        created_at: row.get(12)?,
    })
}

const COLS: &str = "id, session_id, source_file, first_message_at, last_message_at, \
                    entry_count, status, summary, files_written, metadata, status_at, \
                    processed_at, created_at";

/// Reconcile the conversations of one file against freshly computed
/// segments. Callable inside a transaction.
///
/// Terminal rows are left untouched even when a segment shares their key.
/// Non-terminal rows are updated in place (status preserved), created when
/// missing, and deleted when no segment claims their key anymore.
pub(crate) fn rebuild_conversations(
    conn: &Connection,
    source_file: &str,
    segments: &[SegmentSpec],
    now_ms: i64,
) -> Result<(usize, usize), rusqlite::Error> {
    let mut stmt = conn.prepare_cached(
        "SELECT first_message_at, status FROM conversations WHERE source_file = ?1",
    )?;
    let existing: Vec<(i64, String)> = stmt
        .query_map([source_file], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<_, _>>()?;

    let terminal: Vec<i64> = existing
        .iter()
        .filter(|(_, s)| {
            ConversationStatus::parse(s).is_some_and(|status| status.is_terminal())
        })
        .map(|(ts, _)| *ts)
        .collect();
    let non_terminal: Vec<i64> = existing
        .iter()
        .filter(|(_, s)| {
            !ConversationStatus::parse(s).is_some_and(|status| status.is_terminal())
        })
        .map(|(ts, _)| *ts)
        .collect();

    let mut upserted = 0usize;
    for segment in segments {
        if terminal.contains(&segment.first_message_at) {
            continue;
        }
        if non_terminal.contains(&segment.first_message_at) {
            conn.execute(
                "UPDATE conversations
                 SET session_id = ?3, last_message_at = ?4, entry_count = ?5
                 WHERE source_file = ?1 AND first_message_at = ?2
                   AND status NOT IN ('archived', 'skipped')",
                params![
                    source_file,
                    segment.first_message_at,
                    segment.session_id.as_str(),
                    segment.last_message_at,
                    segment.entry_count
                ],
            )?;
        } else {
            conn.execute(
                "INSERT INTO conversations
                 (id, session_id, source_file, first_message_at, last_message_at,
                  entry_count, status, status_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'active', ?7, ?7)",
                params![
                    ConversationId::generate().as_str(),
                    segment.session_id.as_str(),
                    source_file,
                    segment.first_message_at,
                    segment.last_message_at,
                    segment.entry_count,
                    now_ms
                ],
            )?;
        }
        upserted += 1;
    }

    // Non-terminal rows whose key no segment claims were merged away by
    // re-segmentation; drop them.
    let mut removed = 0usize;
    for first_at in non_terminal {
        if !segments.iter().any(|s| s.first_message_at == first_at) {
            removed += conn.execute(
                "DELETE FROM conversations
                 WHERE source_file = ?1 AND first_message_at = ?2
                   AND status NOT IN ('archived', 'skipped')",
                params![source_file, first_at],
            )?;
        }
    }

    Ok((upserted, removed))
}

impl Store {
    pub fn conversation_get(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {COLS} FROM conversations WHERE id = ?1"),
                [id.as_str()],
                row_to_conversation,
            )
            .optional()
        })
    }

    pub fn conversations_for_file(
        &self,
        source_file: &str,
    ) -> Result<Vec<Conversation>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {COLS} FROM conversations WHERE source_file = ?1
                 ORDER BY first_message_at"
            ))?;
            let rows = stmt.query_map([source_file], row_to_conversation)?;
            rows.collect()
        })
    }

    pub fn conversations_with_status(
        &self,
        status: ConversationStatus,
    ) -> Result<Vec<Conversation>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {COLS} FROM conversations WHERE status = ?1
                 ORDER BY first_message_at"
            ))?;
            let rows = stmt.query_map([status.as_str()], row_to_conversation)?;
            rows.collect()
        })
    }

    /// `active → ready` for every conversation idle past the gap.
    pub fn conversations_promote_ready(
        &self,
        gap_ms: i64,
        now_ms: i64,
    ) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE conversations SET status = 'ready', status_at = ?2
                 WHERE status = 'active' AND last_message_at + ?1 < ?2",
                params![gap_ms, now_ms],
            )
        })
    }

    /// `ready → queued` for up to `batch` conversations, oldest first.
    /// Returns the ids queued.
    pub fn conversations_queue_ready(
        &self,
        batch: usize,
        now_ms: i64,
    ) -> Result<Vec<ConversationId>, StoreError> {
        self.with_tx(|tx| {
            let mut stmt = tx
                .prepare(
                    "SELECT id FROM conversations WHERE status = 'ready'
                     ORDER BY last_message_at, first_message_at LIMIT ?1",
                )
                .map_err(StoreError::from_sqlite)?;
            let ids: Vec<String> = stmt
                .query_map([batch as i64], |row| row.get(0))
                .and_then(|rows| rows.collect())
                .map_err(StoreError::from_sqlite)?;
            drop(stmt);
            for id in &ids {
                tx.execute(
                    "UPDATE conversations SET status = 'queued', status_at = ?2 WHERE id = ?1",
                    params![id, now_ms],
                )
                .map_err(StoreError::from_sqlite)?;
            }
            Ok(ids.into_iter().map(ConversationId::new).collect())
        })
    }

    /// Pop the oldest queued conversation into `processing`.
    ///
    /// Returns `None` when the queue is empty or another conversation is
    /// already processing (the cross-system at-most-one guarantee).
    pub fn conversation_pop_queued(&self, now_ms: i64) -> Result<Option<Conversation>, StoreError> {
        self.with_tx(|tx| {
            let processing: i64 = tx
                .query_row(
                    "SELECT COUNT(*) FROM conversations WHERE status = 'processing'",
                    [],
                    |row| row.get(0),
                )
                .map_err(StoreError::from_sqlite)?;
            if processing > 0 {
                return Ok(None);
            }
            let conversation = tx
                .query_row(
                    &format!(
                        "SELECT {COLS} FROM conversations WHERE status = 'queued'
                         ORDER BY status_at, first_message_at LIMIT 1"
                    ),
                    [],
                    row_to_conversation,
                )
                .optional()
                .map_err(StoreError::from_sqlite)?;
            let Some(conversation) = conversation else {
                return Ok(None);
            };
            tx.execute(
                "UPDATE conversations SET status = 'processing', status_at = ?2 WHERE id = ?1",
                params![conversation.id.as_str(), now_ms],
            )
            .map_err(StoreError::from_sqlite)?;
            Ok(Some(Conversation {
                status: ConversationStatus::Processing,
                status_at: Some(now_ms),
                ..conversation
            }))
        })
    }

    pub fn conversation_any_processing(&self) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM conversations WHERE status = 'processing'",
                [],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    pub fn conversation_mark_archived(
        &self,
        id: &ConversationId,
        update: &ConversationUpdate,
        now_ms: i64,
    ) -> Result<bool, StoreError> {
        let metadata = update
            .metadata
            .as_ref()
            .map(|m| m.to_string());
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE conversations
                 SET status = 'archived', summary = ?2, files_written = ?3,
                     metadata = COALESCE(?4, metadata), status_at = ?5, processed_at = ?5
                 WHERE id = ?1",
                params![id.as_str(), update.summary, update.files_written, metadata, now_ms],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn conversation_mark_skipped(
        &self,
        id: &ConversationId,
        reason: &str,
        now_ms: i64,
    ) -> Result<bool, StoreError> {
        let metadata = serde_json::json!({ "skip_reason": reason }).to_string();
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE conversations
                 SET status = 'skipped', metadata = ?2, status_at = ?3, processed_at = ?3
                 WHERE id = ?1",
                params![id.as_str(), metadata, now_ms],
            )?;
            Ok(changed > 0)
        })
    }

    /// `processing → queued`, the per-job failure rollback.
    pub fn conversation_requeue(
        &self,
        id: &ConversationId,
        now_ms: i64,
    ) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE conversations SET status = 'queued', status_at = ?2
                 WHERE id = ?1 AND status = 'processing'",
                params![id.as_str(), now_ms],
            )?;
            Ok(changed > 0)
        })
    }

    /// Startup recovery: any conversation stuck in `processing` goes back
    /// to `queued`.
    pub fn conversations_recover_processing(&self, now_ms: i64) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE conversations SET status = 'queued', status_at = ?1
                 WHERE status = 'processing'",
                [now_ms],
            )
        })
    }

    /// Most recent archived conversations for a source file, newest first.
    pub fn conversations_recent_archived(
        &self,
        source_file: &str,
        limit: usize,
    ) -> Result<Vec<Conversation>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {COLS} FROM conversations
                 WHERE source_file = ?1 AND status = 'archived'
                 ORDER BY last_message_at DESC LIMIT ?2"
            ))?;
            let rows =
                stmt.query_map(params![source_file, limit as i64], row_to_conversation)?;
            rows.collect()
        })
    }

    /// Entries belonging to a conversation, in order.
    pub fn conversation_entries(
        &self,
        conversation: &Conversation,
    ) -> Result<Vec<claudia_core::TranscriptEntry>, StoreError> {
        self.entries_in_range(
            &conversation.source_file,
            conversation.first_message_at,
            conversation.last_message_at,
        )
    }

    /// Status counts for the introspection surface.
    pub fn conversation_status_counts(&self) -> Result<Vec<(String, i64)>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT status, COUNT(*) FROM conversations GROUP BY status ORDER BY status",
            )?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect()
        })
    }
}

#[cfg(test)]
#[path = "conversations_tests.rs"]
mod tests;
