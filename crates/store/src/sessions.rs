// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session records: unique by external session id, archived on replace.

use crate::db::Store;
use crate::error::StoreError;
use claudia_core::{SessionId, SessionRecord, SessionStatus, WorkspaceId};
use rusqlite::{params, OptionalExtension, Row};

fn row_to_session(row: &Row<'_>) -> Result<SessionRecord, rusqlite::Error> {
    let status: String = row.get(3)?;
    Ok(SessionRecord {
        id: SessionId::new(row.get::<_, String>(0)?),
        workspace_id: WorkspaceId::new(row.get::<_, String>(1)?),
        external_session_id: row.get(2)?,
        status: SessionStatus::parse(&status).unwrap_or_default(),
        title: row.get(4)?,
        previous_session_id: row
            .get::<_, Option<String>>(5)?
            .map(SessionId::new),
        last_activity: row.get(6)?,
        created_at: row.get(7)?,
    })
}

const COLS: &str = "id, workspace_id, external_session_id, status, title, \
                    previous_session_id, last_activity, created_at";

impl Store {
    /// Insert a session record, archiving any active session in the same
    /// workspace and chaining it as `previous_session_id`.
    ///
    /// The row id is the manager's session id so activity stamps land on
    /// the right record.
    pub fn session_create(
        &self,
        id: &SessionId,
        workspace_id: &WorkspaceId,
        external_session_id: &str,
        title: Option<&str>,
        now_ms: i64,
    ) -> Result<SessionRecord, StoreError> {
        let id = id.clone();
        let workspace_id = workspace_id.clone();
        let external = external_session_id.to_string();
        let title = title.map(str::to_string);
        self.with_tx(|tx| {
            let previous: Option<String> = tx
                .query_row(
                    "SELECT id FROM sessions
                     WHERE workspace_id = ?1 AND status = 'active'
                     ORDER BY last_activity DESC LIMIT 1",
                    [workspace_id.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(StoreError::from_sqlite)?;

            if let Some(prev) = &previous {
                tx.execute(
                    "UPDATE sessions SET status = 'archived' WHERE id = ?1",
                    [prev],
                )
                .map_err(StoreError::from_sqlite)?;
            }

            let record = SessionRecord {
                id: id.clone(),
                workspace_id: workspace_id.clone(),
                external_session_id: external.clone(),
                status: SessionStatus::Active,
                title: title.clone(),
                previous_session_id: previous.map(SessionId::new),
                last_activity: now_ms,
                created_at: now_ms,
            };
            tx.execute(
                "INSERT INTO sessions
                 (id, workspace_id, external_session_id, status, title,
                  previous_session_id, last_activity, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.id.as_str(),
                    record.workspace_id.as_str(),
                    record.external_session_id,
                    record.status.as_str(),
                    record.title,
                    record.previous_session_id.as_ref().map(|s| s.as_str()),
                    record.last_activity,
                    record.created_at
                ],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(code, _)
                    if code.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    StoreError::Conflict(format!("session already exists: {external}"))
                }
                other => StoreError::from_sqlite(other),
            })?;
            Ok(record)
        })
    }

    pub fn session_get(&self, id: &SessionId) -> Result<Option<SessionRecord>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {COLS} FROM sessions WHERE id = ?1"),
                [id.as_str()],
                row_to_session,
            )
            .optional()
        })
    }

    pub fn session_by_external_id(
        &self,
        external_session_id: &str,
    ) -> Result<Option<SessionRecord>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {COLS} FROM sessions WHERE external_session_id = ?1"),
                [external_session_id],
                row_to_session,
            )
            .optional()
        })
    }

    pub fn session_list_for_workspace(
        &self,
        workspace_id: &WorkspaceId,
    ) -> Result<Vec<SessionRecord>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLS} FROM sessions WHERE workspace_id = ?1
                 ORDER BY last_activity DESC"
            ))?;
            let rows = stmt.query_map([workspace_id.as_str()], row_to_session)?;
            rows.collect()
        })
    }

    /// Stamp `last_activity`; returns false when the session is unknown.
    pub fn session_touch(&self, id: &SessionId, now_ms: i64) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE sessions SET last_activity = ?2 WHERE id = ?1",
                params![id.as_str(), now_ms],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn session_set_title(&self, id: &SessionId, title: &str) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE sessions SET title = ?2 WHERE id = ?1",
                params![id.as_str(), title],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn session_archive(&self, id: &SessionId) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE sessions SET status = 'archived' WHERE id = ?1",
                [id.as_str()],
            )?;
            Ok(changed > 0)
        })
    }
}

#[cfg(test)]
#[path = "sessions_tests.rs"]
mod tests;
