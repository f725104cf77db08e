// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace rows: unique by cwd, created lazily, never deleted.

use crate::db::Store;
use crate::error::StoreError;
use claudia_core::{Workspace, WorkspaceId};
use rusqlite::{params, OptionalExtension, Row};

fn row_to_workspace(row: &Row<'_>) -> Result<Workspace, rusqlite::Error> {
    Ok(Workspace {
        id: WorkspaceId::new(row.get::<_, String>(0)?),
        name: row.get(1)?,
        cwd: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

const COLS: &str = "id, name, cwd, created_at, updated_at";

impl Store {
    /// Fetch the workspace for `cwd`, creating it when absent.
    ///
    /// The name defaults to the last path segment unless one is supplied.
    pub fn workspace_get_or_create(
        &self,
        cwd: &str,
        name: Option<&str>,
        now_ms: i64,
    ) -> Result<Workspace, StoreError> {
        if let Some(existing) = self.workspace_by_cwd(cwd)? {
            return Ok(existing);
        }
        let workspace = Workspace {
            id: WorkspaceId::generate(),
            name: name
                .map(str::to_string)
                .unwrap_or_else(|| Workspace::default_name(cwd)),
            cwd: cwd.to_string(),
            created_at: now_ms,
            updated_at: now_ms,
        };
        self.with_conn(|conn| {
            // A concurrent creator may win the unique(cwd) race; ignore and
            // re-read below.
            conn.execute(
                "INSERT OR IGNORE INTO workspaces (id, name, cwd, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    workspace.id.as_str(),
                    workspace.name,
                    workspace.cwd,
                    workspace.created_at,
                    workspace.updated_at
                ],
            )?;
            Ok(())
        })?;
        self.workspace_by_cwd(cwd)?
            .ok_or_else(|| StoreError::Conflict(format!("workspace vanished for cwd {cwd}")))
    }

    pub fn workspace_by_cwd(&self, cwd: &str) -> Result<Option<Workspace>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {COLS} FROM workspaces WHERE cwd = ?1"),
                [cwd],
                row_to_workspace,
            )
            .optional()
        })
    }

    pub fn workspace_get(&self, id: &WorkspaceId) -> Result<Option<Workspace>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {COLS} FROM workspaces WHERE id = ?1"),
                [id.as_str()],
                row_to_workspace,
            )
            .optional()
        })
    }

    pub fn workspace_list(&self) -> Result<Vec<Workspace>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {COLS} FROM workspaces ORDER BY name"))?;
            let rows = stmt.query_map([], row_to_workspace)?;
            rows.collect()
        })
    }

    pub fn workspace_touch(&self, id: &WorkspaceId, now_ms: i64) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE workspaces SET updated_at = ?2 WHERE id = ?1",
                params![id.as_str(), now_ms],
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
#[path = "workspaces_tests.rs"]
mod tests;
