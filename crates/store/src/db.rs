// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store handle: one SQLite connection behind a mutex.
//!
//! Subsystems each open their own handle against the shared path. WAL mode
//! lets readers proceed under a writer; `busy_timeout` bounds the wait when
//! two writers collide.

use crate::error::StoreError;
use crate::schema::SCHEMA;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

/// Bounded busy-wait before a contended write fails with `Busy`.
const BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

/// A handle on the embedded store.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (and initialize if needed) the store at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Corrupt(format!("create store dir: {e}")))?;
        }
        let conn = Connection::open(path).map_err(StoreError::from_sqlite)?;
        Self::init(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(StoreError::from_sqlite)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(StoreError::from_sqlite)?;
        // journal_mode returns a row, which pragma_update tolerates.
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(StoreError::from_sqlite)?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(StoreError::from_sqlite)?;
        conn.execute_batch(SCHEMA).map_err(StoreError::from_sqlite)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run `f` with the locked connection, classifying sqlite errors.
    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    ) -> Result<T, StoreError> {
        let conn = self.conn.lock();
        f(&conn).map_err(StoreError::from_sqlite)
    }

    /// Run `f` inside a transaction, committing on `Ok`.
    pub(crate) fn with_tx<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)
            .map_err(StoreError::from_sqlite)?;
        let value = f(&tx)?;
        tx.commit().map_err(StoreError::from_sqlite)?;
        Ok(value)
    }
}

#[cfg(test)]
#[path = "db_tests.rs"]
mod tests;
