// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store error type and its mapping onto the RPC taxonomy.

use claudia_core::{ErrorKind, RpcError};
use thiserror::Error;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store busy past the wait bound: {0}")]
    Busy(String),

    #[error("conflicting write: {0}")]
    Conflict(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Classify a rusqlite error, separating busy/locked from the rest.
    pub fn from_sqlite(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(code, ref message) = err {
            if matches!(
                code.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ) {
                return StoreError::Busy(message.clone().unwrap_or_else(|| code.to_string()));
            }
        }
        StoreError::Sqlite(err)
    }
}

impl From<StoreError> for RpcError {
    fn from(err: StoreError) -> Self {
        match &err {
            StoreError::Busy(_) => RpcError::new(ErrorKind::StoreUnavailable, err.to_string()),
            StoreError::Conflict(_) => RpcError::new(ErrorKind::StoreConflict, err.to_string()),
            _ => RpcError::new(ErrorKind::StoreUnavailable, err.to_string()),
        }
    }
}
