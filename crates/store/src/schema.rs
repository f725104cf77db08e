// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Table definitions.
//!
//! Timestamps are epoch milliseconds (INTEGER). Status columns hold the
//! snake_case renderings of the core enums. `ingest_files.force_reimport`
//! is set by crash recovery so the next pass deletes and re-reads the file
//! from offset zero.

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS workspaces (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    cwd         TEXT NOT NULL UNIQUE,
    created_at  INTEGER NOT NULL,
    updated_at  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    id                   TEXT PRIMARY KEY,
    workspace_id         TEXT NOT NULL,
    external_session_id  TEXT NOT NULL UNIQUE,
    status               TEXT NOT NULL DEFAULT 'active',
    title                TEXT,
    previous_session_id  TEXT,
    last_activity        INTEGER NOT NULL,
    created_at           INTEGER NOT NULL,
    FOREIGN KEY (workspace_id) REFERENCES workspaces(id)
);

CREATE TABLE IF NOT EXISTS ingest_files (
    file_key               TEXT PRIMARY KEY,
    source                 TEXT NOT NULL,
    status                 TEXT NOT NULL DEFAULT 'idle',
    last_modified          INTEGER NOT NULL DEFAULT 0,
    file_size              INTEGER NOT NULL DEFAULT 0,
    last_processed_offset  INTEGER NOT NULL DEFAULT 0,
    last_entry_ts          INTEGER,
    force_reimport         INTEGER NOT NULL DEFAULT 0,
    created_at             INTEGER NOT NULL,
    updated_at             INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS entries (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id   TEXT NOT NULL,
    source_file  TEXT NOT NULL,
    role         TEXT NOT NULL,
    content      TEXT NOT NULL,
    tool_names   TEXT,
    timestamp    INTEGER NOT NULL,
    cwd          TEXT,
    ingested_at  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS conversations (
    id                TEXT PRIMARY KEY,
    session_id        TEXT NOT NULL,
    source_file       TEXT NOT NULL,
    first_message_at  INTEGER NOT NULL,
    last_message_at   INTEGER NOT NULL,
    entry_count       INTEGER NOT NULL DEFAULT 0,
    status            TEXT NOT NULL DEFAULT 'active',
    summary           TEXT,
    files_written     TEXT,
    metadata          TEXT,
    status_at         INTEGER,
    processed_at      INTEGER,
    created_at        INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_workspace ON sessions(workspace_id);
CREATE INDEX IF NOT EXISTS idx_entries_file_ts ON entries(source_file, timestamp, id);
CREATE INDEX IF NOT EXISTS idx_entries_session ON entries(session_id);
CREATE INDEX IF NOT EXISTS idx_conversations_file ON conversations(source_file, first_message_at);
CREATE INDEX IF NOT EXISTS idx_conversations_status ON conversations(status, status_at);
"#;
