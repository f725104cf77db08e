// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted domain records shared by the store, ingestion, and workers.
//!
//! Timestamps are epoch milliseconds UTC throughout.

use crate::id::{ConversationId, SessionId, WorkspaceId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A working directory known to the gateway. Unique by `cwd`; never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub name: String,
    pub cwd: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Workspace {
    /// Default name: last path segment of `cwd`.
    pub fn default_name(cwd: &str) -> String {
        cwd.trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(cwd)
            .to_string()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Active,
    Archived,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SessionStatus::Active),
            "archived" => Some(SessionStatus::Archived),
            _ => None,
        }
    }
}

/// One logical agent session. Unique by `external_session_id`.
///
/// Archived on new-session replace, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub workspace_id: WorkspaceId,
    pub external_session_id: String,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_session_id: Option<SessionId>,
    pub last_activity: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    #[default]
    Idle,
    Ingesting,
}

impl IngestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStatus::Idle => "idle",
            IngestStatus::Ingesting => "ingesting",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(IngestStatus::Idle),
            "ingesting" => Some(IngestStatus::Ingesting),
            _ => None,
        }
    }
}

/// Ingestion progress for one source file.
///
/// `file_key` is the path relative to the watched base directory so the same
/// file reached through alternate mounts keys identically. While a file is
/// `ingesting`, every entry it inserted with `timestamp > last_entry_ts`
/// belongs to the in-flight pass and is rolled back on recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileIngestState {
    pub file_key: String,
    pub source: String,
    pub status: IngestStatus,
    pub last_modified: i64,
    pub file_size: i64,
    pub last_processed_offset: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_entry_ts: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// One normalized transcript message. Immutable once committed; ordered by
/// `(timestamp, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub id: i64,
    pub session_id: SessionId,
    pub source_file: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_names: Option<String>,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    pub ingested_at: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    #[default]
    Active,
    Ready,
    Queued,
    Processing,
    Archived,
    Skipped,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Active => "active",
            ConversationStatus::Ready => "ready",
            ConversationStatus::Queued => "queued",
            ConversationStatus::Processing => "processing",
            ConversationStatus::Archived => "archived",
            ConversationStatus::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ConversationStatus::Active),
            "ready" => Some(ConversationStatus::Ready),
            "queued" => Some(ConversationStatus::Queued),
            "processing" => Some(ConversationStatus::Processing),
            "archived" => Some(ConversationStatus::Archived),
            "skipped" => Some(ConversationStatus::Skipped),
            _ => None,
        }
    }

    /// Archived and skipped conversations are permanent; segmentation never
    /// rebuilds them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConversationStatus::Archived | ConversationStatus::Skipped
        )
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contiguous run of entries for one source file, bounded by idle gaps and
/// size limits. At most one non-terminal conversation exists per
/// `(source_file, first_message_at)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub session_id: SessionId,
    pub source_file: String,
    pub first_message_at: i64,
    pub last_message_at: i64,
    pub entry_count: i64,
    pub status: ConversationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_written: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<i64>,
    pub created_at: i64,
}

#[cfg(test)]
#[path = "records_tests.rs"]
mod tests;
