// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    simple = { "/home/user/repo", "repo" },
    trailing_slash = { "/home/user/repo/", "repo" },
    root = { "/", "/" },
    relative = { "projects/demo", "demo" },
)]
fn workspace_default_name(cwd: &str, expected: &str) {
    assert_eq!(Workspace::default_name(cwd), expected);
}

#[test]
fn conversation_status_round_trips() {
    for status in [
        ConversationStatus::Active,
        ConversationStatus::Ready,
        ConversationStatus::Queued,
        ConversationStatus::Processing,
        ConversationStatus::Archived,
        ConversationStatus::Skipped,
    ] {
        assert_eq!(ConversationStatus::parse(status.as_str()), Some(status));
    }
    assert_eq!(ConversationStatus::parse("bogus"), None);
}

#[test]
fn only_archived_and_skipped_are_terminal() {
    assert!(ConversationStatus::Archived.is_terminal());
    assert!(ConversationStatus::Skipped.is_terminal());
    assert!(!ConversationStatus::Active.is_terminal());
    assert!(!ConversationStatus::Ready.is_terminal());
    assert!(!ConversationStatus::Queued.is_terminal());
    assert!(!ConversationStatus::Processing.is_terminal());
}

#[test]
fn session_status_round_trips() {
    assert_eq!(SessionStatus::parse("active"), Some(SessionStatus::Active));
    assert_eq!(
        SessionStatus::parse("archived"),
        Some(SessionStatus::Archived)
    );
    assert_eq!(SessionStatus::parse("gone"), None);
}

#[test]
fn role_round_trips() {
    assert_eq!(Role::parse("user"), Some(Role::User));
    assert_eq!(Role::parse("assistant"), Some(Role::Assistant));
    assert_eq!(Role::parse("system"), None);
}

#[test]
fn ingest_status_round_trips() {
    assert_eq!(IngestStatus::parse("idle"), Some(IngestStatus::Idle));
    assert_eq!(
        IngestStatus::parse("ingesting"),
        Some(IngestStatus::Ingesting)
    );
    assert_eq!(IngestStatus::parse("paused"), None);
}
