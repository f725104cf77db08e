// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::conversations::SegmentSpec;
use crate::entries::NewEntry;
use crate::Store;
use claudia_core::Role;

fn entry(file: &str, ts: i64) -> NewEntry {
    NewEntry {
        session_id: claudia_core::SessionId::new("sess-1"),
        source_file: file.to_string(),
        role: Role::User,
        content: format!("msg {ts}"),
        tool_names: None,
        timestamp: ts,
        cwd: None,
    }
}

/// Gap-only segmenter with a 10 minute threshold.
fn split(entries: &[TranscriptEntry]) -> Vec<SegmentSpec> {
    const GAP_MS: i64 = 10 * 60 * 1000;
    let mut segments: Vec<SegmentSpec> = Vec::new();
    for e in entries {
        match segments.last_mut() {
            Some(last) if e.timestamp - last.last_message_at < GAP_MS => {
                last.last_message_at = e.timestamp;
                last.entry_count += 1;
            }
            _ => segments.push(SegmentSpec {
                session_id: e.session_id.clone(),
                first_message_at: e.timestamp,
                last_message_at: e.timestamp,
                entry_count: 1,
            }),
        }
    }
    segments
}

#[test]
fn two_phase_pass_advances_offset() {
    let store = Store::open_in_memory().unwrap();
    let state = store
        .file_mark_ingesting("a.jsonl", "claude", 2_048, 500, 1_000)
        .unwrap();
    assert_eq!(state.status, IngestStatus::Ingesting);
    assert_eq!(state.file_size, 2_048);
    assert_eq!(state.last_processed_offset, 0);

    let stats = store
        .commit_file_pass("a.jsonl", false, &[entry("a.jsonl", 60_000)], split, 1_000)
        .unwrap();
    assert_eq!(stats.entries_inserted, 1);
    assert_eq!(stats.max_entry_ts, Some(60_000));

    store
        .file_mark_idle("a.jsonl", 2_048, stats.max_entry_ts, 1_100)
        .unwrap();
    let state = store.file_state("a.jsonl").unwrap().unwrap();
    assert_eq!(state.status, IngestStatus::Idle);
    assert_eq!(state.last_processed_offset, 2_048);
    assert_eq!(state.last_entry_ts, Some(60_000));
}

#[test]
fn idle_with_no_new_entries_keeps_last_entry_ts() {
    let store = Store::open_in_memory().unwrap();
    store
        .file_mark_ingesting("a.jsonl", "claude", 100, 0, 1_000)
        .unwrap();
    store
        .commit_file_pass("a.jsonl", false, &[entry("a.jsonl", 60_000)], split, 1_000)
        .unwrap();
    store.file_mark_idle("a.jsonl", 100, Some(60_000), 1_000).unwrap();

    // Second pass reads nothing new.
    store
        .file_mark_ingesting("a.jsonl", "claude", 100, 0, 2_000)
        .unwrap();
    store.file_mark_idle("a.jsonl", 100, None, 2_000).unwrap();

    let state = store.file_state("a.jsonl").unwrap().unwrap();
    assert_eq!(state.last_entry_ts, Some(60_000));
}

#[test]
fn delete_existing_replaces_entries() {
    let store = Store::open_in_memory().unwrap();
    store
        .commit_file_pass("a.jsonl", false, &[entry("a.jsonl", 1_000)], split, 1_000)
        .unwrap();
    store
        .commit_file_pass(
            "a.jsonl",
            true,
            &[entry("a.jsonl", 2_000), entry("a.jsonl", 3_000)],
            split,
            2_000,
        )
        .unwrap();

    let rows = store.entries_for_file("a.jsonl").unwrap();
    let timestamps: Vec<i64> = rows.iter().map(|e| e.timestamp).collect();
    assert_eq!(timestamps, [2_000, 3_000]);
}

#[test]
fn recovery_rolls_back_past_last_entry_ts() {
    let store = Store::open_in_memory().unwrap();
    // A committed pass up to t=60s, then a crashed pass that inserted t=120s.
    store
        .file_mark_ingesting("a.jsonl", "claude", 100, 0, 1_000)
        .unwrap();
    store
        .commit_file_pass(
            "a.jsonl",
            false,
            &[entry("a.jsonl", 0), entry("a.jsonl", 60_000)],
            split,
            1_000,
        )
        .unwrap();
    store.file_mark_idle("a.jsonl", 100, Some(60_000), 1_000).unwrap();

    store
        .file_mark_ingesting("a.jsonl", "claude", 200, 0, 2_000)
        .unwrap();
    store
        .commit_file_pass("a.jsonl", false, &[entry("a.jsonl", 120_000)], split, 2_000)
        .unwrap();
    // Crash here: no mark_idle.

    let recovered = store.recover_interrupted_files(split, 3_000).unwrap();
    assert_eq!(recovered, ["a.jsonl"]);

    let timestamps: Vec<i64> = store
        .entries_for_file("a.jsonl")
        .unwrap()
        .iter()
        .map(|e| e.timestamp)
        .collect();
    assert_eq!(timestamps, [0, 60_000], "committed prefix survives");

    let state = store.file_state("a.jsonl").unwrap().unwrap();
    assert_eq!(state.status, IngestStatus::Idle);
    assert!(store.file_needs_reimport("a.jsonl").unwrap());
}

#[test]
fn recovery_without_last_entry_ts_drops_everything() {
    let store = Store::open_in_memory().unwrap();
    store
        .file_mark_ingesting("a.jsonl", "claude", 100, 0, 1_000)
        .unwrap();
    store
        .commit_file_pass("a.jsonl", false, &[entry("a.jsonl", 1_000)], split, 1_000)
        .unwrap();
    // Crash before the first mark_idle; last_entry_ts was never recorded.

    store.recover_interrupted_files(split, 2_000).unwrap();
    assert_eq!(store.entry_count_for_file("a.jsonl").unwrap(), 0);
    assert!(store.conversations_for_file("a.jsonl").unwrap().is_empty());
}

#[test]
fn reimport_flag_clears_after_idle() {
    let store = Store::open_in_memory().unwrap();
    store
        .file_mark_ingesting("a.jsonl", "claude", 100, 0, 1_000)
        .unwrap();
    store.recover_interrupted_files(split, 2_000).unwrap();
    assert!(store.file_needs_reimport("a.jsonl").unwrap());

    store
        .file_mark_ingesting("a.jsonl", "claude", 100, 0, 3_000)
        .unwrap();
    store.file_mark_idle("a.jsonl", 100, None, 3_000).unwrap();
    assert!(!store.file_needs_reimport("a.jsonl").unwrap());
}

#[test]
fn request_reimport_is_sticky_until_next_idle() {
    let store = Store::open_in_memory().unwrap();
    store
        .file_mark_ingesting("a.jsonl", "claude", 100, 0, 1_000)
        .unwrap();
    store.file_mark_idle("a.jsonl", 100, None, 1_000).unwrap();

    assert!(store.file_request_reimport("a.jsonl", 2_000).unwrap());
    assert!(store.file_needs_reimport("a.jsonl").unwrap());
    assert!(!store.file_request_reimport("ghost.jsonl", 2_000).unwrap());
}
