// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn parse(lines: &[&str]) -> Vec<ParsedEntry> {
    ClaudeLogParser.parse_chunk(&lines.join("\n"), "0b5c0000-1111-2222-3333-444455556666.jsonl")
}

fn user_line(ts: &str, text: &str) -> String {
    format!(
        r#"{{"type":"user","sessionId":"sess-1","timestamp":"{ts}","cwd":"/repo","message":{{"role":"user","content":"{text}"}}}}"#
    )
}

#[test]
fn parses_user_and_assistant_text() {
    let lines = [
        user_line("2026-01-30T08:00:00.000Z", "hello"),
        r#"{"type":"assistant","sessionId":"sess-1","timestamp":"2026-01-30T08:00:05.000Z","message":{"role":"assistant","content":[{"type":"text","text":"hi there"}]}}"#.to_string(),
    ];
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    let entries = parse(&refs);

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].role, claudia_core::Role::User);
    assert_eq!(entries[0].content, "hello");
    assert_eq!(entries[0].cwd.as_deref(), Some("/repo"));
    assert_eq!(entries[1].role, claudia_core::Role::Assistant);
    assert_eq!(entries[1].content, "hi there");
    assert_eq!(entries[1].timestamp - entries[0].timestamp, 5_000);
}

#[test]
fn drops_meta_and_sidechain() {
    let entries = parse(&[
        r#"{"type":"user","isMeta":true,"timestamp":"2026-01-30T08:00:00Z","message":{"content":"<context>"}}"#,
        r#"{"type":"assistant","isSidechain":true,"timestamp":"2026-01-30T08:00:01Z","message":{"content":[{"type":"text","text":"sub-agent"}]}}"#,
    ]);
    assert!(entries.is_empty());
}

#[test]
fn drops_non_conversation_record_types() {
    let entries = parse(&[
        r#"{"type":"summary","summary":"Fixing the build","leafUuid":"x"}"#,
        r#"{"type":"system","timestamp":"2026-01-30T08:00:00Z","content":"hook ran"}"#,
    ]);
    assert!(entries.is_empty());
}

#[test]
fn drops_tool_only_messages_but_collects_mixed_tool_names() {
    let entries = parse(&[
        // Tool-only: dropped.
        r#"{"type":"assistant","timestamp":"2026-01-30T08:00:00Z","message":{"content":[{"type":"tool_use","id":"t1","name":"Bash","input":{}}]}}"#,
        // Tool result on the user side: dropped.
        r#"{"type":"user","timestamp":"2026-01-30T08:00:01Z","message":{"content":[{"type":"tool_result","tool_use_id":"t1","content":"ok"}]}}"#,
        // Mixed: kept, tools recorded.
        r#"{"type":"assistant","timestamp":"2026-01-30T08:00:02Z","message":{"content":[{"type":"text","text":"Running tests."},{"type":"tool_use","id":"t2","name":"Bash","input":{}},{"type":"tool_use","id":"t3","name":"Read","input":{}}]}}"#,
    ]);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].content, "Running tests.");
    assert_eq!(entries[0].tool_names.as_deref(), Some("Bash,Read"));
}

#[test]
fn session_id_falls_back_to_filename() {
    let entries = ClaudeLogParser.parse_chunk(
        r#"{"type":"user","timestamp":"2026-01-30T08:00:00Z","message":{"content":"no session field"}}"#,
        "0b5c0000-1111-2222-3333-444455556666.jsonl",
    );
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].session_id, "0b5c0000-1111-2222-3333-444455556666");
}

#[test]
fn skips_malformed_lines_and_blank_lines() {
    let entries = parse(&[
        "",
        "not json at all",
        r#"{"type":"user","timestamp":"2026-01-30T08:00:00Z","message":{"content":"kept"}}"#,
        r#"{"truncated":"#,
    ]);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].content, "kept");
}

#[test]
fn incremental_suffix_produces_exactly_the_new_entries() {
    let a = user_line("2026-01-30T08:00:00Z", "first");
    let b = user_line("2026-01-30T08:00:10Z", "second");
    let full = format!("{a}\n{b}\n");

    let all = ClaudeLogParser.parse_chunk(&full, "s.jsonl");
    let suffix = ClaudeLogParser.parse_chunk(&full[a.len() + 1..], "s.jsonl");

    assert_eq!(all.len(), 2);
    assert_eq!(suffix.len(), 1);
    assert_eq!(suffix[0], all[1]);
}

#[test]
fn empty_text_is_tool_only() {
    let entries = parse(&[
        r#"{"type":"user","timestamp":"2026-01-30T08:00:00Z","message":{"content":"   "}}"#,
    ]);
    assert!(entries.is_empty());
}
