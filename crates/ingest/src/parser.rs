// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The log parser contract and its Claude JSONL implementation.
//!
//! A parser converts a chunk of log content into normalized entries.
//! Implementations must be incremental-safe: parsing the suffix bytes past
//! the last processed offset yields exactly the new entries. Meta records,
//! sidechain records, and tool-only messages are dropped per the filter
//! documented on [`ClaudeLogParser`].

use crate::session_key::session_id_for_file;
use claudia_core::clock::parse_rfc3339;
use claudia_core::Role;

/// One normalized entry parsed out of a log chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEntry {
    pub session_id: String,
    pub role: Role,
    pub content: String,
    pub tool_names: Option<String>,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub cwd: Option<String>,
}

/// Converts chunks of an append-only session log into entries.
pub trait LogParser: Send + Sync + 'static {
    /// Parse a chunk of complete lines. `source_name` is the file's base
    /// name, used to derive a session id when records carry none.
    fn parse_chunk(&self, chunk: &str, source_name: &str) -> Vec<ParsedEntry>;
}

/// Parser for the external agent CLI's JSONL session logs.
///
/// One JSON object per line. Kept records are `type: "user" | "assistant"`
/// with a non-empty text rendering. Dropped records:
/// - `isMeta: true` (injected context, not conversation),
/// - `isSidechain: true` (sub-agent traffic),
/// - any other `type` (summary, system, result, …),
/// - messages whose content is exclusively tool_use / tool_result blocks.
///
/// Tool names used alongside text are collected into `tool_names`.
#[derive(Debug, Clone, Default)]
pub struct ClaudeLogParser;

impl LogParser for ClaudeLogParser {
    fn parse_chunk(&self, chunk: &str, source_name: &str) -> Vec<ParsedEntry> {
        let fallback_session = session_id_for_file(source_name);
        let mut entries = Vec::new();
        for line in chunk.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let json: serde_json::Value = match serde_json::from_str(trimmed) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if let Some(entry) = parse_record(&json, &fallback_session) {
                entries.push(entry);
            }
        }
        entries
    }
}

fn get_str<'a>(obj: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(|v| v.as_str())
}

fn get_bool(obj: &serde_json::Value, key: &str) -> bool {
    obj.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

fn parse_record(json: &serde_json::Value, fallback_session: &str) -> Option<ParsedEntry> {
    let role = match get_str(json, "type") {
        Some("user") => Role::User,
        Some("assistant") => Role::Assistant,
        _ => return None,
    };
    if get_bool(json, "isMeta") || get_bool(json, "isSidechain") {
        return None;
    }

    let timestamp = get_str(json, "timestamp").and_then(parse_rfc3339)?;
    let message = json.get("message")?;
    let (content, tool_names) = render_content(message.get("content")?)?;

    Some(ParsedEntry {
        session_id: get_str(json, "sessionId")
            .map(str::to_string)
            .unwrap_or_else(|| fallback_session.to_string()),
        role,
        content,
        tool_names,
        timestamp,
        cwd: get_str(json, "cwd").map(str::to_string),
    })
}

/// Render message content to text, collecting tool names.
///
/// Returns `None` for tool-only messages (no text once tool blocks are
/// stripped).
fn render_content(content: &serde_json::Value) -> Option<(String, Option<String>)> {
    if let Some(text) = content.as_str() {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        return Some((text.to_string(), None));
    }

    let blocks = content.as_array()?;
    let mut parts: Vec<&str> = Vec::new();
    let mut tools: Vec<String> = Vec::new();
    for block in blocks {
        match get_str(block, "type") {
            Some("text") => {
                if let Some(text) = get_str(block, "text") {
                    let text = text.trim();
                    if !text.is_empty() {
                        parts.push(text);
                    }
                }
            }
            Some("tool_use") => {
                if let Some(name) = get_str(block, "name") {
                    if !tools.contains(&name.to_string()) {
                        tools.push(name.to_string());
                    }
                }
            }
            // tool_result, thinking, images: not conversation text.
            _ => {}
        }
    }

    if parts.is_empty() {
        return None;
    }
    let tool_names = if tools.is_empty() {
        None
    } else {
        Some(tools.join(","))
    };
    Some((parts.join("\n"), tool_names))
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
