// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transcript formatting and reply parsing.

use claudia_core::{Conversation, Role, TranscriptEntry};

/// Render a conversation's entries for the agent.
pub fn format_transcript(entries: &[TranscriptEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let speaker = match entry.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        out.push_str(speaker);
        if let Some(tools) = &entry.tool_names {
            out.push_str(&format!(" (tools: {tools})"));
        }
        out.push_str(": ");
        out.push_str(entry.content.trim());
        out.push_str("\n\n");
    }
    out
}

/// Context from previously archived conversations of the same file.
pub fn context_block(previous: &[Conversation]) -> String {
    if previous.is_empty() {
        return String::new();
    }
    let mut out = String::from("Context from earlier conversations in this session:\n");
    for conversation in previous {
        let summary = conversation
            .summary
            .as_deref()
            .unwrap_or("(no summary recorded)");
        out.push_str("- ");
        out.push_str(summary);
        out.push('\n');
    }
    out.push('\n');
    out
}

/// The agent's verdict on a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    Skip { reason: String },
    Summary { summary: String },
}

/// Parse the agent's reply.
///
/// Recognized forms are `SKIP: <reason>` and `SUMMARY: <summary>` on any
/// line; otherwise the last non-empty line is taken as the summary.
pub fn parse_reply(reply: &str) -> ReplyOutcome {
    for line in reply.lines() {
        let line = line.trim();
        if let Some(reason) = line.strip_prefix("SKIP:") {
            return ReplyOutcome::Skip {
                reason: reason.trim().to_string(),
            };
        }
        if let Some(summary) = line.strip_prefix("SUMMARY:") {
            return ReplyOutcome::Summary {
                summary: summary.trim().to_string(),
            };
        }
    }
    let fallback = reply
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
        .to_string();
    ReplyOutcome::Summary { summary: fallback }
}

/// Commit message: `librarian(<conversationId>): <summary-first-100-chars>`.
pub fn commit_message(conversation_id: &str, summary: &str) -> String {
    let head: String = summary.chars().take(100).collect();
    format!("librarian({conversation_id}): {head}")
}

#[cfg(test)]
#[path = "transcript_tests.rs"]
mod tests;
