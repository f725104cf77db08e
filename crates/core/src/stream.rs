// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed events produced by an agent session's child process.
//!
//! The child emits one JSON object per line in the shape below; the manager
//! republishes them unchanged as `sse` bus events and synthesizes lifecycle
//! events around them. A turn is well-bracketed:
//! `message_start … (content_block_start … content_block_stop)* …
//! message_stop … turn_stop`.

use serde::{Deserialize, Serialize};

/// Why a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    ToolUse,
    Abort,
    Error,
}

/// A content block opened by `content_block_start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text {
        #[serde(default)]
        text: String,
    },

    #[serde(rename = "thinking")]
    Thinking {
        #[serde(default)]
        thinking: String,
    },

    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },

    /// Catch-all for block types we do not interpret.
    #[serde(other)]
    Other,
}

/// Incremental content for an open block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentDelta {
    #[serde(rename = "text_delta")]
    Text { text: String },

    #[serde(rename = "thinking_delta")]
    Thinking { thinking: String },

    #[serde(rename = "input_json_delta")]
    InputJson { partial_json: String },

    #[serde(other)]
    Other,
}

/// Events in an agent session's stream.
///
/// Serializes with `{"type": "message_start", ...fields}` format. Unknown
/// type tags deserialize to `Other` so a newer child cannot wedge the
/// reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AgentEvent {
    #[serde(rename = "message_start")]
    MessageStart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },

    #[serde(rename = "content_block_start")]
    ContentBlockStart {
        index: usize,
        content_block: ContentBlock,
    },

    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { index: usize, delta: ContentDelta },

    #[serde(rename = "content_block_stop")]
    ContentBlockStop { index: usize },

    #[serde(rename = "message_stop")]
    MessageStop {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stop_reason: Option<StopReason>,
    },

    /// End of one full turn; always the last event of a turn.
    #[serde(rename = "turn_stop")]
    TurnStop { stop_reason: StopReason },

    /// The child wants a tool result before continuing.
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },

    /// Final result summary for a turn (usage, cost, …). Passed through.
    #[serde(rename = "result")]
    Result {
        #[serde(default)]
        payload: serde_json::Value,
    },

    /// Out-of-band system information from the child.
    #[serde(rename = "system")]
    System {
        #[serde(default)]
        payload: serde_json::Value,
    },

    #[serde(other)]
    Other,
}

impl AgentEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AgentEvent::MessageStart { .. } => "message_start",
            AgentEvent::ContentBlockStart { .. } => "content_block_start",
            AgentEvent::ContentBlockDelta { .. } => "content_block_delta",
            AgentEvent::ContentBlockStop { .. } => "content_block_stop",
            AgentEvent::MessageStop { .. } => "message_stop",
            AgentEvent::TurnStop { .. } => "turn_stop",
            AgentEvent::ToolUse { .. } => "tool_use",
            AgentEvent::Result { .. } => "result",
            AgentEvent::System { .. } => "system",
            AgentEvent::Other => "other",
        }
    }

    /// Text carried by this event, for subscribers that only care about
    /// spoken/rendered output (the TTS bridge).
    pub fn text_payload(&self) -> Option<&str> {
        match self {
            AgentEvent::ContentBlockStart {
                content_block: ContentBlock::Text { text },
                ..
            } => Some(text.as_str()),
            AgentEvent::ContentBlockDelta {
                delta: ContentDelta::Text { text },
                ..
            } => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn log_summary(&self) -> String {
        let t = self.name();
        match self {
            AgentEvent::ContentBlockStart { index, .. }
            | AgentEvent::ContentBlockDelta { index, .. }
            | AgentEvent::ContentBlockStop { index } => format!("{t} index={index}"),
            AgentEvent::MessageStop { stop_reason } => match stop_reason {
                Some(r) => format!("{t} stop_reason={r:?}"),
                None => t.to_string(),
            },
            AgentEvent::TurnStop { stop_reason } => format!("{t} stop_reason={stop_reason:?}"),
            AgentEvent::ToolUse { id, name, .. } => format!("{t} id={id} name={name}"),
            _ => t.to_string(),
        }
    }
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
