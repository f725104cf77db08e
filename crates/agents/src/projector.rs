// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Turn projection state.
//!
//! Tracks the bracket structure of one agent stream (`message_start` …
//! blocks … `message_stop` … `turn_stop`) so an interrupt can emit
//! synthetic stops for whatever is still open, and accumulates interactive
//! tool calls (with their streamed JSON input) for arbitration after
//! `message_stop`.

use crate::interactive::{auto_reply_template, is_interactive_tool};
use claudia_core::{AgentEvent, ContentBlock, ContentDelta, StopReason};

/// An interactive tool call awaiting a decision.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTool {
    pub tool_use_id: String,
    pub name: String,
    /// Input supplied whole on block start, if any.
    initial_input: serde_json::Value,
    /// Streamed `input_json_delta` fragments.
    partial_json: String,
    /// Block index while the call is still streaming.
    block_index: Option<usize>,
}

impl PendingTool {
    /// Best-effort final input: streamed JSON when present, else the
    /// initial value.
    pub fn input(&self) -> serde_json::Value {
        if !self.partial_json.is_empty() {
            if let Ok(parsed) = serde_json::from_str(&self.partial_json) {
                return parsed;
            }
        }
        self.initial_input.clone()
    }
}

/// What to do about an interactive tool once the message closed.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolDecision {
    /// Answer with a static template.
    AutoReply {
        tool_use_id: String,
        name: String,
        content: &'static str,
    },
    /// Forward upstream as a `request_tool_results` event.
    Forward {
        tool_use_id: String,
        name: String,
        input: serde_json::Value,
    },
}

/// Bracket + interactive-tool state for one session stream.
#[derive(Debug, Default)]
pub struct TurnTracker {
    message_open: bool,
    open_blocks: Vec<usize>,
    pending: Vec<PendingTool>,
}

impl TurnTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message_open(&self) -> bool {
        self.message_open
    }

    pub fn open_block_count(&self) -> usize {
        self.open_blocks.len()
    }

    /// Feed one event through the tracker. Returns the decisions to act on
    /// (non-empty only right after a `message_stop` with pending
    /// interactive tools).
    pub fn apply(&mut self, event: &AgentEvent) -> Vec<ToolDecision> {
        match event {
            AgentEvent::MessageStart { .. } => {
                self.message_open = true;
                self.open_blocks.clear();
            }
            AgentEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                self.open_blocks.push(*index);
                if let ContentBlock::ToolUse { id, name, input } = content_block {
                    if is_interactive_tool(name) {
                        self.pending.push(PendingTool {
                            tool_use_id: id.clone(),
                            name: name.clone(),
                            initial_input: input.clone(),
                            partial_json: String::new(),
                            block_index: Some(*index),
                        });
                    }
                }
            }
            AgentEvent::ContentBlockDelta { index, delta } => {
                if let ContentDelta::InputJson { partial_json } = delta {
                    if let Some(pending) = self
                        .pending
                        .iter_mut()
                        .find(|p| p.block_index == Some(*index))
                    {
                        pending.partial_json.push_str(partial_json);
                    }
                }
            }
            AgentEvent::ContentBlockStop { index } => {
                self.open_blocks.retain(|i| i != index);
                if let Some(pending) = self
                    .pending
                    .iter_mut()
                    .find(|p| p.block_index == Some(*index))
                {
                    pending.block_index = None;
                }
            }
            AgentEvent::ToolUse { id, name, input } => {
                // Non-streamed variant: arrives whole.
                if is_interactive_tool(name) {
                    self.pending.push(PendingTool {
                        tool_use_id: id.clone(),
                        name: name.clone(),
                        initial_input: input.clone(),
                        partial_json: String::new(),
                        block_index: None,
                    });
                }
            }
            AgentEvent::MessageStop { .. } => {
                self.message_open = false;
                self.open_blocks.clear();
                return self.drain_decisions();
            }
            AgentEvent::TurnStop { .. } => {
                self.message_open = false;
                self.open_blocks.clear();
                self.pending.clear();
            }
            _ => {}
        }
        Vec::new()
    }

    fn drain_decisions(&mut self) -> Vec<ToolDecision> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .map(|pending| match auto_reply_template(&pending.name) {
                Some(content) => ToolDecision::AutoReply {
                    tool_use_id: pending.tool_use_id,
                    name: pending.name,
                    content,
                },
                None => {
                    let input = pending.input();
                    ToolDecision::Forward {
                        tool_use_id: pending.tool_use_id,
                        name: pending.name,
                        input,
                    }
                }
            })
            .collect()
    }

    /// Synthetic events closing everything still open, ending with a
    /// `turn_stop(abort)`. Resets the tracker.
    pub fn synthetic_stops(&mut self) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        // Innermost first, so the stream stays well-bracketed.
        while let Some(index) = self.open_blocks.pop() {
            events.push(AgentEvent::ContentBlockStop { index });
        }
        if self.message_open {
            events.push(AgentEvent::MessageStop {
                stop_reason: Some(StopReason::Abort),
            });
            self.message_open = false;
        }
        events.push(AgentEvent::TurnStop {
            stop_reason: StopReason::Abort,
        });
        self.pending.clear();
        events
    }
}

#[cfg(test)]
#[path = "projector_tests.rs"]
mod tests;
