// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conversation segmentation.
//!
//! Given a file's entries in (timestamp, id) order, open a segment with the
//! first entry and close it when the idle gap, entry count, or cumulative
//! content size would be exceeded. Boundaries are exact: a segment at a
//! threshold does not split; one entry over does.

use claudia_core::TranscriptEntry;
use claudia_store::SegmentSpec;

/// Thresholds bounding one conversation segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentOptions {
    /// Idle gap that closes a segment, in minutes.
    pub gap_minutes: i64,
    /// Maximum entries per segment.
    pub max_entries: usize,
    /// Maximum cumulative content bytes per segment.
    pub max_bytes: usize,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self {
            gap_minutes: 10,
            max_entries: 200,
            max_bytes: 80 * 1024,
        }
    }
}

impl SegmentOptions {
    pub fn gap_ms(&self) -> i64 {
        self.gap_minutes * 60 * 1000
    }
}

/// Split a file's entries into conversation segments.
pub fn segment_entries(entries: &[TranscriptEntry], options: &SegmentOptions) -> Vec<SegmentSpec> {
    let mut segments: Vec<SegmentSpec> = Vec::new();
    let mut count = 0usize;
    let mut bytes = 0usize;

    for entry in entries {
        let size = entry.content.len();
        let split = match segments.last() {
            None => true,
            Some(open) => {
                entry.timestamp - open.last_message_at > options.gap_ms()
                    || count + 1 > options.max_entries
                    || bytes + size > options.max_bytes
            }
        };

        if split {
            segments.push(SegmentSpec {
                session_id: entry.session_id.clone(),
                first_message_at: entry.timestamp,
                last_message_at: entry.timestamp,
                entry_count: 1,
            });
            count = 1;
            bytes = size;
        } else if let Some(open) = segments.last_mut() {
            open.last_message_at = entry.timestamp;
            open.entry_count += 1;
            count += 1;
            bytes += size;
        }
    }

    segments
}

#[cfg(test)]
#[path = "segment_tests.rs"]
mod tests;
