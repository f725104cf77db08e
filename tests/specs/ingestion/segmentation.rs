//! Segmentation thresholds: counts and bytes split exactly one entry
//! past the bound, and re-running produces the same conversations.

use claudia_core::{Role, SessionId, TranscriptEntry};
use claudia_ingest::{segment_entries, SegmentOptions};

fn entries_one_second_apart(count: usize) -> Vec<TranscriptEntry> {
    (0..count)
        .map(|i| TranscriptEntry {
            id: i as i64,
            session_id: SessionId::new("sess-1"),
            source_file: "a.jsonl".to_string(),
            role: Role::User,
            content: "m".to_string(),
            tool_names: None,
            timestamp: (i as i64) * 1_000,
            cwd: None,
            ingested_at: 0,
        })
        .collect()
}

#[test]
fn two_hundred_one_entries_split_200_and_1() {
    let options = SegmentOptions {
        max_entries: 200,
        ..SegmentOptions::default()
    };
    let segments = segment_entries(&entries_one_second_apart(201), &options);
    let counts: Vec<i64> = segments.iter().map(|s| s.entry_count).collect();
    assert_eq!(counts, [200, 1]);
}

#[test]
fn exactly_two_hundred_does_not_split() {
    let segments = segment_entries(
        &entries_one_second_apart(200),
        &SegmentOptions::default(),
    );
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].entry_count, 200);
}

#[test]
fn segmentation_is_deterministic() {
    let entries = entries_one_second_apart(321);
    let options = SegmentOptions::default();
    assert_eq!(
        segment_entries(&entries, &options),
        segment_entries(&entries, &options)
    );
}
