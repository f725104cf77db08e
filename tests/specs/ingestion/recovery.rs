//! Crash recovery: an interrupted file pass rolls back to a committed
//! prefix, and the next pass converges on the clean-ingest result.

use claudia_core::clock::format_rfc3339;
use claudia_core::FakeClock;
use claudia_ingest::{ClaudeLogParser, IngestOptions, IngestPipeline, SegmentOptions};
use claudia_store::{NewEntry, Store};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

fn log_line(seconds: i64) -> String {
    format!(
        r#"{{"type":"user","sessionId":"sess-1","timestamp":"{}","message":{{"content":"m{seconds}"}}}}"#,
        format_rfc3339(seconds * 1_000)
    )
}

struct Setup {
    _dir: tempfile::TempDir,
    store: Arc<Store>,
    pipeline: IngestPipeline<FakeClock>,
    path: PathBuf,
}

fn setup() -> Setup {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("logs");
    std::fs::create_dir_all(&base).unwrap();
    let store = Arc::new(Store::open_in_memory().unwrap());
    let pipeline = IngestPipeline::new(
        Arc::clone(&store),
        Arc::new(ClaudeLogParser),
        base.clone(),
        IngestOptions::default(),
        FakeClock::new(10_000_000),
    );
    Setup {
        path: base.join("a.jsonl"),
        _dir: dir,
        store,
        pipeline,
    }
}

fn write_lines(path: &std::path::Path, seconds: &[i64], append: bool) {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(append)
        .write(true)
        .open(path)
        .unwrap();
    for s in seconds {
        writeln!(file, "{}", log_line(*s)).unwrap();
    }
}

#[test]
fn interrupted_pass_recovers_then_converges() {
    let s = setup();

    // A committed pass over t = 0, 60 seconds.
    write_lines(&s.path, &[0, 60], false);
    s.pipeline.ingest_file(&s.path).unwrap();

    // The file grows; a second pass inserts t = 120 and crashes before
    // phase 3.
    write_lines(&s.path, &[120, 1000, 1060], true);
    let size = std::fs::metadata(&s.path).unwrap().len() as i64;
    s.store
        .file_mark_ingesting("a.jsonl", "claude", size, 0, 10_000_000)
        .unwrap();
    let partial = vec![NewEntry {
        session_id: claudia_core::SessionId::new("sess-1"),
        source_file: "a.jsonl".to_string(),
        role: claudia_core::Role::User,
        content: "m120".to_string(),
        tool_names: None,
        timestamp: 120_000,
        cwd: None,
    }];
    let opts = SegmentOptions::default();
    s.store
        .commit_file_pass(
            "a.jsonl",
            false,
            &partial,
            |entries| claudia_ingest::segment_entries(entries, &opts),
            10_000_000,
        )
        .unwrap();

    // Recovery rolls the file back to the committed prefix…
    s.pipeline.recover().unwrap();
    let after_recovery: Vec<i64> = s
        .store
        .entries_for_file("a.jsonl")
        .unwrap()
        .iter()
        .map(|e| e.timestamp / 1_000)
        .collect();
    assert_eq!(after_recovery, [0, 60]);

    // …and the next pass matches a clean single-pass ingest.
    s.pipeline.ingest_file(&s.path).unwrap();
    let timestamps: Vec<i64> = s
        .store
        .entries_for_file("a.jsonl")
        .unwrap()
        .iter()
        .map(|e| e.timestamp / 1_000)
        .collect();
    assert_eq!(timestamps, [0, 60, 120, 1000, 1060]);

    let conversations = s.store.conversations_for_file("a.jsonl").unwrap();
    assert_eq!(conversations.len(), 2);
    assert_eq!(
        (conversations[0].first_message_at, conversations[0].last_message_at),
        (0, 120_000)
    );
    assert_eq!(
        (conversations[1].first_message_at, conversations[1].last_message_at),
        (1_000_000, 1_060_000)
    );
}

#[test]
fn reingesting_an_unchanged_file_is_a_no_op() {
    let s = setup();
    write_lines(&s.path, &[0, 60], false);
    s.pipeline.ingest_file(&s.path).unwrap();

    let stats = s.pipeline.ingest_file(&s.path).unwrap();
    assert_eq!(stats.files_processed, 1);
    assert_eq!(stats.entries_inserted, 0);
}

#[test]
fn offsets_never_move_backwards() {
    let s = setup();
    write_lines(&s.path, &[0], false);
    s.pipeline.ingest_file(&s.path).unwrap();
    let first = s
        .store
        .file_state("a.jsonl")
        .unwrap()
        .unwrap()
        .last_processed_offset;

    write_lines(&s.path, &[60], true);
    s.pipeline.ingest_file(&s.path).unwrap();
    let second = s
        .store
        .file_state("a.jsonl")
        .unwrap()
        .unwrap()
        .last_processed_offset;
    assert!(second > first);
}
