//! The librarian's size ceiling: an oversized transcript is skipped with
//! a reason citing size, no agent session is created, and the worker goes
//! back to idle.

use claudia_core::{ConversationStatus, FakeClock, Role, RpcError, SessionId};
use claudia_librarian::{AgentGateway, LibrarianConfig, LibrarianWorker};
use claudia_store::{NewEntry, SegmentSpec, Store};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct CountingGateway {
    opened: AtomicUsize,
}

#[async_trait::async_trait]
impl AgentGateway for CountingGateway {
    async fn open_session(&self, _: &str, _: &str) -> Result<SessionId, RpcError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(SessionId::new("job"))
    }
    async fn ask(&self, _: &SessionId, _: String, _: Duration) -> Result<String, RpcError> {
        Ok("SUMMARY: unreachable".to_string())
    }
    async fn close_session(&self, _: &SessionId) {}
}

#[tokio::test]
async fn oversized_transcript_skips_without_a_session() {
    let store = Arc::new(Store::open_in_memory().unwrap());

    // 50 entries of 4 KiB each: far past a 100 KiB ceiling.
    let blob = "x".repeat(4 * 1024);
    let entries: Vec<NewEntry> = (0..50)
        .map(|i| NewEntry {
            session_id: SessionId::new("sess-1"),
            source_file: "big.jsonl".to_string(),
            role: Role::User,
            content: blob.clone(),
            tool_names: None,
            timestamp: i * 1_000,
            cwd: None,
        })
        .collect();
    store
        .commit_file_pass(
            "big.jsonl",
            false,
            &entries,
            |all| {
                vec![SegmentSpec {
                    session_id: all[0].session_id.clone(),
                    first_message_at: all[0].timestamp,
                    last_message_at: all[all.len() - 1].timestamp,
                    entry_count: all.len() as i64,
                }]
            },
            1_000,
        )
        .unwrap();
    store.conversations_promote_ready(0, i64::MAX - 1).unwrap();
    store.conversations_queue_ready(10, 2_000).unwrap();
    let id = store.conversations_for_file("big.jsonl").unwrap()[0].id.clone();

    let gateway = Arc::new(CountingGateway {
        opened: AtomicUsize::new(0),
    });
    let worker = LibrarianWorker::new(
        Arc::clone(&store),
        gateway.clone(),
        LibrarianConfig::default(),
        FakeClock::new(5_000),
    );

    assert!(worker.step().await.unwrap());
    let row = store.conversation_get(&id).unwrap().unwrap();
    assert_eq!(row.status, ConversationStatus::Skipped);
    let reason = row.metadata.unwrap()["skip_reason"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(reason.contains("exceeds ceiling"), "reason: {reason}");
    assert_eq!(gateway.opened.load(Ordering::SeqCst), 0, "no session created");

    // Idle again: nothing left to do, nothing stuck in processing.
    assert!(!worker.step().await.unwrap());
    assert!(!store.conversation_any_processing().unwrap());
}
