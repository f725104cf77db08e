// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::tts::{TtsClient, TtsError};
use async_trait::async_trait;
use bytes::Bytes;
use claudia_core::ContentDelta;
use std::sync::atomic::AtomicUsize;
use tokio::time::timeout;

/// Scripted TTS backend: records sentences, optionally failing the first
/// N attempts.
struct FakeTts {
    spoken: Mutex<Vec<String>>,
    fail_first: AtomicUsize,
}

impl FakeTts {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            spoken: Mutex::new(Vec::new()),
            fail_first: AtomicUsize::new(0),
        })
    }

    fn failing(first_n: usize) -> Arc<Self> {
        Arc::new(Self {
            spoken: Mutex::new(Vec::new()),
            fail_first: AtomicUsize::new(first_n),
        })
    }

    fn spoken(&self) -> Vec<String> {
        self.spoken.lock().clone()
    }
}

#[async_trait]
impl TtsClient for FakeTts {
    async fn synthesize(&self, text: &str, audio_tx: mpsc::Sender<Bytes>) -> Result<(), TtsError> {
        let remaining = self.fail_first.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first.store(remaining - 1, Ordering::SeqCst);
            return Err(TtsError::Endpoint("scripted failure".to_string()));
        }
        self.spoken.lock().push(text.to_string());
        // Two PCM chunks per sentence.
        let _ = audio_tx.send(Bytes::from_static(&[1, 2, 3, 4])).await;
        let _ = audio_tx.send(Bytes::from_static(&[5, 6])).await;
        Ok(())
    }
}

struct World {
    bridge: Arc<TtsBridge>,
    tts: Arc<FakeTts>,
    events: mpsc::Receiver<BusEvent>,
}

fn world_with(tts: Arc<FakeTts>, audio_dir: Option<PathBuf>) -> World {
    let (sink, events) = mpsc::channel(256);
    let bridge = Arc::new(TtsBridge::new(
        tts.clone(),
        sink,
        TtsBridgeConfig {
            audio_dir,
            sentence_timeout: Duration::from_secs(2),
            ..TtsBridgeConfig::default()
        },
    ));
    World {
        bridge,
        tts,
        events,
    }
}

fn sse(session: &str, event: AgentEvent) -> BusEvent {
    BusEvent::new(
        format!("sse.{}", event.name()),
        serde_json::json!({ "session_id": session, "event": event }),
    )
}

fn text_block_start(text: &str) -> AgentEvent {
    AgentEvent::ContentBlockStart {
        index: 0,
        content_block: ContentBlock::Text {
            text: text.to_string(),
        },
    }
}

fn text_delta(text: &str) -> AgentEvent {
    AgentEvent::ContentBlockDelta {
        index: 0,
        delta: ContentDelta::Text {
            text: text.to_string(),
        },
    }
}

async fn next_event(rx: &mut mpsc::Receiver<BusEvent>) -> BusEvent {
    timeout(Duration::from_secs(3), rx.recv())
        .await
        .expect("timed out waiting for voice event")
        .expect("event channel closed")
}

#[tokio::test]
async fn speaks_sentences_and_ends_the_stream() {
    let mut w = world_with(FakeTts::new(), None);
    w.bridge
        .enable(SessionId::new("s1"), ConnectionId::new("c1"));

    w.bridge.handle_event(&sse("s1", text_block_start(""))).await;
    for delta in ["Hello", " ", "world.", " Next", " one?", " end."] {
        w.bridge.handle_event(&sse("s1", text_delta(delta))).await;
    }
    w.bridge
        .handle_event(&sse("s1", AgentEvent::MessageStop { stop_reason: None }))
        .await;

    let chunk = next_event(&mut w.events).await;
    assert_eq!(chunk.event, "voice.audio_chunk");
    assert_eq!(chunk.connection_id, Some(ConnectionId::new("c1")));
    assert_eq!(chunk.payload["seq"], 1);
    assert_eq!(chunk.payload["format"], "wav");

    assert_eq!(next_event(&mut w.events).await.event, "voice.audio_chunk");
    assert_eq!(next_event(&mut w.events).await.event, "voice.audio_chunk");

    let end = next_event(&mut w.events).await;
    assert_eq!(end.event, "voice.stream_end");
    assert_eq!(end.payload["aborted"], false);
    assert_eq!(end.payload["chunks"], 3);

    assert_eq!(
        w.tts.spoken(),
        ["Hello world.", "Next one?", "end."]
    );
}

#[tokio::test]
async fn audio_chunks_are_wav_containers() {
    let mut w = world_with(FakeTts::new(), None);
    w.bridge
        .enable(SessionId::new("s1"), ConnectionId::new("c1"));
    w.bridge.handle_event(&sse("s1", text_block_start("Hi there. "))).await;
    w.bridge
        .handle_event(&sse("s1", AgentEvent::MessageStop { stop_reason: None }))
        .await;

    let chunk = next_event(&mut w.events).await;
    let audio = base64::engine::general_purpose::STANDARD
        .decode(chunk.payload["audio"].as_str().unwrap())
        .unwrap();
    assert_eq!(&audio[0..4], b"RIFF");
    // 6 bytes of scripted PCM follow the 44-byte header.
    assert_eq!(audio.len(), 50);
}

#[tokio::test]
async fn sessions_without_voice_are_ignored() {
    let mut w = world_with(FakeTts::new(), None);
    w.bridge.handle_event(&sse("s1", text_block_start("Hello. "))).await;
    w.bridge
        .handle_event(&sse("s1", AgentEvent::MessageStop { stop_reason: None }))
        .await;

    assert!(
        timeout(Duration::from_millis(200), w.events.recv())
            .await
            .is_err(),
        "no events expected for an unvoiced session"
    );
}

#[tokio::test]
async fn failed_sentence_retries_once_then_errors() {
    // First attempt fails, retry succeeds.
    let mut w = world_with(FakeTts::failing(1), None);
    w.bridge
        .enable(SessionId::new("s1"), ConnectionId::new("c1"));
    w.bridge.handle_event(&sse("s1", text_block_start("Hello. "))).await;
    w.bridge
        .handle_event(&sse("s1", AgentEvent::MessageStop { stop_reason: None }))
        .await;

    assert_eq!(next_event(&mut w.events).await.event, "voice.audio_chunk");
    assert_eq!(next_event(&mut w.events).await.event, "voice.stream_end");
}

#[tokio::test]
async fn two_failures_drop_the_sentence_with_an_error() {
    let mut w = world_with(FakeTts::failing(2), None);
    w.bridge
        .enable(SessionId::new("s1"), ConnectionId::new("c1"));
    w.bridge.handle_event(&sse("s1", text_block_start("Hello. "))).await;
    w.bridge
        .handle_event(&sse("s1", AgentEvent::MessageStop { stop_reason: None }))
        .await;

    let error = next_event(&mut w.events).await;
    assert_eq!(error.event, "voice.error");
    let end = next_event(&mut w.events).await;
    assert_eq!(end.event, "voice.stream_end");
    assert_eq!(end.payload["chunks"], 0);
}

#[tokio::test]
async fn abort_discards_queue_and_flags_the_end() {
    let mut w = world_with(FakeTts::new(), None);
    w.bridge
        .enable(SessionId::new("s1"), ConnectionId::new("c1"));
    w.bridge.handle_event(&sse("s1", text_block_start(""))).await;
    w.bridge
        .handle_event(&sse("s1", text_delta("One. Two. Three. ")))
        .await;
    w.bridge
        .handle_event(&sse(
            "s1",
            AgentEvent::TurnStop {
                stop_reason: StopReason::Abort,
            },
        ))
        .await;

    // Everything after the abort flag is discarded; the stream end says so.
    let mut end = None;
    for _ in 0..10 {
        let event = next_event(&mut w.events).await;
        if event.event == "voice.stream_end" {
            end = Some(event);
            break;
        }
    }
    let end = end.expect("no stream_end");
    assert_eq!(end.payload["aborted"], true);
}

#[tokio::test]
async fn pure_markup_sentences_are_skipped() {
    let mut w = world_with(FakeTts::new(), None);
    w.bridge
        .enable(SessionId::new("s1"), ConnectionId::new("c1"));
    w.bridge.handle_event(&sse("s1", text_block_start(""))).await;
    w.bridge
        .handle_event(&sse("s1", text_delta("https://example.com. Speak this. ")))
        .await;
    w.bridge
        .handle_event(&sse("s1", AgentEvent::MessageStop { stop_reason: None }))
        .await;

    next_event(&mut w.events).await; // the single audio chunk
    let end = next_event(&mut w.events).await;
    assert_eq!(end.event, "voice.stream_end");
    assert_eq!(w.tts.spoken(), ["Speak this."]);
}

#[tokio::test]
async fn finished_utterance_is_saved_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let mut w = world_with(FakeTts::new(), Some(dir.path().to_path_buf()));
    w.bridge
        .enable(SessionId::new("s1"), ConnectionId::new("c1"));
    w.bridge.handle_event(&sse("s1", text_block_start("Hello. "))).await;
    w.bridge
        .handle_event(&sse("s1", AgentEvent::MessageStop { stop_reason: None }))
        .await;

    next_event(&mut w.events).await;
    let end = next_event(&mut w.events).await;
    let stream_id = end.payload["stream_id"].as_str().unwrap();
    let path = dir.path().join("s1").join(format!("{stream_id}.wav"));
    assert!(path.exists(), "missing {}", path.display());
}

#[tokio::test]
async fn disable_stops_future_speech() {
    let mut w = world_with(FakeTts::new(), None);
    w.bridge
        .enable(SessionId::new("s1"), ConnectionId::new("c1"));
    assert!(w.bridge.disable(&SessionId::new("s1")));
    assert!(!w.bridge.disable(&SessionId::new("s1")));

    w.bridge.handle_event(&sse("s1", text_block_start("Hello. "))).await;
    assert!(
        timeout(Duration::from_millis(200), w.events.recv())
            .await
            .is_err()
    );
}
