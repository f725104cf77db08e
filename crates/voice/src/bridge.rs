// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The streaming TTS bridge.
//!
//! Clients opt a session in; from then on each text content block becomes
//! an utterance. Deltas stream through the sentence chunker, cleaned
//! sentences queue to a single per-utterance worker, and the worker speaks
//! one sentence per vendor connection, forwarding audio to the originating
//! client. Aborts discard queued sentences and flag the stream end.

use crate::chunker::SentenceChunker;
use crate::clean::clean_sentence;
use crate::tts::{wav_container, TtsClient, TtsError};
use claudia_core::{AgentEvent, BusEvent, ConnectionId, ContentBlock, SessionId, StopReason, StreamId};
use base64::Engine;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Bridge configuration.
#[derive(Debug, Clone)]
pub struct TtsBridgeConfig {
    /// Where finished utterances are saved (`audio/<session>/<stream>.wav`).
    pub audio_dir: Option<PathBuf>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Hard fallback for the vendor's terminal done signal.
    pub sentence_timeout: Duration,
}

impl Default for TtsBridgeConfig {
    fn default() -> Self {
        Self {
            audio_dir: None,
            sample_rate: 24_000,
            channels: 1,
            sentence_timeout: Duration::from_secs(10),
        }
    }
}

struct Utterance {
    stream_id: StreamId,
    chunker: SentenceChunker,
    queue_tx: mpsc::Sender<String>,
    aborted: Arc<AtomicBool>,
}

/// Fans session text out to the TTS vendor and audio back to the client.
pub struct TtsBridge {
    tts: Arc<dyn TtsClient>,
    sink: mpsc::Sender<BusEvent>,
    config: TtsBridgeConfig,
    targets: Mutex<HashMap<SessionId, ConnectionId>>,
    utterances: Mutex<HashMap<SessionId, Utterance>>,
}

impl TtsBridge {
    pub fn new(
        tts: Arc<dyn TtsClient>,
        sink: mpsc::Sender<BusEvent>,
        config: TtsBridgeConfig,
    ) -> Self {
        Self {
            tts,
            sink,
            config,
            targets: Mutex::new(HashMap::new()),
            utterances: Mutex::new(HashMap::new()),
        }
    }

    /// Route a session's speech to a client connection.
    pub fn enable(&self, session_id: SessionId, connection_id: ConnectionId) {
        self.targets.lock().insert(session_id, connection_id);
    }

    /// Stop voicing a session; an in-flight utterance is aborted.
    pub fn disable(&self, session_id: &SessionId) -> bool {
        let had_target = self.targets.lock().remove(session_id).is_some();
        if let Some(utterance) = self.utterances.lock().remove(session_id) {
            utterance.aborted.store(true, Ordering::SeqCst);
        }
        had_target
    }

    pub fn enabled_sessions(&self) -> Vec<SessionId> {
        self.targets.lock().keys().cloned().collect()
    }

    /// Feed one bus event through the bridge. Only `sse.*` events for
    /// voiced sessions do anything.
    pub async fn handle_event(&self, bus_event: &BusEvent) {
        if !bus_event.event.starts_with("sse.") {
            return;
        }
        let Some(session_id) = bus_event
            .payload
            .get("session_id")
            .and_then(|v| v.as_str())
            .map(SessionId::new)
        else {
            return;
        };
        let Some(connection_id) = self.targets.lock().get(&session_id).cloned() else {
            return;
        };
        let Some(event) = bus_event
            .payload
            .get("event")
            .cloned()
            .and_then(|v| serde_json::from_value::<AgentEvent>(v).ok())
        else {
            return;
        };

        match event {
            AgentEvent::ContentBlockStart {
                content_block: ContentBlock::Text { text },
                ..
            } => {
                self.start_utterance(&session_id, &connection_id).await;
                if !text.is_empty() {
                    self.feed(&session_id, &text).await;
                }
            }
            AgentEvent::ContentBlockDelta { delta, .. } => {
                if let claudia_core::ContentDelta::Text { text } = delta {
                    self.feed(&session_id, &text).await;
                }
            }
            AgentEvent::MessageStop { .. } => {
                self.finish(&session_id).await;
            }
            AgentEvent::TurnStop {
                stop_reason: StopReason::Abort,
            } => {
                self.abort(&session_id);
            }
            _ => {}
        }
    }

    async fn start_utterance(&self, session_id: &SessionId, connection_id: &ConnectionId) {
        // A new text block supersedes any utterance still draining.
        let previous = self.utterances.lock().remove(session_id);
        drop(previous);

        let stream_id = StreamId::generate();
        let (queue_tx, queue_rx) = mpsc::channel::<String>(64);
        let aborted = Arc::new(AtomicBool::new(false));

        let worker = UtteranceWorker {
            session_id: session_id.clone(),
            stream_id: stream_id.clone(),
            connection_id: connection_id.clone(),
            aborted: Arc::clone(&aborted),
            tts: Arc::clone(&self.tts),
            sink: self.sink.clone(),
            config: self.config.clone(),
        };
        tokio::spawn(worker.run(queue_rx));

        self.utterances.lock().insert(
            session_id.clone(),
            Utterance {
                stream_id,
                chunker: SentenceChunker::new(),
                queue_tx,
                aborted,
            },
        );
    }

    async fn feed(&self, session_id: &SessionId, text: &str) {
        let (sentences, queue_tx) = {
            let mut utterances = self.utterances.lock();
            let Some(utterance) = utterances.get_mut(session_id) else {
                return;
            };
            (utterance.chunker.feed(text), utterance.queue_tx.clone())
        };
        for sentence in sentences {
            let cleaned = clean_sentence(&sentence);
            if cleaned.is_empty() {
                continue;
            }
            if queue_tx.send(cleaned).await.is_err() {
                return;
            }
        }
    }

    /// Flush trailing text and let the worker drain to `stream_end`.
    async fn finish(&self, session_id: &SessionId) {
        let Some(mut utterance) = self.utterances.lock().remove(session_id) else {
            return;
        };
        if let Some(rest) = utterance.chunker.flush() {
            let cleaned = clean_sentence(&rest);
            if !cleaned.is_empty() {
                let _ = utterance.queue_tx.send(cleaned).await;
            }
        }
        // Dropping the sender closes the queue; the worker emits
        // stream_end after the backlog drains.
    }

    /// Abort: discard queued sentences, flag the end.
    fn abort(&self, session_id: &SessionId) {
        if let Some(utterance) = self.utterances.lock().remove(session_id) {
            utterance.aborted.store(true, Ordering::SeqCst);
            debug!(session_id = %session_id, stream_id = %utterance.stream_id, "utterance aborted");
        }
    }
}

struct UtteranceWorker {
    session_id: SessionId,
    stream_id: StreamId,
    connection_id: ConnectionId,
    aborted: Arc<AtomicBool>,
    tts: Arc<dyn TtsClient>,
    sink: mpsc::Sender<BusEvent>,
    config: TtsBridgeConfig,
}

impl UtteranceWorker {
    async fn run(self, mut queue_rx: mpsc::Receiver<String>) {
        let mut utterance_pcm: Vec<u8> = Vec::new();
        let mut seq: u64 = 0;

        while let Some(sentence) = queue_rx.recv().await {
            if self.aborted.load(Ordering::SeqCst) {
                continue;
            }
            match self.synthesize_with_retry(&sentence).await {
                Ok(pcm) => {
                    seq += 1;
                    let wav = wav_container(&pcm, self.config.sample_rate, self.config.channels);
                    let audio = base64::engine::general_purpose::STANDARD.encode(&wav);
                    self.emit(
                        "voice.audio_chunk",
                        serde_json::json!({
                            "session_id": self.session_id,
                            "stream_id": self.stream_id,
                            "seq": seq,
                            "format": "wav",
                            "audio": audio,
                        }),
                    )
                    .await;
                    utterance_pcm.extend_from_slice(&pcm);
                }
                Err(e) => {
                    warn!(stream_id = %self.stream_id, error = %e, "sentence dropped");
                    self.emit(
                        "voice.error",
                        serde_json::json!({
                            "session_id": self.session_id,
                            "stream_id": self.stream_id,
                            "error": e.to_string(),
                        }),
                    )
                    .await;
                }
            }
        }

        let aborted = self.aborted.load(Ordering::SeqCst);
        if !aborted && !utterance_pcm.is_empty() {
            self.save_audio(&utterance_pcm);
        }
        self.emit(
            "voice.stream_end",
            serde_json::json!({
                "session_id": self.session_id,
                "stream_id": self.stream_id,
                "aborted": aborted,
                "chunks": seq,
            }),
        )
        .await;
    }

    /// One retry; two failures drop the sentence.
    async fn synthesize_with_retry(&self, sentence: &str) -> Result<Vec<u8>, TtsError> {
        match self.synthesize_once(sentence).await {
            Ok(pcm) => Ok(pcm),
            Err(first) => {
                debug!(error = %first, "sentence synthesis failed, retrying once");
                self.synthesize_once(sentence).await
            }
        }
    }

    /// One vendor connection for one sentence, bounded by the hard
    /// timeout on the terminal done signal.
    async fn synthesize_once(&self, sentence: &str) -> Result<Vec<u8>, TtsError> {
        let (audio_tx, mut audio_rx) = mpsc::channel::<bytes::Bytes>(32);
        let tts = Arc::clone(&self.tts);
        let text = sentence.to_string();
        let synth = tokio::spawn(async move { tts.synthesize(&text, audio_tx).await });

        let result = tokio::time::timeout(self.config.sentence_timeout, async {
            let mut pcm = Vec::new();
            while let Some(chunk) = audio_rx.recv().await {
                pcm.extend_from_slice(&chunk);
            }
            match synth.await {
                Ok(Ok(())) => Ok(pcm),
                Ok(Err(e)) => Err(e),
                Err(e) => Err(TtsError::Stream(e.to_string())),
            }
        })
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => Err(TtsError::Stream(
                "no done signal within the fallback window".to_string(),
            )),
        }
    }

    async fn emit(&self, event: &str, payload: serde_json::Value) {
        let _ = self
            .sink
            .send(BusEvent::new(event, payload).for_connection(self.connection_id.clone()))
            .await;
    }

    fn save_audio(&self, pcm: &[u8]) {
        let Some(dir) = &self.config.audio_dir else {
            return;
        };
        let dir = dir.join(self.session_id.as_str());
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!(error = %e, "cannot create audio dir");
            return;
        }
        let path = dir.join(format!("{}.wav", self.stream_id));
        let wav = wav_container(pcm, self.config.sample_rate, self.config.channels);
        if let Err(e) = std::fs::write(&path, wav) {
            warn!(error = %e, path = %path.display(), "cannot save utterance audio");
        }
    }
}

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;
