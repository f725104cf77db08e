// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The streaming TTS vendor contract and the WAV container.
//!
//! One connection per sentence: open, send the text, stream audio chunks
//! back, close. Raw PCM is wrapped in a RIFF/WAVE header before leaving
//! the core so the payload is self-describing.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from a synthesis attempt.
#[derive(Debug, Error)]
pub enum TtsError {
    #[error("tts endpoint error: {0}")]
    Endpoint(String),

    #[error("tts stream error: {0}")]
    Stream(String),
}

/// A streaming synthesis backend.
///
/// `synthesize` opens one connection for `text`, pushes raw PCM chunks
/// into `audio_tx` as they arrive, and returns once the vendor signals
/// done. Dropping `audio_tx` mid-stream cancels the transfer.
#[async_trait]
pub trait TtsClient: Send + Sync + 'static {
    async fn synthesize(&self, text: &str, audio_tx: mpsc::Sender<Bytes>) -> Result<(), TtsError>;
}

/// HTTP streaming client against a vendor endpoint.
#[derive(Debug, Clone)]
pub struct HttpTtsClient {
    client: reqwest::Client,
    endpoint: String,
    voice: Option<String>,
}

impl HttpTtsClient {
    pub fn new(endpoint: impl Into<String>, voice: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            voice,
        }
    }
}

#[async_trait]
impl TtsClient for HttpTtsClient {
    async fn synthesize(&self, text: &str, audio_tx: mpsc::Sender<Bytes>) -> Result<(), TtsError> {
        let body = serde_json::json!({
            "text": text,
            "voice": self.voice,
        });
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| TtsError::Endpoint(e.to_string()))?;
        if !response.status().is_success() {
            return Err(TtsError::Endpoint(format!(
                "status {}",
                response.status()
            )));
        }

        let mut response = response;
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    if audio_tx.send(chunk).await.is_err() {
                        // Receiver gone: the utterance was aborted.
                        return Ok(());
                    }
                }
                Ok(None) => return Ok(()),
                Err(e) => return Err(TtsError::Stream(e.to_string())),
            }
        }
    }
}

/// Wrap raw PCM (signed 16-bit little-endian) in a RIFF/WAVE container.
pub fn wav_container(pcm: &[u8], sample_rate: u32, channels: u16) -> Vec<u8> {
    const BITS_PER_SAMPLE: u16 = 16;
    let byte_rate = sample_rate * u32::from(channels) * u32::from(BITS_PER_SAMPLE) / 8;
    let block_align = channels * BITS_PER_SAMPLE / 8;
    let data_len = pcm.len() as u32;

    let mut out = Vec::with_capacity(44 + pcm.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(pcm);
    out
}

#[cfg(test)]
#[path = "tts_tests.rs"]
mod tests;
