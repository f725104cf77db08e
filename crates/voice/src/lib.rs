// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! claudia-voice: streaming text-to-speech fan-out.
//!
//! Session text events are chunked into sentences, cleaned of markup, and
//! synthesized one sentence at a time against a streaming TTS endpoint.
//! Audio flows back to the originating client as `voice.audio_chunk`
//! events; utterances end with `voice.stream_end`.

pub mod bridge;
pub mod chunker;
pub mod clean;
pub mod tts;

pub use bridge::{TtsBridge, TtsBridgeConfig};
pub use chunker::SentenceChunker;
pub use clean::clean_sentence;
pub use tts::{wav_container, HttpTtsClient, TtsClient, TtsError};
