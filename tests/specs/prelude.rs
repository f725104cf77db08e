//! Shared helpers for the behavioral specs.

use claudia_agents::fake::FakeLauncher;
use claudia_core::{AgentEvent, ContentBlock, ContentDelta, Envelope, StopReason, SystemClock};
use claudia_gateway::app::GatewayDeps;
use claudia_gateway::{Config, Gateway};
use claudia_voice::{TtsClient, TtsError};
use std::sync::Arc;

pub struct NullTts;

#[async_trait::async_trait]
impl TtsClient for NullTts {
    async fn synthesize(
        &self,
        _text: &str,
        _audio_tx: tokio::sync::mpsc::Sender<bytes::Bytes>,
    ) -> Result<(), TtsError> {
        Ok(())
    }
}

pub struct World {
    pub gateway: Arc<Gateway<SystemClock>>,
    pub launcher: FakeLauncher,
    #[allow(dead_code)]
    pub data_dir: tempfile::TempDir,
}

/// Assemble a full gateway against a scripted agent launcher.
pub fn gateway_world() -> World {
    let data_dir = tempfile::tempdir().unwrap();
    let log_dir = data_dir.path().join("agent-logs");
    std::fs::create_dir_all(&log_dir).unwrap();
    std::fs::write(
        data_dir.path().join("config.toml"),
        format!("agent_log_dir = '{}'\n", log_dir.display()),
    )
    .unwrap();

    let config = Config::load_from(data_dir.path()).unwrap();
    let launcher = FakeLauncher::new();
    let gateway = Gateway::build(
        &config,
        GatewayDeps {
            launcher: Arc::new(launcher.clone()),
            tts: Arc::new(NullTts),
        },
    )
    .unwrap();
    World {
        gateway,
        launcher,
        data_dir,
    }
}

pub fn envelope() -> Envelope {
    Envelope::for_connection(claudia_core::ConnectionId::new("spec-client"))
}

/// One complete scripted turn emitting `text`.
pub fn full_turn(text: &str) -> Vec<AgentEvent> {
    vec![
        AgentEvent::MessageStart {
            message_id: None,
            model: None,
        },
        AgentEvent::ContentBlockStart {
            index: 0,
            content_block: ContentBlock::Text {
                text: String::new(),
            },
        },
        AgentEvent::ContentBlockDelta {
            index: 0,
            delta: ContentDelta::Text {
                text: text.to_string(),
            },
        },
        AgentEvent::ContentBlockStop { index: 0 },
        AgentEvent::MessageStop {
            stop_reason: Some(StopReason::EndTurn),
        },
        AgentEvent::TurnStop {
            stop_reason: StopReason::EndTurn,
        },
    ]
}

/// Wait for a session's `sse.turn_stop` on the hub tap.
pub async fn wait_for_turn_stop(gateway: &Gateway<SystemClock>, session_id: &str) {
    let mut tap = gateway.hub.tap();
    loop {
        let event = tokio::time::timeout(std::time::Duration::from_secs(3), tap.recv())
            .await
            .expect("timed out waiting for turn_stop")
            .expect("tap closed");
        if event.event == "sse.turn_stop" && event.payload["session_id"] == *session_id {
            return;
        }
    }
}
