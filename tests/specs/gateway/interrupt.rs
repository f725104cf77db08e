//! Interrupt during a tool-use block closes the block and the message,
//! then ends the turn with an abort.

use crate::prelude::*;
use claudia_core::{AgentEvent, ContentBlock};
use serde_json::json;

#[tokio::test(flavor = "multi_thread")]
async fn interrupt_keeps_the_stream_well_bracketed() {
    let w = gateway_world();
    let dispatcher = &w.gateway.dispatcher;
    let created = dispatcher
        .dispatch(
            "workspace.create-session",
            json!({ "cwd": "/repo" }),
            &envelope(),
        )
        .await
        .unwrap();
    let session_id = created["session"]["id"].as_str().unwrap().to_string();

    // A turn that stalls inside a tool-use block.
    w.launcher.push_turn(vec![
        AgentEvent::MessageStart {
            message_id: None,
            model: None,
        },
        AgentEvent::ContentBlockStart {
            index: 0,
            content_block: ContentBlock::ToolUse {
                id: "t1".to_string(),
                name: "Bash".to_string(),
                input: json!({ "command": "sleep 9999" }),
            },
        },
    ]);

    let mut tap = w.gateway.hub.tap();
    dispatcher
        .dispatch(
            "session.prompt",
            json!({ "session_id": session_id, "content": "run it" }),
            &envelope(),
        )
        .await
        .unwrap();

    // Wait until the tool block is open.
    loop {
        let event = tokio::time::timeout(std::time::Duration::from_secs(3), tap.recv())
            .await
            .expect("timed out")
            .expect("tap closed");
        if event.event == "sse.content_block_start" {
            break;
        }
    }

    let result = dispatcher
        .dispatch(
            "session.interrupt",
            json!({ "session_id": session_id }),
            &envelope(),
        )
        .await
        .unwrap();
    assert_eq!(result["interrupted"], true);

    // The synthetic tail closes block, message, turn, in that order.
    let mut synthetic = Vec::new();
    loop {
        let event = tokio::time::timeout(std::time::Duration::from_secs(3), tap.recv())
            .await
            .expect("timed out")
            .expect("tap closed");
        if event.payload["synthetic"] == true {
            synthetic.push((event.event.clone(), event.payload.clone()));
            if event.event == "sse.turn_stop" {
                break;
            }
        }
    }
    let names: Vec<&str> = synthetic.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(
        names,
        ["sse.content_block_stop", "sse.message_stop", "sse.turn_stop"]
    );
    assert_eq!(synthetic[2].1["event"]["stop_reason"], "abort");
}
