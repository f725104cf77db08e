// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::fake::FakeLauncher;
use claudia_core::{AgentEvent, ContentBlock, ContentDelta, FakeClock, StopReason};
use std::time::Duration;

struct World {
    manager: Arc<SessionManager<FakeClock>>,
    launcher: FakeLauncher,
    events: mpsc::Receiver<BusEvent>,
    clock: FakeClock,
}

fn world() -> World {
    let launcher = FakeLauncher::new();
    let clock = FakeClock::new(1_000_000);
    let (sink, events) = mpsc::channel(256);
    let store = Arc::new(claudia_store::Store::open_in_memory().unwrap());
    let manager = Arc::new(SessionManager::new(
        Arc::new(launcher.clone()),
        store,
        sink,
        None,
        ManagerConfig::default(),
        clock.clone(),
    ));
    World {
        manager,
        launcher,
        events,
        clock,
    }
}

async fn next_event(rx: &mut mpsc::Receiver<BusEvent>) -> BusEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

async fn next_named(rx: &mut mpsc::Receiver<BusEvent>, name: &str) -> BusEvent {
    loop {
        let event = next_event(rx).await;
        if event.event == name {
            return event;
        }
    }
}

fn full_turn() -> Vec<AgentEvent> {
    vec![
        AgentEvent::MessageStart {
            message_id: Some("m1".to_string()),
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
                text: "hello".to_string(),
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

#[tokio::test]
async fn child_spawns_lazily_and_streams_a_turn() {
    let mut w = world();
    let id = w
        .manager
        .create("/repo".to_string(), None, None, None, None);
    assert_eq!(w.launcher.launch_count(), 0, "child must be lazy");

    w.launcher.push_turn(full_turn());
    w.manager.prompt(&id, "hi".to_string(), None).await.unwrap();
    assert_eq!(w.launcher.launch_count(), 1);

    assert_eq!(next_event(&mut w.events).await.event, "session.process_started");
    let expected = [
        "sse.message_start",
        "sse.content_block_start",
        "sse.content_block_delta",
        "sse.content_block_stop",
        "sse.message_stop",
        "sse.turn_stop",
    ];
    for name in expected {
        let event = next_event(&mut w.events).await;
        assert_eq!(event.event, name);
        assert_eq!(event.payload["session_id"], id.as_str());
    }
}

#[tokio::test]
async fn one_child_serves_many_turns() {
    let mut w = world();
    let id = w
        .manager
        .create("/repo".to_string(), None, None, None, None);
    w.launcher.push_turn(full_turn());
    w.launcher.push_turn(full_turn());

    w.manager.prompt(&id, "one".to_string(), None).await.unwrap();
    next_named(&mut w.events, "sse.turn_stop").await;
    w.manager.prompt(&id, "two".to_string(), None).await.unwrap();
    next_named(&mut w.events, "sse.turn_stop").await;

    assert_eq!(w.launcher.launch_count(), 1);
}

#[tokio::test]
async fn prompt_unknown_session_without_cwd_is_missing_context() {
    let w = world();
    let err = w
        .manager
        .prompt(&SessionId::new("ghost"), "hi".to_string(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::MissingContext(_)), "got {err:?}");
    assert_eq!(w.launcher.launch_count(), 0);
}

#[tokio::test]
async fn prompt_unknown_session_with_cwd_auto_resumes() {
    let mut w = world();
    w.launcher.push_turn(full_turn());
    let id = SessionId::new("previously-known");
    w.manager
        .prompt(&id, "again".to_string(), Some("/repo".to_string()))
        .await
        .unwrap();

    let spec = w.launcher.launches.lock()[0].clone();
    assert!(spec.resume, "unknown session must resume, not create");
    assert_eq!(spec.cwd, "/repo");
    assert_eq!(spec.session_id, "previously-known");
    next_named(&mut w.events, "sse.turn_stop").await;
}

#[tokio::test]
async fn manager_defaults_flow_into_the_spec() {
    let launcher = FakeLauncher::new();
    let clock = FakeClock::new(0);
    let (sink, _events) = mpsc::channel(64);
    let store = Arc::new(claudia_store::Store::open_in_memory().unwrap());
    let manager = SessionManager::new(
        Arc::new(launcher.clone()),
        store,
        sink,
        None,
        ManagerConfig {
            default_model: Some("sonnet".to_string()),
            default_thinking: Some(true),
            default_effort: Some("high".to_string()),
            ..ManagerConfig::default()
        },
        clock,
    );

    launcher.push_turn(full_turn());
    let id = manager.create("/repo".to_string(), None, None, None, None);
    manager.prompt(&id, "hi".to_string(), None).await.unwrap();

    let spec = launcher.launches.lock()[0].clone();
    assert_eq!(spec.model.as_deref(), Some("sonnet"));
    assert_eq!(spec.thinking, Some(true));
    assert_eq!(spec.effort.as_deref(), Some("high"));
}

#[tokio::test]
async fn interrupt_mid_turn_emits_synthetic_stops_in_order() {
    let mut w = world();
    let id = w
        .manager
        .create("/repo".to_string(), None, None, None, None);
    // A turn that stalls with a tool block open.
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
                input: serde_json::json!({}),
            },
        },
    ]);
    w.manager.prompt(&id, "go".to_string(), None).await.unwrap();
    next_named(&mut w.events, "sse.content_block_start").await;

    assert!(w.manager.interrupt(&id).await);

    // Collect until the killed child winds down; it must end as an
    // expected stop, not a death, and the synthetic events must close the
    // stream innermost-first.
    let mut seen = Vec::new();
    loop {
        let event = next_event(&mut w.events).await;
        let name = event.event.clone();
        seen.push(event);
        if name == "session.process_ended" {
            break;
        }
        assert_ne!(name, "session.process_died");
    }
    let synthetic: Vec<&BusEvent> = seen
        .iter()
        .filter(|e| e.payload["synthetic"] == true)
        .collect();
    let names: Vec<&str> = synthetic.iter().map(|e| e.event.as_str()).collect();
    assert_eq!(
        names,
        ["sse.content_block_stop", "sse.message_stop", "sse.turn_stop"]
    );
    assert_eq!(
        synthetic[2].payload["event"]["stop_reason"],
        "abort"
    );
}

#[tokio::test]
async fn interrupt_unknown_session_is_false() {
    let w = world();
    assert!(!w.manager.interrupt(&SessionId::new("ghost")).await);
}

#[tokio::test]
async fn plan_mode_tool_gets_template_reply() {
    let mut w = world();
    let id = w
        .manager
        .create("/repo".to_string(), None, None, None, None);
    w.launcher.push_turn(vec![
        AgentEvent::MessageStart {
            message_id: None,
            model: None,
        },
        AgentEvent::ContentBlockStart {
            index: 0,
            content_block: ContentBlock::ToolUse {
                id: "t1".to_string(),
                name: "EnterPlanMode".to_string(),
                input: serde_json::json!({}),
            },
        },
        AgentEvent::ContentBlockStop { index: 0 },
        AgentEvent::MessageStop { stop_reason: None },
    ]);
    w.manager.prompt(&id, "plan".to_string(), None).await.unwrap();
    next_named(&mut w.events, "sse.message_stop").await;

    // The auto-reply lands on the child's input channel.
    let mut saw_reply = false;
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if w.launcher.recorded_inputs().iter().any(|input| {
            matches!(input, ChildInput::ToolResult { tool_use_id, .. } if tool_use_id == "t1")
        }) {
            saw_reply = true;
            break;
        }
    }
    assert!(saw_reply, "no auto-reply reached the child");
}

#[tokio::test]
async fn ask_user_question_is_forwarded_not_answered() {
    let mut w = world();
    let id = w
        .manager
        .create("/repo".to_string(), None, None, None, None);
    w.launcher.push_turn(vec![
        AgentEvent::MessageStart {
            message_id: None,
            model: None,
        },
        AgentEvent::ContentBlockStart {
            index: 0,
            content_block: ContentBlock::ToolUse {
                id: "t9".to_string(),
                name: "AskUserQuestion".to_string(),
                input: serde_json::json!({ "questions": [] }),
            },
        },
        AgentEvent::ContentBlockStop { index: 0 },
        AgentEvent::MessageStop { stop_reason: None },
    ]);
    w.manager.prompt(&id, "ask".to_string(), None).await.unwrap();

    let forwarded = next_named(&mut w.events, "session.request_tool_results").await;
    assert_eq!(forwarded.payload["tool_use_id"], "t9");
    assert_eq!(forwarded.payload["name"], "AskUserQuestion");

    // And no tool result was sent for it.
    assert!(!w.launcher.recorded_inputs().iter().any(|input| {
        matches!(input, ChildInput::ToolResult { tool_use_id, .. } if tool_use_id == "t9")
    }));
}

#[tokio::test]
async fn unexpected_child_death_brackets_and_reports() {
    let mut w = world();
    let id = w
        .manager
        .create("/repo".to_string(), None, None, None, None);
    w.launcher.push_dying_turn(vec![
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
    ]);
    w.manager.prompt(&id, "go".to_string(), None).await.unwrap();

    next_named(&mut w.events, "sse.content_block_start").await;
    // The child dies; the stream is closed synthetically and the death is
    // reported.
    assert_eq!(next_event(&mut w.events).await.event, "sse.content_block_stop");
    assert_eq!(next_event(&mut w.events).await.event, "sse.message_stop");
    let stop = next_event(&mut w.events).await;
    assert_eq!(stop.event, "sse.turn_stop");
    assert_eq!(stop.payload["event"]["stop_reason"], "abort");
    assert_eq!(next_event(&mut w.events).await.event, "session.process_died");

    // The session survives and can be prompted again (new child).
    w.launcher.push_turn(full_turn());
    w.manager.prompt(&id, "retry".to_string(), None).await.unwrap();
    next_named(&mut w.events, "sse.turn_stop").await;
    assert_eq!(w.launcher.launch_count(), 2);
}

#[tokio::test]
async fn close_removes_the_session_and_ops_return_false() {
    let mut w = world();
    let id = w
        .manager
        .create("/repo".to_string(), None, None, None, None);
    w.launcher.push_turn(full_turn());
    w.manager.prompt(&id, "hi".to_string(), None).await.unwrap();
    next_named(&mut w.events, "sse.turn_stop").await;

    assert!(w.manager.close(&id).await);
    next_named(&mut w.events, "session.process_ended").await;

    assert!(!w.manager.contains(&id));
    assert!(!w.manager.close(&id).await);
    assert!(!w.manager.interrupt(&id).await);
    assert!(!w.manager.set_permission_mode(&id, "plan".to_string()).await);
    assert!(
        !w.manager
            .send_tool_result(&id, "t1".to_string(), "ok".to_string(), false)
            .await
    );
}

#[tokio::test]
async fn closed_session_resumes_on_prompt_with_cwd() {
    let mut w = world();
    let id = w
        .manager
        .create("/repo".to_string(), None, None, None, None);
    w.launcher.push_turn(full_turn());
    w.manager.prompt(&id, "hi".to_string(), None).await.unwrap();
    next_named(&mut w.events, "sse.turn_stop").await;
    w.manager.close(&id).await;
    next_named(&mut w.events, "session.process_ended").await;

    w.launcher.push_turn(full_turn());
    w.manager
        .prompt(&id, "again".to_string(), Some("/repo".to_string()))
        .await
        .unwrap();
    next_named(&mut w.events, "sse.turn_stop").await;

    assert_eq!(w.launcher.launch_count(), 2);
    let spec = w.launcher.launches.lock()[1].clone();
    assert!(spec.resume);
}

#[tokio::test]
async fn permission_mode_is_forwarded_and_respected_at_launch() {
    let mut w = world();
    let id = w
        .manager
        .create("/repo".to_string(), None, None, None, None);
    assert!(w.manager.set_permission_mode(&id, "plan".to_string()).await);

    w.launcher.push_turn(full_turn());
    w.manager.prompt(&id, "hi".to_string(), None).await.unwrap();
    next_named(&mut w.events, "sse.turn_stop").await;

    let spec = w.launcher.launches.lock()[0].clone();
    assert_eq!(spec.permission_mode.as_deref(), Some("plan"));
}

#[tokio::test]
async fn list_reports_staleness_from_the_clock() {
    let mut w = world();
    let id = w
        .manager
        .create("/repo".to_string(), None, None, None, None);
    w.launcher.push_turn(full_turn());
    w.manager.prompt(&id, "hi".to_string(), None).await.unwrap();
    next_named(&mut w.events, "sse.turn_stop").await;

    let info = &w.manager.list()[0];
    assert_eq!(info.id, id);
    assert!(info.running);
    assert!(!info.stale);

    w.clock.advance_ms(DEFAULT_STALE_AFTER_MS + 1);
    let info = &w.manager.list()[0];
    assert!(info.stale, "no events within the window means stale");
    // Stale sessions are reported, never auto-closed.
    assert!(w.manager.contains(&id));
}

#[tokio::test]
async fn close_all_closes_everything() {
    let w = world();
    let a = w.manager.create("/a".to_string(), None, None, None, None);
    let b = w.manager.create("/b".to_string(), None, None, None, None);
    w.manager.close_all().await;
    assert!(!w.manager.contains(&a));
    assert!(!w.manager.contains(&b));
    assert!(w.manager.list().is_empty());
}
