//! Lazy resume: prompt a closed session with a cwd and it comes back;
//! without one it fails with `missing_context`.

use crate::prelude::*;
use claudia_core::ErrorKind;
use serde_json::json;

#[tokio::test(flavor = "multi_thread")]
async fn closed_sessions_resume_and_unknown_ones_need_cwd() {
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

    // First turn.
    w.launcher.push_turn(full_turn("hello"));
    dispatcher
        .dispatch(
            "session.prompt",
            json!({ "session_id": session_id, "content": "hi" }),
            &envelope(),
        )
        .await
        .unwrap();
    wait_for_turn_stop(&w.gateway, &session_id).await;

    // Close and prompt again with cwd: auto-resume, second turn.
    dispatcher
        .dispatch("session.close", json!({ "session_id": session_id }), &envelope())
        .await
        .unwrap();
    w.launcher.push_turn(full_turn("back again"));
    dispatcher
        .dispatch(
            "session.prompt",
            json!({ "session_id": session_id, "content": "again", "cwd": "/repo" }),
            &envelope(),
        )
        .await
        .unwrap();
    wait_for_turn_stop(&w.gateway, &session_id).await;

    assert_eq!(w.launcher.launch_count(), 2);
    assert!(
        w.launcher.launches.lock()[1].resume,
        "second child must resume the external session"
    );

    // Unknown id without cwd: missing_context, no child spawned.
    let err = dispatcher
        .dispatch(
            "session.prompt",
            json!({ "session_id": "genuinely-unknown", "content": "again" }),
            &envelope(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::MissingContext);
    assert_eq!(w.launcher.launch_count(), 2);
}
