//! Nested-call depth: two parties bouncing a call back and forth exhaust
//! the depth bound on the ninth hop, and the error surfaces to the
//! original caller.

use crate::prelude::*;
use claudia_core::{Envelope, ErrorKind, RpcError, MAX_CALL_DEPTH};
use serde_json::json;

/// `a.ping` and `b.pong` invoke each other through the dispatcher's call
/// path; every hop derives a child envelope exactly like an extension
/// host relaying a `call` message.
fn ping<'a>(
    w: &'a crate::prelude::World,
    envelope: Envelope,
    hops: &'a mut u32,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<serde_json::Value, RpcError>> + 'a>>
{
    Box::pin(async move {
        let child = envelope.child();
        child.check_depth()?;
        *hops += 1;
        // The "extension work" each hop does before recursing.
        w.gateway
            .dispatcher
            .dispatch("workspace.list", json!({}), &child)
            .await?;
        pong(w, child, hops).await
    })
}

fn pong<'a>(
    w: &'a crate::prelude::World,
    envelope: Envelope,
    hops: &'a mut u32,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<serde_json::Value, RpcError>> + 'a>>
{
    Box::pin(async move {
        let child = envelope.child();
        child.check_depth()?;
        *hops += 1;
        w.gateway
            .dispatcher
            .dispatch("workspace.list", json!({}), &child)
            .await?;
        ping(w, child, hops).await
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn ninth_nested_call_cycles_and_surfaces_to_the_caller() {
    let w = gateway_world();

    let mut hops = 0u32;
    let err = ping(&w, envelope(), &mut hops)
        .await
        .expect_err("the cycle must be broken");
    assert_eq!(err.kind, ErrorKind::CallCycle);
    assert!(err.message.contains("cycle"), "message: {}", err.message);
    // Depth 1..=8 run; the ninth hop is refused.
    assert_eq!(hops, u32::from(MAX_CALL_DEPTH));
}
