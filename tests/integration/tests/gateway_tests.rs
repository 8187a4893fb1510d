//! Gateway session integration tests
//!
//! Each test plays the gateway side of one or more connections through the
//! in-memory transport and checks what the client writes back.
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use std::f64::consts::E;
use std::time::Duration;

use chord_common::{ClientConfig, ClientError};
use chord_gateway::connection::{deflate, Frame};
use chord_gateway::protocol::{Envelope, OpCode, NORMAL_CLOSE, RESUMABLE_CLOSE};
use chord_gateway::supervisor::JITTER_FRACTION;
use chord_gateway::{ClientEvent, CloseReason, SessionPhase};
use integration_tests::*;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::Instant;

// ============================================================================
// Handshake and heartbeat
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_identify_payload() {
    let mut gateway = TestGateway::new();
    let mut handle = gateway.start().unwrap();
    let mut peer = gateway.accept().await.unwrap();

    let identify = expect_op(&mut peer, OpCode::Identify).await.unwrap();
    let d = &identify.d;
    assert_eq!(d["token"], TEST_TOKEN);
    assert_eq!(d["compress"], true);
    assert_eq!(d["large_threshold"], 250);
    assert_eq!(d["v"], 3);
    assert_eq!(d["properties"]["$os"], std::env::consts::OS);
    assert_eq!(d["properties"]["$browser"], "chord");
    assert_eq!(d["properties"]["$device"], "chord");
    assert_eq!(d["properties"]["$referrer"], "");
    assert_eq!(d["properties"]["$referring_domain"], "");
    wait_for_phase(&handle, SessionPhase::Identifying).await.unwrap();

    handle.stop();
    handle.wait().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_ready_starts_heartbeats() {
    let mut gateway = TestGateway::new();
    let mut handle = gateway.start().unwrap();
    let mut peer = gateway
        .accept_ready(&handle, "abc", HEARTBEAT_INTERVAL_MS)
        .await
        .unwrap();
    let ready_at = Instant::now();

    send_dispatch(&peer, "MESSAGE_CREATE", 5, message_payload("hello"));

    let heartbeat = expect_op(&mut peer, OpCode::Heartbeat).await.unwrap();
    assert_eq!(heartbeat.d, json!(5));
    assert_eq!(ready_at.elapsed(), Duration::from_millis(HEARTBEAT_INTERVAL_MS));

    // The peer stays active, so heartbeats keep coming at the same interval
    peer.send_envelope(&Envelope::new(OpCode::Heartbeat, Value::Null));
    let requested = expect_op(&mut peer, OpCode::Heartbeat).await.unwrap();
    assert_eq!(requested.d, json!(5));

    let second = expect_op(&mut peer, OpCode::Heartbeat).await.unwrap();
    assert_eq!(second.d, json!(5));
    assert_eq!(ready_at.elapsed(), Duration::from_millis(2 * HEARTBEAT_INTERVAL_MS));

    handle.stop();
    handle.wait().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_server_heartbeat_request_is_answered_immediately() {
    let mut gateway = TestGateway::new();
    let mut handle = gateway.start().unwrap();
    let mut peer = gateway
        .accept_ready(&handle, "abc", HEARTBEAT_INTERVAL_MS)
        .await
        .unwrap();
    let start = Instant::now();

    peer.send_envelope(&Envelope::new(OpCode::Heartbeat, Value::Null));
    let heartbeat = expect_op(&mut peer, OpCode::Heartbeat).await.unwrap();

    assert_eq!(heartbeat.d, json!(1));
    assert!(start.elapsed() < Duration::from_millis(HEARTBEAT_INTERVAL_MS));

    handle.stop();
    handle.wait().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_silent_peer_forces_resume() {
    let mut gateway = TestGateway::new();
    let mut handle = gateway.start().unwrap();
    let mut events = handle.events();
    let mut peer = gateway.accept_ready(&handle, "abc", 1_000).await.unwrap();
    let ready_at = Instant::now();

    // Two heartbeats go out unanswered, the third tick finds the peer silent
    expect_op(&mut peer, OpCode::Heartbeat).await.unwrap();
    expect_op(&mut peer, OpCode::Heartbeat).await.unwrap();
    let close = peer.recv_close().await.unwrap();
    assert_eq!(close.code, RESUMABLE_CLOSE);
    assert_eq!(ready_at.elapsed(), Duration::from_secs(3));

    let event = next_event(&mut events, |e| matches!(e, ClientEvent::Disconnected { .. }))
        .await
        .unwrap();
    assert_eq!(
        event,
        ClientEvent::Disconnected {
            reason: CloseReason::HeartbeatTimeout
        }
    );

    let mut peer = gateway.accept().await.unwrap();
    let resume = expect_op(&mut peer, OpCode::Resume).await.unwrap();
    assert_eq!(resume.d["session_id"], "abc");
    assert_eq!(resume.d["seq"], 1);

    handle.stop();
    handle.wait().await.unwrap();
}

// ============================================================================
// Session continuity
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_invalidate_session_reidentifies_on_same_connection() {
    let mut gateway = TestGateway::new();
    let mut handle = gateway.start().unwrap();
    let mut peer = gateway
        .accept_ready(&handle, "abc", HEARTBEAT_INTERVAL_MS)
        .await
        .unwrap();

    peer.send_envelope(&Envelope::invalidate_session());
    let identify = expect_op(&mut peer, OpCode::Identify).await.unwrap();

    assert_eq!(identify.d["token"], TEST_TOKEN);
    wait_for_phase(&handle, SessionPhase::Identifying).await.unwrap();
    assert!(handle.is_connected());
    assert_eq!(gateway.connector.connect_count(), 1);

    send_ready(&peer, 1, "def", HEARTBEAT_INTERVAL_MS);
    wait_for_phase(&handle, SessionPhase::Steady).await.unwrap();

    handle.stop();
    handle.wait().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_request_resumes() {
    let mut gateway = TestGateway::new();
    let mut handle = gateway.start().unwrap();
    let mut events = handle.events();
    let mut peer = gateway
        .accept_ready(&handle, "abc", HEARTBEAT_INTERVAL_MS)
        .await
        .unwrap();

    send_dispatch(&peer, "MESSAGE_CREATE", 7, message_payload("before"));
    peer.send_envelope(&Envelope::reconnect());

    let close = peer.recv_close().await.unwrap();
    assert_eq!(close.code, RESUMABLE_CLOSE);

    let mut peer = gateway.accept().await.unwrap();
    let resume = expect_op(&mut peer, OpCode::Resume).await.unwrap();
    assert_eq!(resume.d["token"], TEST_TOKEN);
    assert_eq!(resume.d["session_id"], "abc");
    assert_eq!(resume.d["seq"], 7);

    send_resumed(&peer, 8, HEARTBEAT_INTERVAL_MS);
    let connected = next_event(&mut events, |e| matches!(e, ClientEvent::Connected { resumed: true }))
        .await
        .unwrap();
    assert_eq!(connected, ClientEvent::Connected { resumed: true });
    wait_for_phase(&handle, SessionPhase::Steady).await.unwrap();

    handle.stop();
    handle.wait().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_session_timeout_close_reidentifies() {
    let mut gateway = TestGateway::new();
    let mut handle = gateway.start().unwrap();
    let mut peer = gateway
        .accept_ready(&handle, "abc", HEARTBEAT_INTERVAL_MS)
        .await
        .unwrap();

    peer.close(4009, "Session timed out");

    let mut peer = gateway.accept().await.unwrap();
    expect_op(&mut peer, OpCode::Identify).await.unwrap();

    handle.stop();
    handle.wait().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_replayed_events_reach_handlers() {
    let mut gateway = TestGateway::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    gateway.client.on("MESSAGE_CREATE", move |event| {
        let tx = tx.clone();
        async move {
            let _ = tx.send((event.sequence, event.payload["content"].clone()));
        }
    });

    let mut handle = gateway.start().unwrap();
    let mut peer = gateway
        .accept_ready(&handle, "abc", HEARTBEAT_INTERVAL_MS)
        .await
        .unwrap();
    send_dispatch(&peer, "MESSAGE_CREATE", 2, message_payload("live"));
    assert_eq!(rx.recv().await.unwrap(), (Some(2), json!("live")));

    peer.drop_connection();
    let mut peer = gateway.accept().await.unwrap();
    expect_op(&mut peer, OpCode::Resume).await.unwrap();

    // Missed events arrive before RESUMED
    send_dispatch(&peer, "MESSAGE_CREATE", 3, message_payload("missed"));
    send_resumed(&peer, 4, HEARTBEAT_INTERVAL_MS);
    assert_eq!(rx.recv().await.unwrap(), (Some(3), json!("missed")));
    wait_for_phase(&handle, SessionPhase::Steady).await.unwrap();

    handle.stop();
    handle.wait().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_unhandled_events_are_reported() {
    let mut gateway = TestGateway::new();
    let mut handle = gateway.start().unwrap();
    let mut events = handle.events();
    let peer = gateway
        .accept_ready(&handle, "abc", HEARTBEAT_INTERVAL_MS)
        .await
        .unwrap();

    send_dispatch(&peer, "TYPING_START", 2, json!({ "user_id": "1" }));
    let event = next_event(&mut events, |e| matches!(e, ClientEvent::UnhandledEvent { .. }))
        .await
        .unwrap();

    // READY has no handler either
    assert_eq!(
        event,
        ClientEvent::UnhandledEvent {
            name: "READY".to_string()
        }
    );
    let event = next_event(&mut events, |e| matches!(e, ClientEvent::UnhandledEvent { .. }))
        .await
        .unwrap();
    assert_eq!(
        event,
        ClientEvent::UnhandledEvent {
            name: "TYPING_START".to_string()
        }
    );
    assert!(handle.is_connected());

    handle.stop();
    handle.wait().await.unwrap();
}

// ============================================================================
// Failures and reconnect supervision
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_authentication_rejection_is_final() {
    let mut gateway = TestGateway::new();
    let mut handle = gateway.start().unwrap();
    let mut peer = gateway.accept().await.unwrap();

    expect_op(&mut peer, OpCode::Identify).await.unwrap();
    peer.close(4004, "Authentication failed.");

    let result = handle.wait().await;
    assert!(matches!(result, Err(ClientError::AuthenticationFailed(_))));
    assert_eq!(gateway.connector.connect_count(), 1);
    assert!(gateway.acceptor.try_accept().is_none());
    assert_eq!(handle.status(), SessionPhase::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_rejecting_close_code_is_final() {
    let mut gateway = TestGateway::new();
    let mut handle = gateway.start().unwrap();
    let mut peer = gateway.accept().await.unwrap();

    expect_op(&mut peer, OpCode::Identify).await.unwrap();
    peer.close(4012, "Invalid API version");

    let result = handle.wait().await;
    assert!(matches!(
        result,
        Err(ClientError::GatewayRejected { code: 4012, .. })
    ));
    assert_eq!(gateway.connector.connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_oversized_payload_is_a_protocol_violation() {
    let mut gateway = TestGateway::new();
    let mut handle = gateway.start().unwrap();
    let mut events = handle.events();
    let mut peer = gateway
        .accept_ready(&handle, "abc", HEARTBEAT_INTERVAL_MS)
        .await
        .unwrap();

    let oversized = Envelope::dispatch("MESSAGE_CREATE", 2, oversized_payload(11 * 1024 * 1024));
    let json = oversized.to_json().unwrap();
    peer.send(Frame::Binary(deflate(json.as_bytes())));

    let close = peer.recv_close().await.unwrap();
    assert_eq!(close.code, RESUMABLE_CLOSE);

    let event = next_event(&mut events, |e| matches!(e, ClientEvent::Disconnected { .. }))
        .await
        .unwrap();
    assert!(matches!(
        event,
        ClientEvent::Disconnected {
            reason: CloseReason::ProtocolViolation(_)
        }
    ));
    next_event(&mut events, |e| matches!(e, ClientEvent::RetryScheduled { .. }))
        .await
        .unwrap();

    // The oversized dispatch never advanced the sequence
    let mut peer = gateway.accept().await.unwrap();
    let resume = expect_op(&mut peer, OpCode::Resume).await.unwrap();
    assert_eq!(resume.d["seq"], 1);

    handle.stop();
    handle.wait().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_compressed_frames_are_decoded() {
    let mut gateway = TestGateway::new();
    let mut handle = gateway.start().unwrap();
    let mut peer = gateway.accept().await.unwrap();

    expect_op(&mut peer, OpCode::Identify).await.unwrap();
    peer.send_compressed(&Envelope::dispatch(
        "READY",
        1,
        ready_payload("zlib", HEARTBEAT_INTERVAL_MS),
    ));
    wait_for_phase(&handle, SessionPhase::Steady).await.unwrap();

    handle.stop();
    handle.wait().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_backoff_grows_between_consecutive_failures() {
    let mut gateway = TestGateway::new();
    let mut handle = gateway.start().unwrap();
    let mut events = handle.events();
    let mut peer = gateway
        .accept_ready(&handle, "abc", HEARTBEAT_INTERVAL_MS)
        .await
        .unwrap();

    // Drop without a close code, then refuse the first retry
    gateway.connector.refuse_connections(1);
    peer.drop_connection();

    let first = next_event(&mut events, |e| matches!(e, ClientEvent::RetryScheduled { .. }))
        .await
        .unwrap();
    let second = next_event(&mut events, |e| matches!(e, ClientEvent::RetryScheduled { .. }))
        .await
        .unwrap();

    let (ClientEvent::RetryScheduled { delay: first, .. }, ClientEvent::RetryScheduled { delay: second, .. }) =
        (first, second)
    else {
        unreachable!()
    };
    let first = first.as_secs_f64();
    let second = second.as_secs_f64();
    assert!((first - 1.0).abs() < 6.0 * JITTER_FRACTION, "first delay {first}");
    assert!((second - E).abs() < 6.0 * E * JITTER_FRACTION, "second delay {second}");

    // Third attempt gets through and resumes
    let mut peer = gateway.accept().await.unwrap();
    expect_op(&mut peer, OpCode::Resume).await.unwrap();
    assert_eq!(gateway.connector.connect_count(), 3);

    handle.stop();
    handle.wait().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_retry_budget_exhausted() {
    let mut config = ClientConfig::default();
    config.backoff.retry_budget = Some(2);
    let gateway = TestGateway::with_config(config);
    gateway.connector.refuse_connections(usize::MAX);

    let mut handle = gateway.start().unwrap();
    let result = handle.wait().await;

    assert!(matches!(
        result,
        Err(ClientError::ReconnectBudgetExhausted { attempts: 2 })
    ));
    assert_eq!(gateway.connector.connect_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_pending_retry() {
    let gateway = TestGateway::new();
    gateway.connector.refuse_connections(usize::MAX);

    let mut handle = gateway.start().unwrap();
    let mut events = handle.events();
    next_event(&mut events, |e| matches!(e, ClientEvent::RetryScheduled { .. }))
        .await
        .unwrap();

    handle.stop();
    handle.wait().await.unwrap();
    assert_eq!(gateway.connector.connect_count(), 1);
    assert!(handle.is_finished());
}

#[tokio::test(start_paused = true)]
async fn test_stop_closes_normally() {
    let mut gateway = TestGateway::new();
    let mut handle = gateway.start().unwrap();
    let mut peer = gateway
        .accept_ready(&handle, "abc", HEARTBEAT_INTERVAL_MS)
        .await
        .unwrap();

    handle.stop();
    let close = peer.recv_close().await.unwrap();
    assert_eq!(close.code, NORMAL_CLOSE);

    handle.wait().await.unwrap();
    assert_eq!(handle.status(), SessionPhase::Disconnected);
    assert!(!handle.is_connected());
    assert!(gateway.acceptor.try_accept().is_none());
}

// ============================================================================
// Stalled socket writes
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_stop_with_stalled_socket() {
    let mut gateway = TestGateway::new();
    gateway.connector.stall_writes(true);
    let mut handle = gateway.start().unwrap();
    let peer = gateway.accept().await.unwrap();

    send_ready(&peer, 1, "abc", HEARTBEAT_INTERVAL_MS);
    wait_for_phase(&handle, SessionPhase::Steady).await.unwrap();

    handle.stop();
    tokio::time::timeout(WAIT_TIMEOUT, handle.wait())
        .await
        .expect("client hung after stop")
        .unwrap();
    assert_eq!(handle.status(), SessionPhase::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_socket_reconnects_and_resumes() {
    let mut gateway = TestGateway::new();
    gateway.connector.stall_writes(true);
    let mut handle = gateway.start().unwrap();
    let mut events = handle.events();
    let peer = gateway.accept().await.unwrap();
    gateway.connector.stall_writes(false);

    send_ready(&peer, 1, "abc", HEARTBEAT_INTERVAL_MS);
    for _ in 0..200 {
        peer.send_envelope(&Envelope::new(OpCode::Heartbeat, Value::Null));
    }

    let event = next_event(&mut events, |e| matches!(e, ClientEvent::Disconnected { .. }))
        .await
        .unwrap();
    assert!(matches!(
        event,
        ClientEvent::Disconnected {
            reason: CloseReason::Transport(_)
        }
    ));

    let mut peer = gateway.accept().await.unwrap();
    let resume = expect_op(&mut peer, OpCode::Resume).await.unwrap();
    assert_eq!(resume.d["session_id"], "abc");
    assert_eq!(resume.d["seq"], 1);

    handle.stop();
    handle.wait().await.unwrap();
}
