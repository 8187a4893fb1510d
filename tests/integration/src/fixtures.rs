//! Test fixtures and data generators
//!
//! Provides reusable gateway payloads for integration tests.

use serde_json::{json, Value};

/// Token the test client identifies with
pub const TEST_TOKEN: &str = "test-token-0123456789";

/// Heartbeat interval the gateway announced in its documentation examples
pub const HEARTBEAT_INTERVAL_MS: u64 = 41_250;

/// READY payload
pub fn ready_payload(session_id: &str, interval_ms: u64) -> Value {
    json!({
        "v": 4,
        "session_id": session_id,
        "heartbeat_interval": interval_ms,
        "user": {
            "id": "80351110224678912",
            "username": "Nelly",
            "discriminator": "1337"
        },
        "guilds": [],
        "private_channels": []
    })
}

/// RESUMED payload
pub fn resumed_payload(interval_ms: u64) -> Value {
    json!({ "heartbeat_interval": interval_ms })
}

/// MESSAGE_CREATE payload
pub fn message_payload(content: &str) -> Value {
    json!({
        "id": "334385199974967042",
        "channel_id": "290926798999357250",
        "content": content,
        "author": {
            "id": "53908099506183680",
            "username": "Mason"
        }
    })
}

/// Dispatch payload whose JSON is larger than `bytes`
pub fn oversized_payload(bytes: usize) -> Value {
    json!({ "content": "x".repeat(bytes) })
}

/// GET /gateway response body
pub fn gateway_body(url: &str) -> Value {
    json!({ "url": url })
}
