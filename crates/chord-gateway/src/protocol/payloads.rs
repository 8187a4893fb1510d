//! Gateway payload definitions
//!
//! Payloads the client sends, and the session payloads it reads back.

use serde::{Deserialize, Serialize};

/// Payload for op 2 (Identify)
///
/// Sent by the client to authenticate the session.
#[derive(Clone, Serialize, Deserialize)]
pub struct IdentifyPayload {
    /// Authentication token
    pub token: String,

    /// Client connection properties
    pub properties: IdentifyProperties,

    /// Ask the peer for zlib-compressed binary frames
    pub compress: bool,

    /// Member count above which guilds are sent without offline members
    pub large_threshold: u32,

    /// Identify payload version
    pub v: u8,
}

impl std::fmt::Debug for IdentifyPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentifyPayload")
            .field("token", &"[redacted]")
            .field("properties", &self.properties)
            .field("compress", &self.compress)
            .field("large_threshold", &self.large_threshold)
            .field("v", &self.v)
            .finish()
    }
}

/// Client connection properties
///
/// The peer expects the `$`-prefixed key names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyProperties {
    /// Operating system
    #[serde(rename = "$os")]
    pub os: String,

    /// Browser or client name
    #[serde(rename = "$browser")]
    pub browser: String,

    /// Device type
    #[serde(rename = "$device")]
    pub device: String,

    #[serde(rename = "$referrer")]
    pub referrer: String,

    #[serde(rename = "$referring_domain")]
    pub referring_domain: String,
}

impl IdentifyProperties {
    /// Properties for this platform, reporting `client_name` as browser and device
    #[must_use]
    pub fn for_client(client_name: &str) -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: client_name.to_string(),
            device: client_name.to_string(),
            referrer: String::new(),
            referring_domain: String::new(),
        }
    }
}

/// Payload for op 6 (Resume)
///
/// Sent by the client to resume a disconnected session.
#[derive(Clone, Serialize, Deserialize)]
pub struct ResumePayload {
    /// Authentication token
    pub token: String,

    /// Session ID to resume
    pub session_id: String,

    /// Last received sequence number
    pub seq: u64,
}

impl std::fmt::Debug for ResumePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResumePayload")
            .field("token", &"[redacted]")
            .field("session_id", &self.session_id)
            .field("seq", &self.seq)
            .finish()
    }
}

/// Payload for op 3 (Presence Update)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceUpdatePayload {
    /// Unix time in milliseconds since the client went idle, or `None` when active
    pub idle_since: Option<u64>,

    /// Game being played
    pub game: Option<Game>,
}

impl PresenceUpdatePayload {
    /// Active, playing `name`
    #[must_use]
    pub fn playing(name: impl Into<String>) -> Self {
        Self {
            idle_since: None,
            game: Some(Game { name: name.into() }),
        }
    }

    /// Idle since `since_ms`
    #[must_use]
    pub fn idle(since_ms: u64) -> Self {
        Self {
            idle_since: Some(since_ms),
            game: None,
        }
    }
}

/// Game shown in a presence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub name: String,
}

/// Payload for op 4 (Voice State Update)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceStateUpdatePayload {
    pub guild_id: String,

    /// Channel to join, or `None` to leave voice
    pub channel_id: Option<String>,

    pub self_mute: bool,

    pub self_deaf: bool,
}

/// Payload for op 8 (Request Guild Members)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMembersPayload {
    pub guild_id: String,

    /// Username prefix, empty for all members
    pub query: String,

    /// Maximum members to return, 0 for no limit
    pub limit: u32,
}

impl RequestMembersPayload {
    /// Request every member of a guild
    #[must_use]
    pub fn all(guild_id: impl Into<String>) -> Self {
        Self {
            guild_id: guild_id.into(),
            query: String::new(),
            limit: 0,
        }
    }
}

/// `d` of the READY dispatch
///
/// Only the fields the session needs; handlers see the full payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadyPayload {
    pub session_id: String,

    /// Heartbeat interval in milliseconds
    #[serde(alias = "heartbeat_interval_ms")]
    pub heartbeat_interval: u64,

    /// Gateway protocol version
    #[serde(default)]
    pub v: Option<u8>,
}

/// `d` of the RESUMED dispatch
#[derive(Debug, Clone, Deserialize)]
pub struct ResumedPayload {
    /// Heartbeat interval in milliseconds
    #[serde(alias = "heartbeat_interval_ms")]
    pub heartbeat_interval: u64,
}
