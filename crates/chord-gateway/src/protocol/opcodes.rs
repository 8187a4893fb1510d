//! Gateway operation codes
//!
//! The `op` field of every envelope. Some ops only travel one way.

use serde::{Deserialize, Serialize};

/// Gateway operation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum OpCode {
    /// Named event from the gateway, with a sequence number
    Dispatch = 0,
    /// Liveness ping carrying the last sequence; the gateway may also request one
    Heartbeat = 1,
    /// Opens a new session
    Identify = 2,
    PresenceUpdate = 3,
    /// Join, move between or leave voice channels
    VoiceStateUpdate = 4,
    VoicePing = 5,
    /// Reattach to an earlier session and replay what was missed
    Resume = 6,
    /// The gateway wants this client to reconnect and resume
    Reconnect = 7,
    /// Ask for the members of a large guild
    RequestMembers = 8,
    /// The session is gone; identify again
    InvalidateSession = 9,
}

impl OpCode {
    /// Every op code, in wire order
    pub const ALL: [Self; 10] = [
        Self::Dispatch,
        Self::Heartbeat,
        Self::Identify,
        Self::PresenceUpdate,
        Self::VoiceStateUpdate,
        Self::VoicePing,
        Self::Resume,
        Self::Reconnect,
        Self::RequestMembers,
        Self::InvalidateSession,
    ];

    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(usize::from(value)).copied()
    }

    /// Op code for the raw `op` field of an envelope
    #[must_use]
    pub fn from_raw(value: u64) -> Option<Self> {
        u8::try_from(value).ok().and_then(Self::from_u8)
    }

    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Ops this client may write
    #[must_use]
    pub const fn is_client_op(self) -> bool {
        matches!(
            self,
            Self::Heartbeat
                | Self::Identify
                | Self::PresenceUpdate
                | Self::VoiceStateUpdate
                | Self::VoicePing
                | Self::Resume
                | Self::RequestMembers
        )
    }

    /// Ops the gateway may write
    #[must_use]
    pub const fn is_server_op(self) -> bool {
        matches!(
            self,
            Self::Dispatch | Self::Heartbeat | Self::Reconnect | Self::InvalidateSession
        )
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Dispatch => "Dispatch",
            Self::Heartbeat => "Heartbeat",
            Self::Identify => "Identify",
            Self::PresenceUpdate => "PresenceUpdate",
            Self::VoiceStateUpdate => "VoiceStateUpdate",
            Self::VoicePing => "VoicePing",
            Self::Resume => "Resume",
            Self::Reconnect => "Reconnect",
            Self::RequestMembers => "RequestMembers",
            Self::InvalidateSession => "InvalidateSession",
        }
    }
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> Self {
        op.as_u8()
    }
}

impl TryFrom<u8> for OpCode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_u8(value).ok_or_else(|| format!("unknown op code {value}"))
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_u8())
    }
}
