//! WebSocket close codes
//!
//! Close codes the gateway peer may send, and the codes this client closes with.

use serde::{Deserialize, Serialize};

/// Close code used when the client closes but wants to RESUME afterwards.
///
/// Closing with 1000/1001 tells the peer the session is over.
pub const RESUMABLE_CLOSE: u16 = 4000;

/// Close code used for an explicit, final shutdown.
pub const NORMAL_CLOSE: u16 = 1000;

/// Close codes a gateway connection can end with
///
/// The 4000 range is gateway specific; the peer sends it to say why it
/// dropped this client. Anything else seen on the wire is kept as a raw u16.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum CloseCode {
    Normal = 1000,
    GoingAway = 1001,
    /// The peer hit an error it would not name
    UnknownError = 4000,
    /// We sent an op code the peer does not accept
    UnknownOpcode = 4001,
    /// We sent something the peer could not decode
    DecodeError = 4002,
    /// We sent a payload before IDENTIFY
    NotAuthenticated = 4003,
    /// The token in IDENTIFY was rejected
    AuthenticationFailed = 4004,
    /// We sent IDENTIFY twice
    AlreadyAuthenticated = 4005,
    /// RESUME named a sequence the peer no longer has
    InvalidSequence = 4007,
    /// We sent too fast
    RateLimited = 4008,
    /// The session expired; RESUME will not work
    SessionTimeout = 4009,
    InvalidShard = 4010,
    ShardingRequired = 4011,
    /// The `v=` query names a version the peer no longer serves
    InvalidApiVersion = 4012,
    InvalidIntents = 4013,
    DisallowedIntents = 4014,
}

impl CloseCode {
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        Some(match value {
            1000 => Self::Normal,
            1001 => Self::GoingAway,
            4000 => Self::UnknownError,
            4001 => Self::UnknownOpcode,
            4002 => Self::DecodeError,
            4003 => Self::NotAuthenticated,
            4004 => Self::AuthenticationFailed,
            4005 => Self::AlreadyAuthenticated,
            4007 => Self::InvalidSequence,
            4008 => Self::RateLimited,
            4009 => Self::SessionTimeout,
            4010 => Self::InvalidShard,
            4011 => Self::ShardingRequired,
            4012 => Self::InvalidApiVersion,
            4013 => Self::InvalidIntents,
            4014 => Self::DisallowedIntents,
            _ => return None,
        })
    }

    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Whether a new session attempt can succeed after this close
    ///
    /// False for codes where retrying with the same credential and
    /// configuration would only be rejected again.
    #[must_use]
    pub const fn should_reconnect(self) -> bool {
        !matches!(
            self,
            Self::AuthenticationFailed
                | Self::InvalidShard
                | Self::ShardingRequired
                | Self::InvalidApiVersion
                | Self::InvalidIntents
                | Self::DisallowedIntents
        )
    }

    /// Whether the peer discarded the session, so the next attempt must IDENTIFY
    #[must_use]
    pub const fn invalidates_session(self) -> bool {
        matches!(self, Self::InvalidSequence | Self::SessionTimeout)
    }

    /// Plain WebSocket closure rather than a gateway error
    #[must_use]
    pub const fn is_clean(self) -> bool {
        matches!(self, Self::Normal | Self::GoingAway)
    }

    /// Human readable reason, used when the peer sends an empty one
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Normal => "Closed normally",
            Self::GoingAway => "Peer is going away",
            Self::UnknownError => "Gateway error",
            Self::UnknownOpcode => "Gateway rejected an op code",
            Self::DecodeError => "Gateway could not decode a payload",
            Self::NotAuthenticated => "Sent a payload before identifying",
            Self::AuthenticationFailed => "Authentication failed",
            Self::AlreadyAuthenticated => "Identified twice",
            Self::InvalidSequence => "Resume sequence rejected",
            Self::RateLimited => "Sending too fast",
            Self::SessionTimeout => "Session timed out",
            Self::InvalidShard => "Shard rejected",
            Self::ShardingRequired => "Gateway requires sharding",
            Self::InvalidApiVersion => "Gateway version no longer served",
            Self::InvalidIntents => "Intents rejected",
            Self::DisallowedIntents => "Intents not allowed for this account",
        }
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.description())
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.as_u16()
    }
}
