//! Gateway event types
//!
//! Well-known event names carried in the `t` field of dispatch messages.
//! Handlers may subscribe to any name; these are the ones the client itself
//! inspects or that applications commonly want.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Known dispatch event names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayEventType {
    /// Answer to IDENTIFY; carries the session id and heartbeat interval
    Ready,
    /// Answer to RESUME, after any replayed events
    Resumed,

    GuildCreate,
    GuildUpdate,
    GuildDelete,
    /// Answer to op 8
    GuildMembersChunk,

    ChannelCreate,
    ChannelUpdate,
    ChannelDelete,

    MessageCreate,
    MessageUpdate,
    MessageDelete,

    PresenceUpdate,
    TypingStart,

    VoiceStateUpdate,
    /// Voice endpoint and token after joining a channel with op 4
    VoiceServerUpdate,

    UserUpdate,
}

impl GatewayEventType {
    pub const ALL: [Self; 17] = [
        Self::Ready,
        Self::Resumed,
        Self::GuildCreate,
        Self::GuildUpdate,
        Self::GuildDelete,
        Self::GuildMembersChunk,
        Self::ChannelCreate,
        Self::ChannelUpdate,
        Self::ChannelDelete,
        Self::MessageCreate,
        Self::MessageUpdate,
        Self::MessageDelete,
        Self::PresenceUpdate,
        Self::TypingStart,
        Self::VoiceStateUpdate,
        Self::VoiceServerUpdate,
        Self::UserUpdate,
    ];

    /// Name as it appears in `t`
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "READY",
            Self::Resumed => "RESUMED",
            Self::GuildCreate => "GUILD_CREATE",
            Self::GuildUpdate => "GUILD_UPDATE",
            Self::GuildDelete => "GUILD_DELETE",
            Self::GuildMembersChunk => "GUILD_MEMBERS_CHUNK",
            Self::ChannelCreate => "CHANNEL_CREATE",
            Self::ChannelUpdate => "CHANNEL_UPDATE",
            Self::ChannelDelete => "CHANNEL_DELETE",
            Self::MessageCreate => "MESSAGE_CREATE",
            Self::MessageUpdate => "MESSAGE_UPDATE",
            Self::MessageDelete => "MESSAGE_DELETE",
            Self::PresenceUpdate => "PRESENCE_UPDATE",
            Self::TypingStart => "TYPING_START",
            Self::VoiceStateUpdate => "VOICE_STATE_UPDATE",
            Self::VoiceServerUpdate => "VOICE_SERVER_UPDATE",
            Self::UserUpdate => "USER_UPDATE",
        }
    }

    /// Look up a `t` value; names are matched exactly
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.as_str() == name)
    }

    /// Events that open a session and carry the heartbeat interval
    #[must_use]
    pub const fn starts_session(self) -> bool {
        matches!(self, Self::Ready | Self::Resumed)
    }
}

impl fmt::Display for GatewayEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
