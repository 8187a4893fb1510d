//! Session termination reasons

use crate::protocol::CloseCode;
use chord_common::ClientError;

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CloseReason {
    /// The peer closed with 1000/1001
    #[error("Peer closed the connection ({code})")]
    Clean { code: u16 },

    /// Local stop request
    #[error("Stopped")]
    Stopped,

    /// The peer sent RECONNECT
    #[error("Reconnect requested by peer")]
    ReconnectRequested,

    /// Undecodable or oversized frame from the peer
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Nothing arrived from the peer for too long
    #[error("Heartbeat timed out")]
    HeartbeatTimeout,

    /// The peer closed with 4004
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The peer closed with a code that forbids reconnecting
    #[error("Gateway rejected the session ({code}): {reason}")]
    Rejected { code: u16, reason: String },

    /// The peer closed with any other code
    #[error("Peer closed the connection ({code}): {reason}")]
    PeerClosed { code: u16, reason: String },

    /// Network failure, or the stream ended without a close frame
    #[error("Transport error: {0}")]
    Transport(String),

    /// A handshake payload could not be serialized
    #[error("Failed to encode payload: {0}")]
    Encode(String),
}

impl CloseReason {
    /// Classify a close initiated by the peer
    #[must_use]
    pub fn from_peer_close(code: Option<u16>, reason: &str) -> Self {
        let Some(raw) = code else {
            return Self::Transport("connection closed without a close code".to_string());
        };
        let reason = if reason.is_empty() {
            CloseCode::from_u16(raw).map_or("", CloseCode::description).to_string()
        } else {
            reason.to_string()
        };

        match CloseCode::from_u16(raw) {
            Some(code) if code.is_clean() => Self::Clean { code: raw },
            Some(CloseCode::AuthenticationFailed) => Self::AuthenticationFailed(reason),
            Some(code) if !code.should_reconnect() => Self::Rejected { code: raw, reason },
            _ => Self::PeerClosed { code: raw, reason },
        }
    }

    /// Whether the supervisor should schedule another attempt
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Stopped | Self::AuthenticationFailed(_) | Self::Rejected { .. } | Self::Encode(_)
        )
    }

    /// Whether the next attempt may RESUME the same session
    #[must_use]
    pub fn preserves_session(&self) -> bool {
        match self {
            Self::PeerClosed { code, .. } => {
                !CloseCode::from_u16(*code).is_some_and(CloseCode::invalidates_session)
            }
            _ => true,
        }
    }

    /// The error surfaced to the caller when this reason ends the client
    #[must_use]
    pub fn terminal_error(&self) -> Option<ClientError> {
        match self {
            Self::AuthenticationFailed(reason) => Some(ClientError::AuthenticationFailed(reason.clone())),
            Self::Rejected { code, reason } => Some(ClientError::GatewayRejected {
                code: *code,
                reason: reason.clone(),
            }),
            Self::Encode(detail) => Some(ClientError::internal(anyhow::anyhow!("failed to encode payload: {detail}"))),
            _ => None,
        }
    }
}

impl From<CloseReason> for ClientError {
    fn from(reason: CloseReason) -> Self {
        match reason {
            CloseReason::ProtocolViolation(detail) => Self::ProtocolViolation(detail),
            CloseReason::AuthenticationFailed(detail) => Self::AuthenticationFailed(detail),
            CloseReason::Rejected { code, reason } => Self::GatewayRejected { code, reason },
            CloseReason::Encode(detail) => Self::internal(anyhow::anyhow!("failed to encode payload: {detail}")),
            other => Self::Transport(other.to_string()),
        }
    }
}
