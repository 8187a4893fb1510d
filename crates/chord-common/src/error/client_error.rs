//! Client error types
//!
//! The caller-visible failure taxonomy. Connection-fatal errors are retried
//! inside the gateway and never reach the caller; only client-fatal ones do.

use crate::config::ConfigError;

/// Client-wide error type
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Credential exchange or gateway resolution failed
    #[error("Bootstrap failed: {0}")]
    Bootstrap(String),

    /// Malformed envelope or oversized payload from the peer
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// The peer rejected IDENTIFY
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Network-level failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// The configured retry budget ran out
    #[error("Reconnect budget exhausted after {attempts} attempts")]
    ReconnectBudgetExhausted { attempts: u32 },

    /// The peer closed with a code that forbids reconnecting
    #[error("Gateway rejected the session ({code}): {reason}")]
    GatewayRejected { code: u16, reason: String },

    /// No live session to send on
    #[error("Not connected")]
    NotConnected,

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    // Internal errors
    #[error("Internal error")]
    Internal(#[source] anyhow::Error),
}

impl ClientError {
    /// Whether a new session attempt may succeed after this error
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ProtocolViolation(_) | Self::Transport(_))
    }

    /// Whether this error ends the client instance
    #[must_use]
    pub fn is_client_fatal(&self) -> bool {
        !self.is_retryable() && !matches!(self, Self::NotConnected)
    }

    /// Stable error code for logs
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Bootstrap(_) => "BOOTSTRAP_ERROR",
            Self::ProtocolViolation(_) => "PROTOCOL_VIOLATION",
            Self::AuthenticationFailed(_) => "AUTHENTICATION_FAILED",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::ReconnectBudgetExhausted { .. } => "RECONNECT_BUDGET_EXHAUSTED",
            Self::GatewayRejected { .. } => "GATEWAY_REJECTED",
            Self::NotConnected => "NOT_CONNECTED",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Create an internal error from any error
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }
}

/// Result type alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;
