//! Client lifecycle events
//!
//! Broadcast to anyone holding a receiver from `GatewayHandle::events`.

use crate::session::CloseReason;
use std::time::Duration;

/// Lifecycle notifications from the reconnecting client
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A new session attempt is starting (1-based, counted since the client started)
    ConnectAttempt { attempt: u32 },
    /// The session reached steady state
    Connected { resumed: bool },
    /// A session ended
    Disconnected { reason: CloseReason },
    /// The next attempt will start after `delay`
    RetryScheduled { attempt: u32, delay: Duration },
    /// A dispatch arrived with no handler registered for its name
    UnhandledEvent { name: String },
    /// The client stopped and will not reconnect
    Stopped,
}

impl std::fmt::Display for ClientEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectAttempt { attempt } => write!(f, "connect attempt {attempt}"),
            Self::Connected { resumed: true } => write!(f, "connected (resumed)"),
            Self::Connected { resumed: false } => write!(f, "connected"),
            Self::Disconnected { reason } => write!(f, "disconnected: {reason}"),
            Self::RetryScheduled { attempt, delay } => {
                write!(f, "retry {attempt} in {:.3}s", delay.as_secs_f64())
            }
            Self::UnhandledEvent { name } => write!(f, "unhandled event {name}"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}
