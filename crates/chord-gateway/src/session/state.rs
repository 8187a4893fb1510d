//! Session state
//!
//! What survives between connections: the last sequence number and the
//! session id. Owned by exactly one running session at a time; the
//! supervisor moves it from one attempt to the next.

use serde::Serialize;

/// Lifecycle phase of the current connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Disconnected,
    /// Transport is being opened
    Connecting,
    /// IDENTIFY or RESUME sent, waiting for READY/RESUMED
    Identifying,
    /// Heartbeating and forwarding events
    Steady,
    /// Close requested, waiting for the transport to finish
    Closing,
}

impl SessionPhase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Identifying => "identifying",
            Self::Steady => "steady",
            Self::Closing => "closing",
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resumable session state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    sequence: u64,
    session_id: Option<String>,
    phase: SessionPhase,
}

impl SessionState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last sequence number seen
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    #[must_use]
    pub const fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: SessionPhase) {
        if self.phase != phase {
            tracing::trace!(from = %self.phase, to = %phase, "Session phase change");
            self.phase = phase;
        }
    }

    /// Record an envelope's sequence number
    ///
    /// The sequence only moves forward; a reordered lower value is ignored.
    /// Returns whether the sequence advanced.
    pub fn observe_sequence(&mut self, sequence: u64) -> bool {
        if sequence > self.sequence {
            self.sequence = sequence;
            true
        } else {
            false
        }
    }

    /// Store the session id from READY
    pub fn begin(&mut self, session_id: impl Into<String>) {
        self.session_id = Some(session_id.into());
    }

    /// Whether the next connection can RESUME instead of IDENTIFY
    #[must_use]
    pub const fn can_resume(&self) -> bool {
        self.session_id.is_some()
    }

    /// Drop the session; the next connection must IDENTIFY
    pub fn reset(&mut self) {
        self.sequence = 0;
        self.session_id = None;
    }

    /// Read-only copy for handlers and observers
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            sequence: self.sequence,
            session_id: self.session_id.clone(),
            phase: self.phase,
        }
    }
}

/// Point-in-time copy of [`SessionState`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub sequence: u64,
    pub session_id: Option<String>,
    pub phase: SessionPhase,
}
