//! Gateway message format
//!
//! Defines the envelope every frame on the gateway connection carries.

use super::{
    IdentifyPayload, OpCode, PresenceUpdatePayload, RequestMembersPayload, ResumePayload,
    VoiceStateUpdatePayload,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Gateway envelope
///
/// `op` is kept as the raw integer so that envelopes with op codes this
/// client does not know still decode, and their `s` is still observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Operation code
    pub op: u64,

    /// Event data payload
    #[serde(default)]
    pub d: Value,

    /// Sequence number (only for op=0 Dispatch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,

    /// Event type (only for op=0 Dispatch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl Envelope {
    /// Create an envelope with no sequence or event name
    #[must_use]
    pub fn new(op: OpCode, d: Value) -> Self {
        Self {
            op: u64::from(op.as_u8()),
            d,
            s: None,
            t: None,
        }
    }

    fn with_payload(op: OpCode, payload: &impl Serialize) -> serde_json::Result<Self> {
        Ok(Self::new(op, serde_json::to_value(payload)?))
    }

    // === Client Messages ===

    /// Create a Heartbeat message (op=1) carrying the last seen sequence
    #[must_use]
    pub fn heartbeat(sequence: u64) -> Self {
        Self::new(OpCode::Heartbeat, Value::from(sequence))
    }

    /// Create an Identify message (op=2)
    pub fn identify(payload: &IdentifyPayload) -> serde_json::Result<Self> {
        Self::with_payload(OpCode::Identify, payload)
    }

    /// Create a Resume message (op=6)
    pub fn resume(payload: &ResumePayload) -> serde_json::Result<Self> {
        Self::with_payload(OpCode::Resume, payload)
    }

    /// Create a Presence Update message (op=3)
    pub fn presence_update(payload: &PresenceUpdatePayload) -> serde_json::Result<Self> {
        Self::with_payload(OpCode::PresenceUpdate, payload)
    }

    /// Create a Voice State Update message (op=4)
    pub fn voice_state_update(payload: &VoiceStateUpdatePayload) -> serde_json::Result<Self> {
        Self::with_payload(OpCode::VoiceStateUpdate, payload)
    }

    /// Create a Request Guild Members message (op=8)
    pub fn request_members(payload: &RequestMembersPayload) -> serde_json::Result<Self> {
        Self::with_payload(OpCode::RequestMembers, payload)
    }

    // === Server Messages ===

    /// Create a Dispatch message (op=0)
    #[must_use]
    pub fn dispatch(event_type: impl Into<String>, sequence: u64, data: Value) -> Self {
        Self {
            op: u64::from(OpCode::Dispatch.as_u8()),
            d: data,
            s: Some(sequence),
            t: Some(event_type.into()),
        }
    }

    /// Create a Reconnect message (op=7)
    #[must_use]
    pub fn reconnect() -> Self {
        Self::new(OpCode::Reconnect, Value::Null)
    }

    /// Create an Invalidate Session message (op=9)
    #[must_use]
    pub fn invalidate_session() -> Self {
        Self::new(OpCode::InvalidateSession, Value::Null)
    }

    // === Utilities ===

    /// The known op code, if any
    #[must_use]
    pub fn opcode(&self) -> Option<OpCode> {
        OpCode::from_raw(self.op)
    }

    /// Check if this is a Dispatch envelope
    #[must_use]
    pub fn is_dispatch(&self) -> bool {
        self.opcode() == Some(OpCode::Dispatch)
    }

    /// Event name of a Dispatch envelope
    #[must_use]
    pub fn event_name(&self) -> Option<&str> {
        self.t.as_deref()
    }

    /// Try to parse `d` as a typed payload
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.d)
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// `d` stays out of Display: IDENTIFY and RESUME carry the credential.
impl std::fmt::Display for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.opcode() {
            Some(op) => write!(f, "Envelope(op={op}")?,
            None => write!(f, "Envelope(op={} (unknown)", self.op)?,
        }
        if let Some(t) = &self.t {
            write!(f, ", t={t}")?;
        }
        if let Some(s) = self.s {
            write!(f, ", s={s}")?;
        }
        write!(f, ")")
    }
}
