//! Events delivered to handlers
//!
//! Handlers receive owned events with a read-only view of the session they
//! arrived on; they never touch live session state.

use super::GatewayEventType;
use crate::protocol::OpCode;
use crate::session::SessionSnapshot;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A Dispatch (op 0) event
#[derive(Debug, Clone)]
pub struct DispatchEvent {
    /// Event name as received, e.g. `MESSAGE_CREATE`
    pub name: String,
    /// Sequence number of the envelope, if it carried one
    pub sequence: Option<u64>,
    /// The envelope's `d`
    pub payload: Value,
    /// Session state after the envelope was applied
    pub session: SessionSnapshot,
    pub received_at: DateTime<Utc>,
}

impl DispatchEvent {
    #[must_use]
    pub fn new(name: String, sequence: Option<u64>, payload: Value, session: SessionSnapshot) -> Self {
        Self {
            name,
            sequence,
            payload,
            session,
            received_at: Utc::now(),
        }
    }

    /// The well-known event type, if the name is one
    #[must_use]
    pub fn event_type(&self) -> Option<GatewayEventType> {
        GatewayEventType::from_name(&self.name)
    }

    /// Deserialize the payload into a typed model
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

/// A non-dispatch envelope, for op-code observers
#[derive(Debug, Clone)]
pub struct OpEvent {
    pub op: OpCode,
    pub sequence: Option<u64>,
    pub payload: Value,
    pub session: SessionSnapshot,
    pub received_at: DateTime<Utc>,
}

impl OpEvent {
    #[must_use]
    pub fn new(op: OpCode, sequence: Option<u64>, payload: Value, session: SessionSnapshot) -> Self {
        Self {
            op,
            sequence,
            payload,
            session,
            received_at: Utc::now(),
        }
    }
}
