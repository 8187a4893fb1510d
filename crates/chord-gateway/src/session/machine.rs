//! Session state machine
//!
//! Pure transitions: every input returns the actions to perform, and the
//! driver in `gateway.rs` performs them. Nothing here touches I/O or timers,
//! which keeps the protocol rules testable without a connection.

use super::{CloseReason, SessionPhase, SessionState};
use crate::events::GatewayEventType;
use crate::protocol::{
    CodecError, Envelope, IdentifyPayload, IdentifyProperties, OpCode, ReadyPayload,
    ResumePayload, ResumedPayload, NORMAL_CLOSE, RESUMABLE_CLOSE,
};
use chord_common::{Credential, GatewayConfig};
use serde::Deserialize as _;
use serde_json::Value;
use std::time::Duration;

/// Side effect requested by a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Queue an envelope on the outbound writer
    Send(Envelope),
    /// (Re)start heartbeating at this interval
    StartHeartbeat(Duration),
    StopHeartbeat,
    /// Close the transport
    Close { code: u16, reason: &'static str },
    /// Hand a Dispatch to the event handlers
    Dispatch {
        name: String,
        sequence: Option<u64>,
        payload: Value,
    },
    /// Hand a non-dispatch envelope to op observers
    Observe {
        op: OpCode,
        sequence: Option<u64>,
        payload: Value,
    },
    /// READY or RESUMED arrived
    Established { resumed: bool },
}

/// Fields of IDENTIFY that come from configuration
#[derive(Debug, Clone)]
struct IdentifyTemplate {
    properties: IdentifyProperties,
    compress: bool,
    large_threshold: u32,
    version: u8,
}

/// Protocol state for one connection
#[derive(Debug)]
pub struct SessionMachine {
    state: SessionState,
    credential: Credential,
    identify: IdentifyTemplate,
    closing: Option<CloseReason>,
}

impl SessionMachine {
    #[must_use]
    pub fn new(mut state: SessionState, credential: Credential, config: &GatewayConfig) -> Self {
        state.set_phase(SessionPhase::Connecting);
        Self {
            state,
            credential,
            identify: IdentifyTemplate {
                properties: IdentifyProperties::for_client(&config.client_name),
                compress: config.compress,
                large_threshold: config.large_threshold,
                version: config.identify_version,
            },
            closing: None,
        }
    }

    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub fn into_state(self) -> SessionState {
        self.state
    }

    #[must_use]
    pub const fn is_closing(&self) -> bool {
        self.closing.is_some()
    }

    /// Transport opened: IDENTIFY, or RESUME if a session is held
    pub fn on_open(&mut self) -> Vec<Action> {
        self.state.set_phase(SessionPhase::Identifying);

        let envelope = match self.state.session_id() {
            Some(session_id) => {
                tracing::info!(
                    session_id = %session_id,
                    seq = self.state.sequence(),
                    "Resuming session"
                );
                Envelope::resume(&ResumePayload {
                    token: self.credential.expose().to_string(),
                    session_id: session_id.to_string(),
                    seq: self.state.sequence(),
                })
            }
            None => {
                tracing::info!(credential = %self.credential.fingerprint(), "Identifying");
                self.identify_envelope()
            }
        };

        self.handshake(envelope)
    }

    /// Apply one decoded inbound envelope
    pub fn on_envelope(&mut self, envelope: Envelope) -> Vec<Action> {
        if let Some(s) = envelope.s {
            if !self.state.observe_sequence(s) && s < self.state.sequence() {
                tracing::debug!(seq = s, current = self.state.sequence(), "Ignoring stale sequence");
            }
        }

        let Some(op) = envelope.opcode() else {
            tracing::debug!(op = envelope.op, "Ignoring unknown op code");
            return Vec::new();
        };

        match op {
            OpCode::Dispatch => self.on_dispatch(envelope),
            OpCode::Heartbeat => {
                tracing::trace!(seq = self.state.sequence(), "Heartbeat requested by peer");
                let mut actions = self.observe(op, envelope);
                actions.push(Action::Send(Envelope::heartbeat(self.state.sequence())));
                actions
            }
            OpCode::Reconnect if !self.is_closing() => {
                tracing::info!("Peer requested reconnect");
                let mut actions = self.observe(op, envelope);
                actions.extend(self.begin_close(
                    CloseReason::ReconnectRequested,
                    RESUMABLE_CLOSE,
                    "RECONNECT requested",
                ));
                actions
            }
            OpCode::InvalidateSession if !self.is_closing() => {
                tracing::info!(session_id = ?self.state.session_id(), "Session invalidated");
                self.state.reset();
                self.state.set_phase(SessionPhase::Identifying);
                let mut actions = self.observe(op, envelope);
                let identify = self.identify_envelope();
                actions.extend(self.handshake(identify));
                actions
            }
            _ => {
                tracing::debug!(op = %op, "Ignoring op code");
                Vec::new()
            }
        }
    }

    /// Watchdog fired: nothing received for too long
    pub fn on_heartbeat_expired(&mut self) -> Vec<Action> {
        tracing::warn!(seq = self.state.sequence(), "Heartbeat timed out");
        self.begin_close(CloseReason::HeartbeatTimeout, RESUMABLE_CLOSE, "heartbeat timed out")
    }

    /// The caller asked the client to stop
    pub fn on_stop(&mut self) -> Vec<Action> {
        self.begin_close(CloseReason::Stopped, NORMAL_CLOSE, "client stopped")
    }

    /// An inbound frame failed to decode
    pub fn on_decode_error(&mut self, err: &CodecError) -> Vec<Action> {
        tracing::warn!(error = %err, "Dropping connection after undecodable frame");
        self.begin_close(
            CloseReason::ProtocolViolation(err.to_string()),
            RESUMABLE_CLOSE,
            "protocol violation",
        )
    }

    /// The transport closed; a close this side initiated keeps its own reason
    pub fn on_closed(&mut self, code: Option<u16>, reason: &str) -> CloseReason {
        self.state.set_phase(SessionPhase::Disconnected);
        self.closing
            .take()
            .unwrap_or_else(|| CloseReason::from_peer_close(code, reason))
    }

    /// The transport failed
    pub fn on_transport_error(&mut self, detail: impl Into<String>) -> CloseReason {
        self.state.set_phase(SessionPhase::Disconnected);
        self.closing
            .take()
            .unwrap_or_else(|| CloseReason::Transport(detail.into()))
    }

    fn on_dispatch(&mut self, envelope: Envelope) -> Vec<Action> {
        let Envelope { d, s, t, .. } = envelope;
        let Some(name) = t else {
            tracing::debug!(seq = ?s, "Ignoring dispatch without event name");
            return Vec::new();
        };

        let mut actions = Vec::new();
        match GatewayEventType::from_name(&name) {
            Some(GatewayEventType::Ready) => match ReadyPayload::deserialize(&d) {
                Ok(ready) if ready.heartbeat_interval > 0 => {
                    tracing::info!(session_id = %ready.session_id, v = ?ready.v, "Session ready");
                    self.state.begin(ready.session_id);
                    actions.extend(self.establish(ready.heartbeat_interval, false));
                }
                Ok(_) => return self.on_bad_session_payload("READY heartbeat_interval is zero"),
                Err(e) => return self.on_bad_session_payload(&format!("invalid READY: {e}")),
            },
            Some(GatewayEventType::Resumed) => match ResumedPayload::deserialize(&d) {
                Ok(resumed) if resumed.heartbeat_interval > 0 => {
                    tracing::info!(
                        session_id = ?self.state.session_id(),
                        seq = self.state.sequence(),
                        "Session resumed"
                    );
                    actions.extend(self.establish(resumed.heartbeat_interval, true));
                }
                Ok(_) => return self.on_bad_session_payload("RESUMED heartbeat_interval is zero"),
                Err(e) => return self.on_bad_session_payload(&format!("invalid RESUMED: {e}")),
            },
            _ => {}
        }

        actions.push(Action::Dispatch {
            name,
            sequence: s,
            payload: d,
        });
        actions
    }

    fn establish(&mut self, interval_ms: u64, resumed: bool) -> Vec<Action> {
        self.state.set_phase(SessionPhase::Steady);
        vec![
            Action::StartHeartbeat(Duration::from_millis(interval_ms)),
            Action::Established { resumed },
        ]
    }

    fn on_bad_session_payload(&mut self, detail: &str) -> Vec<Action> {
        self.on_decode_error(&CodecError::MalformedEnvelope(detail.to_string()))
    }

    fn observe(&self, op: OpCode, envelope: Envelope) -> Vec<Action> {
        vec![Action::Observe {
            op,
            sequence: envelope.s,
            payload: envelope.d,
        }]
    }

    fn begin_close(&mut self, reason: CloseReason, code: u16, text: &'static str) -> Vec<Action> {
        if self.closing.is_some() {
            return Vec::new();
        }
        tracing::debug!(code, reason = %reason, "Closing connection");
        self.closing = Some(reason);
        self.state.set_phase(SessionPhase::Closing);
        vec![Action::StopHeartbeat, Action::Close { code, reason: text }]
    }

    /// Send IDENTIFY or RESUME; a payload that cannot be encoded ends the client
    fn handshake(&mut self, envelope: serde_json::Result<Envelope>) -> Vec<Action> {
        match envelope {
            Ok(envelope) => vec![Action::Send(envelope)],
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode handshake payload");
                self.begin_close(CloseReason::Encode(e.to_string()), NORMAL_CLOSE, "client error")
            }
        }
    }

    fn identify_envelope(&self) -> serde_json::Result<Envelope> {
        Envelope::identify(&IdentifyPayload {
            token: self.credential.expose().to_string(),
            properties: self.identify.properties.clone(),
            compress: self.identify.compress,
            large_threshold: self.identify.large_threshold,
            v: self.identify.version,
        })
    }
}
