//! Envelope codec
//!
//! Text frames carry JSON. Binary frames carry zlib-compressed JSON and are
//! inflated with a hard cap before parsing.

use super::{Envelope, OpCode};
use flate2::read::ZlibDecoder;
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::Read;

/// Largest inflated payload accepted from the peer (10 MiB)
pub const MAX_PAYLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Codec errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Payload exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
}

/// Encodes outbound envelopes and decodes inbound frames
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeCodec {
    max_payload: usize,
}

impl EnvelopeCodec {
    /// Create a codec that rejects inflated payloads larger than `max_payload` bytes
    #[must_use]
    pub const fn new(max_payload: usize) -> Self {
        Self { max_payload }
    }

    /// Upper bound on inflated payload size
    #[must_use]
    pub const fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Encode `{op, d: payload}` as a text frame body
    pub fn encode(&self, op: OpCode, payload: &impl Serialize) -> Result<String, CodecError> {
        let d = serde_json::to_value(payload).map_err(|e| CodecError::MalformedEnvelope(e.to_string()))?;
        self.encode_envelope(&Envelope::new(op, d))
    }

    /// Encode a prepared envelope as a text frame body
    pub fn encode_envelope(&self, envelope: &Envelope) -> Result<String, CodecError> {
        envelope
            .to_json()
            .map_err(|e| CodecError::MalformedEnvelope(e.to_string()))
    }

    /// Decode one inbound frame
    ///
    /// `op` must be an integer; op codes this client does not know still
    /// decode so their sequence number can be observed.
    pub fn decode(&self, bytes: &[u8], is_binary: bool) -> Result<Envelope, CodecError> {
        let inflated;
        let json = if is_binary {
            inflated = self.inflate(bytes)?;
            inflated.as_slice()
        } else {
            if bytes.len() > self.max_payload {
                return Err(CodecError::PayloadTooLarge {
                    limit: self.max_payload,
                });
            }
            bytes
        };

        let value: Value =
            serde_json::from_slice(json).map_err(|e| CodecError::MalformedEnvelope(e.to_string()))?;
        let Value::Object(map) = value else {
            return Err(CodecError::MalformedEnvelope("envelope is not an object".to_string()));
        };

        Self::from_map(map)
    }

    fn from_map(mut map: Map<String, Value>) -> Result<Envelope, CodecError> {
        let op = map
            .get("op")
            .and_then(Value::as_u64)
            .ok_or_else(|| CodecError::MalformedEnvelope("missing or non-integer op".to_string()))?;
        let s = map.get("s").and_then(Value::as_u64);
        let t = map.get("t").and_then(Value::as_str).map(str::to_string);
        let d = map.remove("d").unwrap_or(Value::Null);

        Ok(Envelope { op, d, s, t })
    }

    fn inflate(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        let limit = self.max_payload;
        let mut out = Vec::new();
        ZlibDecoder::new(bytes)
            .take(limit as u64 + 1)
            .read_to_end(&mut out)
            .map_err(|e| CodecError::MalformedEnvelope(format!("zlib: {e}")))?;

        if out.len() > limit {
            return Err(CodecError::PayloadTooLarge { limit });
        }
        Ok(out)
    }
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new(MAX_PAYLOAD_BYTES)
    }
}
