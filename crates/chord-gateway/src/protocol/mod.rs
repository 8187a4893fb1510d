//! Gateway protocol definitions
//!
//! Defines the WebSocket protocol including op codes, message formats, close codes,
//! and the frame codec.

mod close_codes;
mod codec;
mod messages;
mod opcodes;
mod payloads;

pub use close_codes::{CloseCode, NORMAL_CLOSE, RESUMABLE_CLOSE};
pub use codec::{CodecError, EnvelopeCodec, MAX_PAYLOAD_BYTES};
pub use messages::Envelope;
pub use opcodes::OpCode;
pub use payloads::{
    Game, IdentifyPayload, IdentifyProperties, PresenceUpdatePayload, ReadyPayload,
    RequestMembersPayload, ResumePayload, ResumedPayload, VoiceStateUpdatePayload,
};
