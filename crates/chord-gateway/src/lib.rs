//! # chord-gateway
//!
//! Reconnecting client for the gateway WebSocket protocol.

pub mod broadcast;
pub mod client;
pub mod connection;
pub mod events;
pub mod protocol;
pub mod session;
pub mod supervisor;

pub use broadcast::EventDispatcher;
pub use client::{GatewayClient, GatewayHandle};
pub use events::{ClientEvent, DispatchEvent, GatewayEventType, OpEvent};
pub use protocol::{Envelope, OpCode};
pub use session::{CloseReason, SessionPhase};
