//! Gateway events
//!
//! Dispatch events handed to application handlers, and client lifecycle events.

mod client_event;
mod event_types;
mod payloads;

pub use client_event::ClientEvent;
pub use event_types::GatewayEventType;
pub use payloads::{DispatchEvent, OpEvent};
