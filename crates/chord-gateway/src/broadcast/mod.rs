//! Event broadcasting
//!
//! Handles distribution of gateway events to application handlers.

mod dispatcher;

pub use dispatcher::{EventDispatcher, EVENT_CHANNEL_CAPACITY};
