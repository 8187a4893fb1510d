//! Reconnect supervision
//!
//! Backoff schedule and the loop that runs session attempts.

mod backoff;
mod reconnect;

pub use backoff::{Backoff, JITTER_FRACTION, MULTIPLIER};
pub use reconnect::ReconnectSupervisor;
