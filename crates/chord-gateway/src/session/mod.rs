//! Gateway sessions
//!
//! Session state that survives reconnects, the protocol state machine, the
//! heartbeat controller, and the driver that runs one connection.

mod error;
mod gateway;
mod heartbeat;
mod machine;
mod state;

pub use error::CloseReason;
pub use gateway::{run_session, SessionContext, SessionOutcome};
pub use heartbeat::HeartbeatController;
pub use machine::{Action, SessionMachine};
pub use state::{SessionPhase, SessionSnapshot, SessionState};
