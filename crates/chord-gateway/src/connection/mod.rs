//! Connection management
//!
//! Transports, the single-writer outbound queue, and connection liveness.

mod connection;
#[cfg(any(test, feature = "testing"))]
mod memory;
mod transport;
mod websocket;

pub use connection::{spawn_writer, Connection, ConnectionClosed, Outbound};
#[cfg(any(test, feature = "testing"))]
pub use memory::{deflate, MemoryAcceptor, MemoryConnector, MemoryPeer};
pub use transport::{
    CloseFrame, Connector, Frame, FrameSink, FrameStream, TransportError, TransportPair,
};
pub use websocket::WebSocketConnector;
