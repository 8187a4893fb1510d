//! Transport seam
//!
//! The session speaks in whole frames through these traits, so it can run
//! over a real WebSocket or an in-memory peer.

use async_trait::async_trait;

/// A close frame: code plus human-readable reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

impl CloseFrame {
    #[must_use]
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// A whole WebSocket message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close(Option<CloseFrame>),
}

/// Transport errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection closed")]
    Closed,
}

/// Write half of a transport
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Start the close handshake; the read half ends once it completes
    async fn close(&mut self, frame: Option<CloseFrame>) -> Result<(), TransportError>;
}

/// Read half of a transport
#[async_trait]
pub trait FrameStream: Send {
    /// Next frame, or `None` once the transport is finished
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>>;
}

/// Both halves of an open transport
pub struct TransportPair {
    pub sink: Box<dyn FrameSink>,
    pub stream: Box<dyn FrameStream>,
}

impl std::fmt::Debug for TransportPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportPair").finish_non_exhaustive()
    }
}

/// Opens transports to a gateway URL
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<TransportPair, TransportError>;
}
