//! In-memory transport
//!
//! A connector whose peers are driven by test code. Each `connect` hands a
//! [`MemoryPeer`] to the [`MemoryAcceptor`]; the peer sees every frame the
//! client writes and can push frames, close, or drop the connection.

use super::{CloseFrame, Connector, Frame, FrameSink, FrameStream, TransportError, TransportPair};
use crate::protocol::Envelope;
use async_trait::async_trait;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Connector backed by in-process channels
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<MemoryPeer>,
    refuse: Arc<AtomicUsize>,
    connects: Arc<AtomicUsize>,
    stall: Arc<AtomicBool>,
}

/// Receives the server side of each connection
#[derive(Debug)]
pub struct MemoryAcceptor {
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryConnector {
    #[must_use]
    pub fn new() -> (Self, MemoryAcceptor) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                peers: tx,
                refuse: Arc::new(AtomicUsize::new(0)),
                connects: Arc::new(AtomicUsize::new(0)),
                stall: Arc::new(AtomicBool::new(false)),
            },
            MemoryAcceptor { peers: rx },
        )
    }

    /// Fail the next `count` connect calls
    pub fn refuse_connections(&self, count: usize) {
        self.refuse.store(count, Ordering::SeqCst);
    }

    /// Writes on connections opened from now on never complete
    pub fn stall_writes(&self, stall: bool) {
        self.stall.store(stall, Ordering::SeqCst);
    }

    /// Connect calls so far, refused ones included
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl MemoryAcceptor {
    /// Wait for the next connection
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.peers.recv().await
    }

    /// A connection that is already waiting, if any
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.peers.try_recv().ok()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &str) -> Result<TransportPair, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(TransportError::Connect(format!("connection refused: {url}")));
        }

        let (to_peer, from_client) = mpsc::unbounded_channel();
        let (to_client, from_peer) = mpsc::unbounded_channel();
        let closed = CancellationToken::new();
        let local_close = Arc::new(Mutex::new(None));

        let peer = MemoryPeer {
            url: url.to_string(),
            incoming: from_client,
            outgoing: Some(to_client),
        };
        self.peers
            .send(peer)
            .map_err(|_| TransportError::Connect("acceptor dropped".to_string()))?;

        Ok(TransportPair {
            sink: Box::new(MemorySink {
                to_peer,
                closed: closed.clone(),
                local_close: Arc::clone(&local_close),
                stalled: self.stall.load(Ordering::SeqCst),
            }),
            stream: Box::new(MemoryStream {
                from_peer,
                closed,
                local_close,
                finished: false,
            }),
        })
    }
}

/// Server side of one in-memory connection
#[derive(Debug)]
pub struct MemoryPeer {
    url: String,
    incoming: mpsc::UnboundedReceiver<Frame>,
    outgoing: Option<mpsc::UnboundedSender<Frame>>,
}

impl MemoryPeer {
    /// URL the client connected to
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Next frame written by the client; `None` once the client side is gone
    pub async fn recv(&mut self) -> Option<Frame> {
        self.incoming.recv().await
    }

    /// Next text frame from the client, decoded; skips other frames
    ///
    /// Returns `None` at a close frame or once the client side is gone.
    pub async fn recv_envelope(&mut self) -> Option<Envelope> {
        loop {
            match self.incoming.recv().await? {
                Frame::Text(text) => return serde_json::from_str(&text).ok(),
                Frame::Close(_) => return None,
                _ => {}
            }
        }
    }

    /// Wait for the client's close frame, skipping anything sent before it
    pub async fn recv_close(&mut self) -> Option<CloseFrame> {
        loop {
            if let Frame::Close(frame) = self.incoming.recv().await? {
                return frame;
            }
        }
    }

    /// Push a raw frame to the client
    pub fn send(&self, frame: Frame) -> bool {
        self.outgoing
            .as_ref()
            .is_some_and(|tx| tx.send(frame).is_ok())
    }

    /// Push an envelope as a text frame
    pub fn send_envelope(&self, envelope: &Envelope) -> bool {
        match envelope.to_json() {
            Ok(json) => self.send(Frame::Text(json)),
            Err(_) => false,
        }
    }

    /// Push an envelope as a zlib-compressed binary frame
    pub fn send_compressed(&self, envelope: &Envelope) -> bool {
        match envelope.to_json() {
            Ok(json) => self.send(Frame::Binary(deflate(json.as_bytes()))),
            Err(_) => false,
        }
    }

    /// Send a close frame and end the connection
    pub fn close(&mut self, code: u16, reason: &str) {
        self.send(Frame::Close(Some(CloseFrame::new(code, reason))));
        self.outgoing = None;
    }

    /// End the connection without a close frame
    pub fn drop_connection(&mut self) {
        self.outgoing = None;
    }
}

/// zlib-compress a payload the way the gateway compresses binary frames
#[must_use]
pub fn deflate(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(bytes.len() / 4), Compression::fast());
    // Writing into a Vec cannot fail
    let _ = encoder.write_all(bytes);
    encoder.finish().unwrap_or_default()
}

struct MemorySink {
    to_peer: mpsc::UnboundedSender<Frame>,
    closed: CancellationToken,
    local_close: Arc<Mutex<Option<CloseFrame>>>,
    /// Writes hang like a socket whose send buffer never drains
    stalled: bool,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        if self.stalled {
            std::future::pending::<()>().await;
        }
        if self.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }
        self.to_peer.send(frame).map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self, frame: Option<CloseFrame>) -> Result<(), TransportError> {
        if self.stalled {
            std::future::pending::<()>().await;
        }
        if self.closed.is_cancelled() {
            return Ok(());
        }
        *self.local_close.lock() = frame.clone();
        // The peer may already be gone; the local side closes either way
        let _ = self.to_peer.send(Frame::Close(frame));
        self.closed.cancel();
        Ok(())
    }
}

struct MemoryStream {
    from_peer: mpsc::UnboundedReceiver<Frame>,
    closed: CancellationToken,
    local_close: Arc<Mutex<Option<CloseFrame>>>,
    finished: bool,
}

#[async_trait]
impl FrameStream for MemoryStream {
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        if self.finished {
            return None;
        }
        tokio::select! {
            biased;
            frame = self.from_peer.recv() => match frame {
                Some(frame) => {
                    if matches!(frame, Frame::Close(_)) {
                        self.finished = true;
                    }
                    Some(Ok(frame))
                }
                None => {
                    self.finished = true;
                    None
                }
            },
            () = self.closed.cancelled() => {
                // Echo of the locally initiated close, as a WebSocket peer would send
                self.finished = true;
                Some(Ok(Frame::Close(self.local_close.lock().take())))
            }
        }
    }
}
