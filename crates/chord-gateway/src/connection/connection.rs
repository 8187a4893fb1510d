//! Outbound side of one gateway connection
//!
//! Every write goes through a single writer task fed by a bounded queue, so
//! heartbeats, IDENTIFY/RESUME and application sends never interleave on the
//! socket. The session itself never waits on the queue: a queue that stays
//! full, or a socket write that outlives [`WRITE_TIMEOUT`], marks the
//! connection stalled and the writer drops the transport.

use super::{CloseFrame, Frame, FrameSink};
use crate::protocol::{Envelope, EnvelopeCodec};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;

/// Longest a single socket write may take
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// A queued write
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Envelope(Envelope),
    /// Close the transport; nothing queued after this is written
    Close(CloseFrame),
}

/// The writer task has exited
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Connection closed")]
pub struct ConnectionClosed;

/// Cloneable handle to one connection's writer, plus its inbound liveness clock
#[derive(Debug, Clone)]
pub struct Connection {
    sender: mpsc::Sender<Outbound>,
    stalled: CancellationToken,
    last_inbound: Arc<Mutex<Instant>>,
    created_at: Instant,
}

impl Connection {
    /// Create a connection handle and the queue its writer drains
    #[must_use]
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let now = Instant::now();
        (
            Self {
                sender,
                stalled: CancellationToken::new(),
                last_inbound: Arc::new(Mutex::new(now)),
                created_at: now,
            },
            receiver,
        )
    }

    /// Queue an envelope, waiting for room
    ///
    /// For application sends; the writer's own timeout bounds the wait.
    pub async fn send(&self, envelope: Envelope) -> Result<(), ConnectionClosed> {
        tokio::select! {
            biased;
            () = self.stalled.cancelled() => Err(ConnectionClosed),
            sent = self.sender.send(Outbound::Envelope(envelope)) => sent.map_err(|_| ConnectionClosed),
        }
    }

    /// Queue an envelope without waiting
    ///
    /// A full queue means the writer is stuck on the socket; the connection
    /// is marked stalled and the envelope is dropped.
    pub fn try_send(&self, envelope: Envelope) -> Result<(), ConnectionClosed> {
        self.enqueue(Outbound::Envelope(envelope))
    }

    /// Queue a close without waiting; a full queue drops the transport instead
    pub fn close(&self, code: u16, reason: &str) -> Result<(), ConnectionClosed> {
        self.enqueue(Outbound::Close(CloseFrame::new(code, reason)))
    }

    fn enqueue(&self, outbound: Outbound) -> Result<(), ConnectionClosed> {
        if self.stalled.is_cancelled() {
            return Err(ConnectionClosed);
        }
        match self.sender.try_send(outbound) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                tracing::warn!(queued = self.sender.max_capacity(), "Outbound queue full, dropping transport");
                self.stalled.cancel();
                Err(ConnectionClosed)
            }
            Err(TrySendError::Closed(_)) => Err(ConnectionClosed),
        }
    }

    /// Whether the writer has exited
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Cancelled once writes stop making progress
    #[must_use]
    pub fn stalled(&self) -> CancellationToken {
        self.stalled.clone()
    }

    /// Record that a frame arrived from the peer
    pub fn record_inbound(&self) {
        *self.last_inbound.lock() = Instant::now();
    }

    /// Time since the peer last sent anything
    #[must_use]
    pub fn time_since_inbound(&self) -> Duration {
        self.last_inbound.lock().elapsed()
    }

    /// Connection age
    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Spawn the single writer for a connection
///
/// Exits after writing a close, when the sink fails, once every
/// [`Connection`] handle is dropped (closing the sink without a frame), or
/// as soon as the connection is stalled (dropping the sink unflushed).
pub fn spawn_writer(
    mut sink: Box<dyn FrameSink>,
    codec: EnvelopeCodec,
    mut queue: mpsc::Receiver<Outbound>,
    stalled: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let outbound = tokio::select! {
                biased;
                () = stalled.cancelled() => break,
                next = queue.recv() => next,
            };
            let Some(outbound) = outbound else {
                let _ = timeout(WRITE_TIMEOUT, sink.close(None)).await;
                return;
            };

            let (write, closing) = match outbound {
                Outbound::Envelope(envelope) => match codec.encode_envelope(&envelope) {
                    Ok(text) => {
                        tracing::trace!(envelope = %envelope, "Sending");
                        (sink.send(Frame::Text(text)), false)
                    }
                    Err(e) => {
                        tracing::error!(error = %e, op = envelope.op, "Failed to encode envelope");
                        continue;
                    }
                },
                Outbound::Close(frame) => {
                    tracing::debug!(code = frame.code, reason = %frame.reason, "Sending close");
                    (sink.close(Some(frame)), true)
                }
            };

            let result = tokio::select! {
                biased;
                () = stalled.cancelled() => break,
                result = timeout(WRITE_TIMEOUT, write) => result,
            };
            match result {
                Ok(Ok(())) if !closing => {}
                Ok(Ok(())) => return,
                Ok(Err(e)) => {
                    tracing::debug!(error = %e, "Writer stopped");
                    return;
                }
                Err(_) => {
                    tracing::warn!(timeout_ms = WRITE_TIMEOUT.as_millis() as u64, "Socket write timed out");
                    stalled.cancel();
                    break;
                }
            }
        }

        tracing::debug!("Writer stalled, dropping transport");
    })
}
