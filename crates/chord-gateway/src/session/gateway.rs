//! Gateway session driver
//!
//! Runs one connection from open to close: feeds inbound frames through the
//! [`SessionMachine`] and performs the actions it returns. The session state
//! goes in when the connection starts and comes back out in the outcome.

use super::{Action, CloseReason, HeartbeatController, SessionMachine, SessionPhase, SessionState};
use crate::broadcast::EventDispatcher;
use crate::connection::{spawn_writer, Connection, Frame, TransportPair};
use crate::events::{ClientEvent, DispatchEvent, OpEvent};
use crate::protocol::EnvelopeCodec;
use chord_common::{Credential, GatewayConfig};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;

/// How long to wait for the peer to finish a close this side started
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long the writer gets to flush after the read loop ends
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Everything a session needs that outlives it
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub config: Arc<GatewayConfig>,
    pub credential: Credential,
    pub dispatcher: EventDispatcher,
    /// Current phase, for `GatewayHandle::status`
    pub status: Arc<watch::Sender<SessionPhase>>,
    /// The live connection, for application sends
    pub outbound: Arc<RwLock<Option<Connection>>>,
}

impl SessionContext {
    #[must_use]
    pub fn new(config: GatewayConfig, credential: Credential, dispatcher: EventDispatcher) -> Self {
        Self {
            config: Arc::new(config),
            credential,
            dispatcher,
            status: Arc::new(watch::channel(SessionPhase::Disconnected).0),
            outbound: Arc::new(RwLock::new(None)),
        }
    }

    pub(crate) fn set_phase(&self, phase: SessionPhase) {
        self.status.send_if_modified(|current| {
            let changed = *current != phase;
            *current = phase;
            changed
        });
    }
}

/// How a session ended
#[derive(Debug)]
pub struct SessionOutcome {
    pub reason: CloseReason,
    /// Session state to carry into the next attempt
    pub state: SessionState,
    /// Whether READY or RESUMED arrived on this connection
    pub established: bool,
}

/// Run one session over an open transport until it ends
///
/// `stop` requests a normal close; the call still returns only after the
/// transport has finished.
pub async fn run_session(
    ctx: &SessionContext,
    state: SessionState,
    transport: TransportPair,
    stop: &CancellationToken,
) -> SessionOutcome {
    let TransportPair { sink, mut stream } = transport;
    let codec = EnvelopeCodec::new(ctx.config.max_payload_bytes);
    let (connection, queue) = Connection::new(ctx.config.outbound_buffer);
    let stalled = connection.stalled();
    let writer = spawn_writer(sink, codec, queue, stalled.clone());

    let (sequence, sequence_rx) = watch::channel(state.sequence());
    let heartbeat = HeartbeatController::new(
        connection.clone(),
        sequence_rx,
        ctx.config.heartbeat_timeout_factor,
    );
    let expiry = heartbeat.expiry();

    let mut driver = SessionDriver {
        ctx,
        codec,
        machine: SessionMachine::new(state, ctx.credential.clone(), &ctx.config),
        connection,
        heartbeat,
        sequence,
        established: false,
        close_deadline: None,
    };
    *ctx.outbound.write() = Some(driver.connection.clone());

    let actions = driver.machine.on_open();
    driver.apply(actions);

    let reason = loop {
        let close_deadline = driver.close_deadline;
        let closing = driver.machine.is_closing();

        tokio::select! {
            frame = stream.next_frame() => match frame {
                Some(Ok(Frame::Text(text))) => driver.on_payload(text.as_bytes(), false),
                Some(Ok(Frame::Binary(data))) => driver.on_payload(&data, true),
                Some(Ok(Frame::Ping(_) | Frame::Pong(_))) => driver.connection.record_inbound(),
                Some(Ok(Frame::Close(frame))) => {
                    let (code, text) = frame.map_or((None, String::new()), |f| (Some(f.code), f.reason));
                    tracing::debug!(code = ?code, reason = %text, "Transport closed");
                    break driver.machine.on_closed(code, &text);
                }
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "Transport failed");
                    break driver.machine.on_transport_error(e.to_string());
                }
                None => break driver.machine.on_closed(None, ""),
            },
            () = expiry.cancelled(), if !closing => {
                let actions = driver.machine.on_heartbeat_expired();
                driver.apply(actions);
            }
            () = stop.cancelled(), if !closing => {
                let actions = driver.machine.on_stop();
                driver.apply(actions);
            }
            () = stalled.cancelled(), if !closing => {
                tracing::warn!("Outbound writes stalled");
                break driver.machine.on_transport_error("outbound writes stalled");
            }
            () = sleep_until(close_deadline.unwrap_or_else(Instant::now)), if close_deadline.is_some() => {
                tracing::warn!("Peer did not finish the close handshake");
                break driver.machine.on_transport_error("close handshake timed out");
            }
        }
    };

    driver.finish(writer, reason).await
}

struct SessionDriver<'a> {
    ctx: &'a SessionContext,
    codec: EnvelopeCodec,
    machine: SessionMachine,
    connection: Connection,
    heartbeat: HeartbeatController,
    sequence: watch::Sender<u64>,
    established: bool,
    close_deadline: Option<Instant>,
}

impl SessionDriver<'_> {
    fn on_payload(&mut self, bytes: &[u8], binary: bool) {
        self.connection.record_inbound();

        match self.codec.decode(bytes, binary) {
            Ok(envelope) => {
                tracing::trace!(envelope = %envelope, "Received");
                let actions = self.machine.on_envelope(envelope);
                // Heartbeats must see the sequence before anything else runs
                self.sequence.send_replace(self.machine.state().sequence());
                self.apply(actions);
            }
            Err(e) => {
                let actions = self.machine.on_decode_error(&e);
                self.apply(actions);
            }
        }
    }

    /// Perform actions without waiting on the writer
    ///
    /// Nothing here may block: the read loop has to keep polling stop,
    /// expiry and the close deadline whatever state the socket is in.
    fn apply(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Send(envelope) => {
                    if self.connection.try_send(envelope).is_err() {
                        tracing::debug!("Writer has exited, dropping envelope");
                    }
                }
                Action::StartHeartbeat(interval) => self.heartbeat.start(interval),
                Action::StopHeartbeat => self.heartbeat.stop(),
                Action::Close { code, reason } => {
                    if self.connection.close(code, reason).is_err() {
                        tracing::debug!(code, "Writer has exited, transport dropped without a close frame");
                    }
                    self.close_deadline = Some(Instant::now() + CLOSE_TIMEOUT);
                }
                Action::Dispatch {
                    name,
                    sequence,
                    payload,
                } => {
                    let snapshot = self.machine.state().snapshot();
                    self.ctx
                        .dispatcher
                        .dispatch(DispatchEvent::new(name, sequence, payload, snapshot));
                }
                Action::Observe {
                    op,
                    sequence,
                    payload,
                } => {
                    let snapshot = self.machine.state().snapshot();
                    self.ctx
                        .dispatcher
                        .observe(OpEvent::new(op, sequence, payload, snapshot));
                }
                Action::Established { resumed } => {
                    self.established = true;
                    let _ = self
                        .ctx
                        .dispatcher
                        .lifecycle()
                        .send(ClientEvent::Connected { resumed });
                }
            }
        }
        self.ctx.set_phase(self.machine.state().phase());
    }

    async fn finish(self, writer: JoinHandle<()>, reason: CloseReason) -> SessionOutcome {
        let SessionDriver {
            ctx,
            machine,
            connection,
            mut heartbeat,
            established,
            ..
        } = self;

        heartbeat.stop();
        drop(heartbeat);
        *ctx.outbound.write() = None;
        drop(connection);

        // The writer exits once the last connection handle is gone
        let abort = writer.abort_handle();
        if timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
            tracing::debug!("Writer did not drain in time");
            abort.abort();
        }

        let state = machine.into_state();
        ctx.set_phase(state.phase());
        tracing::info!(
            reason = %reason,
            session_id = ?state.session_id(),
            seq = state.sequence(),
            "Session ended"
        );

        SessionOutcome {
            reason,
            state,
            established,
        }
    }
}
