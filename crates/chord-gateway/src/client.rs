//! Gateway client
//!
//! [`GatewayClient`] holds configuration and handler registrations;
//! `connect` resolves the gateway over HTTP and spawns the reconnect
//! supervisor. The returned [`GatewayHandle`] controls the running client.

use crate::broadcast::EventDispatcher;
use crate::connection::{Connection, Connector, WebSocketConnector};
use crate::events::{ClientEvent, DispatchEvent, OpEvent};
use crate::protocol::{
    Envelope, OpCode, PresenceUpdatePayload, RequestMembersPayload, VoiceStateUpdatePayload,
};
use crate::session::{
    run_session, CloseReason, SessionContext, SessionOutcome, SessionPhase, SessionState,
};
use crate::supervisor::{Backoff, ReconnectSupervisor};
use chord_common::{ClientConfig, ClientError, ClientResult, Credential};
use chord_http::RestClient;
use parking_lot::RwLock;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Reconnecting gateway client
#[derive(Clone)]
pub struct GatewayClient {
    config: Arc<ClientConfig>,
    dispatcher: EventDispatcher,
    connector: Arc<dyn Connector>,
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("config", &self.config)
            .field("handlers", &self.dispatcher.handler_count())
            .finish_non_exhaustive()
    }
}

impl GatewayClient {
    /// Client over real WebSocket connections
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        let connector = WebSocketConnector::new(config.http.user_agent.clone());
        Self::with_connector(config, connector)
    }

    /// Client over a custom transport
    #[must_use]
    pub fn with_connector(config: ClientConfig, connector: impl Connector + 'static) -> Self {
        Self {
            config: Arc::new(config),
            dispatcher: EventDispatcher::default(),
            connector: Arc::new(connector),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Handler registry shared with every session this client runs
    #[must_use]
    pub const fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Register an async handler for a dispatch event name
    pub fn on<F, Fut>(&self, event: &str, handler: F) -> &Self
    where
        F: Fn(DispatchEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.dispatcher.on(event, handler);
        self
    }

    /// Register a synchronous handler that may block
    pub fn on_blocking<F>(&self, event: &str, handler: F) -> &Self
    where
        F: Fn(DispatchEvent) + Send + Sync + 'static,
    {
        self.dispatcher.on_blocking(event, handler);
        self
    }

    /// Register an observer for a non-dispatch op code
    pub fn on_op<F, Fut>(&self, op: OpCode, handler: F) -> &Self
    where
        F: Fn(OpEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.dispatcher.on_op(op, handler);
        self
    }

    /// Exchange an email/password pair for a credential
    ///
    /// # Errors
    /// Returns [`ClientError::Bootstrap`] if the login endpoint rejects the
    /// pair or cannot be reached
    pub async fn login(&self, email: &str, password: &str) -> ClientResult<Credential> {
        let rest = RestClient::new(&self.config.http)?;
        Ok(rest.login(email, password).await?)
    }

    /// Credential from the configured token, or from a login with the configured email and password
    ///
    /// # Errors
    /// Returns [`ClientError::Bootstrap`] when no credentials are configured
    /// or the login fails
    pub async fn configured_credential(&self) -> ClientResult<Credential> {
        let creds = &self.config.credentials;
        if let Some(token) = &creds.token {
            return Ok(Credential::new(token.clone()));
        }
        match (&creds.email, &creds.password) {
            (Some(email), Some(password)) => self.login(email, password).await,
            _ => Err(ClientError::Bootstrap(
                "no token or email/password configured".to_string(),
            )),
        }
    }

    /// Resolve the gateway endpoint and start the client
    ///
    /// Returns once the endpoint is known; the first connection is made in
    /// the background.
    ///
    /// # Errors
    /// Returns [`ClientError::Bootstrap`] if the credential is blank or the
    /// gateway endpoint cannot be resolved
    pub async fn connect(&self, credential: Credential) -> ClientResult<GatewayHandle> {
        ensure_credential(&credential)?;

        let version = self.config.gateway.version;
        let rest = RestClient::new(&self.config.http)?;
        let base = rest.gateway_url(&credential, version).await?;
        let url = gateway_endpoint(&base, version);

        self.connect_to(credential, url)
    }

    /// Start the client against a known gateway URL, skipping HTTP bootstrap
    ///
    /// # Errors
    /// Returns [`ClientError::Bootstrap`] if the credential is blank
    pub fn connect_to(&self, credential: Credential, url: impl Into<String>) -> ClientResult<GatewayHandle> {
        ensure_credential(&credential)?;
        let url = url.into();

        let ctx = SessionContext::new(
            self.config.gateway.clone(),
            credential,
            self.dispatcher.clone(),
        );
        let stop = CancellationToken::new();
        let events = self.dispatcher.lifecycle().clone();
        let supervisor = ReconnectSupervisor::new(
            Backoff::from_config(&self.config.backoff),
            stop.clone(),
            events.clone(),
        );

        let status = ctx.status.subscribe();
        let outbound = Arc::clone(&ctx.outbound);
        let task_stop = stop.clone();

        tracing::info!(url = %url, "Starting gateway client");
        let connector = Arc::clone(&self.connector);
        let task = tokio::spawn(async move {
            let (ctx, stop, url) = (&ctx, &task_stop, url.as_str());
            let connector = connector.as_ref();
            let result = supervisor
                .run(SessionState::new(), move |state| {
                    run_attempt(ctx, connector, url, state, stop)
                })
                .await;
            ctx.set_phase(SessionPhase::Disconnected);
            if let Err(e) = &result {
                tracing::error!(error = %e, code = e.error_code(), "Gateway client stopped");
            }
            result
        });

        Ok(GatewayHandle {
            stop,
            status,
            outbound,
            events,
            task: Some(task),
        })
    }
}

/// One connection attempt: open the transport, then run the session on it
async fn run_attempt(
    ctx: &SessionContext,
    connector: &dyn Connector,
    url: &str,
    mut state: SessionState,
    stop: &CancellationToken,
) -> SessionOutcome {
    state.set_phase(SessionPhase::Connecting);
    ctx.set_phase(SessionPhase::Connecting);

    let connected = tokio::select! {
        result = connector.connect(url) => result,
        () = stop.cancelled() => {
            state.set_phase(SessionPhase::Disconnected);
            return SessionOutcome {
                reason: CloseReason::Stopped,
                state,
                established: false,
            };
        }
    };

    match connected {
        Ok(transport) => run_session(ctx, state, transport, stop).await,
        Err(e) => {
            tracing::warn!(error = %e, "Gateway connection failed");
            state.set_phase(SessionPhase::Disconnected);
            ctx.set_phase(SessionPhase::Disconnected);
            SessionOutcome {
                reason: CloseReason::Transport(e.to_string()),
                state,
                established: false,
            }
        }
    }
}

fn ensure_credential(credential: &Credential) -> ClientResult<()> {
    if credential.is_blank() {
        return Err(ClientError::Bootstrap("credential is empty".to_string()));
    }
    Ok(())
}

/// Gateway URL with the encoding and version query the session expects
fn gateway_endpoint(base: &str, version: u8) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}encoding=json&v={version}")
}

/// Control surface for a running client
#[derive(Debug)]
pub struct GatewayHandle {
    stop: CancellationToken,
    status: watch::Receiver<SessionPhase>,
    outbound: Arc<RwLock<Option<Connection>>>,
    events: broadcast::Sender<ClientEvent>,
    task: Option<JoinHandle<ClientResult<()>>>,
}

impl GatewayHandle {
    /// Close the live session normally and stop reconnecting
    ///
    /// Idempotent; a retry already waiting is cancelled.
    pub fn stop(&self) {
        if !self.stop.is_cancelled() {
            tracing::info!("Stopping gateway client");
        }
        self.stop.cancel();
    }

    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Current session phase
    #[must_use]
    pub fn status(&self) -> SessionPhase {
        *self.status.borrow()
    }

    /// Receiver notified on every phase change
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<SessionPhase> {
        self.status.clone()
    }

    /// Subscribe to lifecycle events from now on
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Whether a session is connected and can take sends
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.outbound
            .read()
            .as_ref()
            .is_some_and(|connection| !connection.is_closed())
    }

    /// Send a client op with a raw payload on the live session
    ///
    /// # Errors
    /// Returns [`ClientError::NotConnected`] when no session is live, or
    /// [`ClientError::ProtocolViolation`] for an op only the gateway sends
    pub async fn send(&self, op: OpCode, payload: Value) -> ClientResult<()> {
        if !op.is_client_op() {
            return Err(ClientError::ProtocolViolation(format!(
                "{op} cannot be sent by a client"
            )));
        }
        self.send_envelope(Envelope::new(op, payload)).await
    }

    /// Send op 3 (Presence Update)
    ///
    /// # Errors
    /// Returns [`ClientError::NotConnected`] when no session is live, or
    /// [`ClientError::Internal`] if the payload does not serialize
    pub async fn update_presence(&self, presence: &PresenceUpdatePayload) -> ClientResult<()> {
        self.send_envelope(Envelope::presence_update(presence).map_err(ClientError::internal)?).await
    }

    /// Send op 8 (Request Guild Members)
    ///
    /// # Errors
    /// Returns [`ClientError::NotConnected`] when no session is live, or
    /// [`ClientError::Internal`] if the payload does not serialize
    pub async fn request_members(&self, request: &RequestMembersPayload) -> ClientResult<()> {
        self.send_envelope(Envelope::request_members(request).map_err(ClientError::internal)?).await
    }

    /// Send op 4 (Voice State Update)
    ///
    /// # Errors
    /// Returns [`ClientError::NotConnected`] when no session is live, or
    /// [`ClientError::Internal`] if the payload does not serialize
    pub async fn update_voice_state(&self, voice: &VoiceStateUpdatePayload) -> ClientResult<()> {
        self.send_envelope(Envelope::voice_state_update(voice).map_err(ClientError::internal)?).await
    }

    async fn send_envelope(&self, envelope: Envelope) -> ClientResult<()> {
        let connection = self.outbound.read().clone().ok_or(ClientError::NotConnected)?;
        tracing::debug!(envelope = %envelope, "Queueing client send");
        connection
            .send(envelope)
            .await
            .map_err(|_| ClientError::NotConnected)
    }

    /// Wait for the client to stop
    ///
    /// Resolves with `Ok` after [`stop`](Self::stop), or with the
    /// client-fatal error that ended it. Cancel safe; once resolved, later
    /// calls return `Ok` immediately.
    ///
    /// # Errors
    /// Returns the terminal error: authentication failure, a rejecting close
    /// code, or an exhausted retry budget
    pub async fn wait(&mut self) -> ClientResult<()> {
        let Some(task) = self.task.as_mut() else {
            return Ok(());
        };
        let result = task.await;
        self.task = None;
        result.map_err(ClientError::internal)?
    }

    /// Whether the client has stopped for good
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}
