//! Test helpers for integration tests
//!
//! Provides a client wired to the in-memory transport, a peer that plays
//! the gateway side, and a mock HTTP API for bootstrap tests.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chord_common::{ClientConfig, Credential};
use chord_gateway::connection::{MemoryAcceptor, MemoryConnector, MemoryPeer};
use chord_gateway::protocol::{Envelope, OpCode};
use chord_gateway::{ClientEvent, GatewayClient, GatewayHandle, SessionPhase};
use serde_json::Value;
use tokio::sync::broadcast;
use wiremock::MockServer;

use crate::fixtures::{ready_payload, resumed_payload, TEST_TOKEN};

/// URL handed to the in-memory connector
pub const MEMORY_URL: &str = "memory://gateway";

/// How long a helper waits before failing a test
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(120);

/// Client over the in-memory transport, plus the acceptor for its peers
pub struct TestGateway {
    pub client: GatewayClient,
    pub connector: MemoryConnector,
    pub acceptor: MemoryAcceptor,
}

impl TestGateway {
    /// Client with default configuration
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Client with custom configuration
    pub fn with_config(config: ClientConfig) -> Self {
        let (connector, acceptor) = MemoryConnector::new();
        let client = GatewayClient::with_connector(config, connector.clone());
        Self {
            client,
            connector,
            acceptor,
        }
    }

    /// Start the client against the in-memory gateway
    pub fn start(&self) -> Result<GatewayHandle> {
        Ok(self
            .client
            .connect_to(Credential::new(TEST_TOKEN), MEMORY_URL)?)
    }

    /// Next connection the client opens
    pub async fn accept(&mut self) -> Result<MemoryPeer> {
        tokio::time::timeout(WAIT_TIMEOUT, self.acceptor.accept())
            .await
            .context("timed out waiting for a connection")?
            .ok_or_else(|| anyhow!("connector dropped"))
    }

    /// Accept a connection and complete IDENTIFY → READY on it
    pub async fn accept_ready(
        &mut self,
        handle: &GatewayHandle,
        session_id: &str,
        interval_ms: u64,
    ) -> Result<MemoryPeer> {
        let mut peer = self.accept().await?;
        expect_op(&mut peer, OpCode::Identify).await?;
        send_ready(&peer, 1, session_id, interval_ms);
        wait_for_phase(handle, SessionPhase::Steady).await?;
        Ok(peer)
    }
}

impl Default for TestGateway {
    fn default() -> Self {
        Self::new()
    }
}

/// Next envelope from the client, which must carry `op`
pub async fn expect_op(peer: &mut MemoryPeer, op: OpCode) -> Result<Envelope> {
    let envelope = tokio::time::timeout(WAIT_TIMEOUT, peer.recv_envelope())
        .await
        .context("timed out waiting for an envelope")?
        .ok_or_else(|| anyhow!("client closed while waiting for {op}"))?;

    if envelope.opcode() != Some(op) {
        return Err(anyhow!("expected {op}, got {envelope}"));
    }
    Ok(envelope)
}

/// Send READY as dispatch `seq`
pub fn send_ready(peer: &MemoryPeer, seq: u64, session_id: &str, interval_ms: u64) {
    peer.send_envelope(&Envelope::dispatch(
        "READY",
        seq,
        ready_payload(session_id, interval_ms),
    ));
}

/// Send RESUMED as dispatch `seq`
pub fn send_resumed(peer: &MemoryPeer, seq: u64, interval_ms: u64) {
    peer.send_envelope(&Envelope::dispatch("RESUMED", seq, resumed_payload(interval_ms)));
}

/// Send an application dispatch
pub fn send_dispatch(peer: &MemoryPeer, name: &str, seq: u64, payload: Value) {
    peer.send_envelope(&Envelope::dispatch(name, seq, payload));
}

/// Wait until the client reports `phase`
pub async fn wait_for_phase(handle: &GatewayHandle, phase: SessionPhase) -> Result<()> {
    let mut status = handle.watch_status();
    tokio::time::timeout(WAIT_TIMEOUT, status.wait_for(|current| *current == phase))
        .await
        .with_context(|| format!("timed out waiting for phase {phase}"))?
        .context("client dropped its status")?;
    Ok(())
}

/// Next lifecycle event matching `predicate`, skipping the rest
pub async fn next_event<F>(events: &mut broadcast::Receiver<ClientEvent>, predicate: F) -> Result<ClientEvent>
where
    F: Fn(&ClientEvent) -> bool,
{
    tokio::time::timeout(WAIT_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return Ok(event),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(anyhow!("event channel closed"));
                }
            }
        }
    })
    .await
    .context("timed out waiting for a lifecycle event")?
}

/// Mock REST API for bootstrap tests
pub struct MockApi {
    pub server: MockServer,
}

impl MockApi {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Client configuration pointing HTTP bootstrap at the mock server
    pub fn config(&self) -> ClientConfig {
        let mut config = ClientConfig::default();
        config.http.api_base_url = self.server.uri();
        config
    }
}
