//! Gateway client demo
//!
//! Run with:
//! ```bash
//! CHORD_TOKEN=... cargo run -p chord-gateway
//! ```
//!
//! Configuration is loaded from environment variables. Set
//! `CHORD_LOG_FORMAT=json` for JSON log lines.

use chord_common::{try_init_tracing_with_config, ClientConfig, TracingConfig};
use chord_gateway::{ClientEvent, GatewayClient};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let tracing_config = match std::env::var("CHORD_LOG_FORMAT").as_deref() {
        Ok("json") => TracingConfig::production(),
        _ => TracingConfig::default(),
    };
    if let Err(e) = try_init_tracing_with_config(tracing_config) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    if let Err(e) = run().await {
        error!(error = %e, "Gateway client failed");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    info!("Starting chord gateway client...");

    // Load configuration
    let config = ClientConfig::from_env().map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;

    info!(
        api = %config.http.api_base_url,
        version = config.gateway.version,
        "Configuration loaded"
    );

    let client = GatewayClient::new(config);
    client
        .on("READY", |event| async move {
            let user = event.payload["user"]["username"].as_str().unwrap_or("<unknown>").to_string();
            info!(session_id = ?event.session.session_id, user = %user, "Gateway ready");
        })
        .on("MESSAGE_CREATE", |event| async move {
            let author = event.payload["author"]["username"].as_str().unwrap_or("<unknown>");
            let content = event.payload["content"].as_str().unwrap_or_default();
            info!(seq = ?event.sequence, author = %author, content = %content, "Message");
        });

    let credential = client.configured_credential().await?;
    let mut handle = client.connect(credential).await?;

    let mut events = handle.events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match &event {
                ClientEvent::Disconnected { .. } | ClientEvent::RetryScheduled { .. } => {
                    warn!(event = %event, "Gateway lifecycle");
                }
                ClientEvent::UnhandledEvent { .. } => {}
                _ => info!(event = %event, "Gateway lifecycle"),
            }
        }
    });

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Ctrl-C received, closing session");
        }
        // Only resolves early on a client-fatal error
        result = handle.wait() => return Ok(result?),
    }

    handle.stop();
    handle.wait().await?;
    info!("Gateway client stopped");

    Ok(())
}
