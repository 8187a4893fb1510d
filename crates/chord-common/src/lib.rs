//! # chord-common
//!
//! Shared utilities including configuration, error handling, credentials, and telemetry.

pub mod auth;
pub mod config;
pub mod error;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use auth::Credential;
pub use config::{
    BackoffConfig, ClientConfig, ConfigError, CredentialConfig, GatewayConfig, HttpConfig,
};
pub use error::{ClientError, ClientResult};
pub use telemetry::{
    init_tracing, init_tracing_with_config, try_init_tracing, try_init_tracing_with_config,
    TracingConfig, TracingError,
};

/// Crate version reported in the User-Agent and IDENTIFY properties.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default User-Agent for HTTP and gateway requests.
#[must_use]
pub fn user_agent() -> String {
    format!("chord (https://github.com/maxpowa/chord {VERSION})")
}
