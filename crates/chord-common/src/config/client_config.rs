//! Client configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file if present).

use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Main client configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(default)]
    pub credentials: CredentialConfig,
}

/// HTTP bootstrap configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "crate::user_agent")]
    pub user_agent: String,
}

impl HttpConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            timeout_secs: default_http_timeout_secs(),
            user_agent: crate::user_agent(),
        }
    }
}

/// Gateway session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Gateway protocol version requested when resolving the endpoint (`v=` query)
    #[serde(default = "default_gateway_version")]
    pub version: u8,
    /// Protocol version sent inside IDENTIFY (`v`)
    #[serde(default = "default_identify_version")]
    pub identify_version: u8,
    #[serde(default = "default_large_threshold")]
    pub large_threshold: u32,
    #[serde(default = "default_compress")]
    pub compress: bool,
    /// Name reported as `$browser` and `$device`
    #[serde(default = "default_client_name")]
    pub client_name: String,
    /// Hard ceiling for a decompressed inbound frame
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
    /// Silence longer than this many heartbeat intervals forces a reconnect
    #[serde(default = "default_heartbeat_timeout_factor")]
    pub heartbeat_timeout_factor: u32,
    /// Capacity of the single-writer outbound queue
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            version: default_gateway_version(),
            identify_version: default_identify_version(),
            large_threshold: default_large_threshold(),
            compress: default_compress(),
            client_name: default_client_name(),
            max_payload_bytes: default_max_payload_bytes(),
            heartbeat_timeout_factor: default_heartbeat_timeout_factor(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

/// Reconnect backoff configuration
///
/// Only the delay bounds and retry budget are configurable; the growth
/// multiplier and jitter fraction are fixed.
#[derive(Debug, Clone, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_backoff_initial_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub max_delay_ms: u64,
    /// Maximum consecutive failed attempts; `None` retries forever
    #[serde(default)]
    pub retry_budget: Option<u32>,
}

impl BackoffConfig {
    #[must_use]
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    #[must_use]
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_backoff_initial_ms(),
            max_delay_ms: default_backoff_max_ms(),
            retry_budget: None,
        }
    }
}

/// Credentials read from the environment
///
/// Either a token or an email/password pair for the login endpoint.
#[derive(Clone, Default, Deserialize)]
pub struct CredentialConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl std::fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialConfig")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

// Default value functions
fn default_api_base_url() -> String {
    "https://discordapp.com/api".to_string()
}

fn default_http_timeout_secs() -> u64 {
    10
}

fn default_gateway_version() -> u8 {
    4
}

fn default_identify_version() -> u8 {
    3
}

fn default_large_threshold() -> u32 {
    250
}

fn default_compress() -> bool {
    true
}

fn default_client_name() -> String {
    "chord".to_string()
}

fn default_max_payload_bytes() -> usize {
    10 * 1024 * 1024 // 10 MiB
}

fn default_heartbeat_timeout_factor() -> u32 {
    2
}

fn default_outbound_buffer() -> usize {
    64
}

fn default_backoff_initial_ms() -> u64 {
    1_000
}

fn default_backoff_max_ms() -> u64 {
    3_600_000 // 1 hour
}

/// Parse an optional environment variable, keeping `default` when unset
fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name, raw)),
        Err(_) => Ok(default),
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|s| !s.trim().is_empty())
}

impl ClientConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if a variable is set to a value that cannot be parsed
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Ok(Self {
            http: HttpConfig {
                api_base_url: env::var("CHORD_API_BASE_URL")
                    .map(|s| s.trim_end_matches('/').to_string())
                    .unwrap_or_else(|_| default_api_base_url()),
                timeout_secs: parse_var("CHORD_HTTP_TIMEOUT_SECS", default_http_timeout_secs())?,
                user_agent: env::var("CHORD_USER_AGENT").unwrap_or_else(|_| crate::user_agent()),
            },
            gateway: GatewayConfig {
                version: parse_var("CHORD_GATEWAY_VERSION", default_gateway_version())?,
                identify_version: parse_var("CHORD_IDENTIFY_VERSION", default_identify_version())?,
                large_threshold: parse_var("CHORD_LARGE_THRESHOLD", default_large_threshold())?,
                compress: parse_var("CHORD_COMPRESS", default_compress())?,
                client_name: env::var("CHORD_CLIENT_NAME").unwrap_or_else(|_| default_client_name()),
                max_payload_bytes: parse_var("CHORD_MAX_PAYLOAD_BYTES", default_max_payload_bytes())?,
                heartbeat_timeout_factor: parse_var(
                    "CHORD_HEARTBEAT_TIMEOUT_FACTOR",
                    default_heartbeat_timeout_factor(),
                )?,
                outbound_buffer: parse_var("CHORD_OUTBOUND_BUFFER", default_outbound_buffer())?,
            },
            backoff: BackoffConfig {
                initial_delay_ms: parse_var("CHORD_BACKOFF_INITIAL_MS", default_backoff_initial_ms())?,
                max_delay_ms: parse_var("CHORD_BACKOFF_MAX_MS", default_backoff_max_ms())?,
                retry_budget: match non_empty_var("CHORD_RETRY_BUDGET") {
                    Some(raw) => Some(
                        raw.trim()
                            .parse()
                            .map_err(|_| ConfigError::InvalidValue("CHORD_RETRY_BUDGET", raw))?,
                    ),
                    None => None,
                },
            },
            credentials: CredentialConfig {
                token: non_empty_var("CHORD_TOKEN"),
                email: non_empty_var("CHORD_EMAIL"),
                password: non_empty_var("CHORD_PASSWORD"),
            },
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
