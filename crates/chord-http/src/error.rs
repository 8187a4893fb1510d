//! HTTP error types

use chord_common::ClientError;
use thiserror::Error;

/// HTTP bootstrap error type
#[derive(Debug, Error)]
pub enum HttpError {
    /// The login endpoint refused the email/password pair (400/401)
    #[error("Unauthorized login, maybe incorrect email/password combination? ({status})")]
    InvalidCredentials { status: u16 },

    /// A 200 login response without a `token` field
    #[error("Login response did not contain a token")]
    MissingToken,

    /// Gateway discovery or token probe returned a non-200 status
    #[error("Bootstrap request to {endpoint} failed ({status})")]
    Bootstrap { endpoint: &'static str, status: u16 },

    /// 429 from an authenticated request
    #[error("Rate limited (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<f64> },

    /// 4xx from an authenticated request
    #[error("Request rejected ({status}): {body}")]
    RequestRejected { status: u16, body: String },

    /// Any other non-2xx status
    #[error("Unexpected response from server ({status})")]
    UnexpectedResponse { status: u16 },

    /// Connection, TLS, timeout, or body decoding failure
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl HttpError {
    /// HTTP status code carried by this error, if any
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::InvalidCredentials { status }
            | Self::Bootstrap { status, .. }
            | Self::RequestRejected { status, .. }
            | Self::UnexpectedResponse { status } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            Self::MissingToken => None,
            Self::Request(e) => e.status().map(|s| s.as_u16()),
        }
    }
}

impl From<HttpError> for ClientError {
    fn from(err: HttpError) -> Self {
        Self::Bootstrap(err.to_string())
    }
}

/// Result type alias for HTTP operations
pub type HttpResult<T> = Result<T, HttpError>;
