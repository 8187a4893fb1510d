//! # chord-http
//!
//! HTTP bootstrap for the gateway: exchanges credentials for a token,
//! resolves the gateway endpoint, and probes token validity.

mod client;
mod error;
mod models;

pub use client::RestClient;
pub use error::{HttpError, HttpResult};
pub use models::{CurrentUser, GatewayResponse, LoginRequest, LoginResponse};
