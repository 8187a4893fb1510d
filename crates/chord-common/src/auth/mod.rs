//! Authentication credentials

mod credential;

pub use credential::Credential;
