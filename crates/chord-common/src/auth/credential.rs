//! Gateway authentication credential

use std::fmt;
use std::sync::Arc;

/// Opaque auth token supplied by the caller
///
/// Immutable once constructed and cheap to clone. `Debug` and `Display`
/// never print the token itself.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    auth_token: Arc<str>,
}

impl Credential {
    /// Wrap a raw auth token
    #[must_use]
    pub fn new(auth_token: impl Into<String>) -> Self {
        Self {
            auth_token: Arc::from(auth_token.into()),
        }
    }

    /// The raw token, for placing on the wire or in an `Authorization` header
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.auth_token
    }

    /// Whether the token is empty or whitespace
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.auth_token.trim().is_empty()
    }

    /// Short, non-reversible hint suitable for logs
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let tail: String = self
            .auth_token
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("…{tail} ({} chars)", self.auth_token.chars().count())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("auth_token", &"<redacted>")
            .finish()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted credential>")
    }
}

impl From<String> for Credential {
    fn from(token: String) -> Self {
        Self::new(token)
    }
}

impl From<&str> for Credential {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}
