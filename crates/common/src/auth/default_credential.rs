//! Ambient default bearer credential
//!
//! Requests built without consulting the credential store (e.g. by code that
//! talks to `HttpClient` directly) fall back to this value. The refresh
//! coordinator and the session service keep it in sync with the store.

use std::sync::Arc;

use parking_lot::RwLock;

/// Shared, cloneable handle to the default `Authorization` bearer token
#[derive(Clone, Default)]
pub struct DefaultCredential {
    token: Arc<RwLock<Option<String>>>,
}

impl DefaultCredential {
    /// Create an unset credential.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the token seen by every clone.
    pub fn set(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }

    /// Remove the token.
    pub fn clear(&self) {
        *self.token.write() = None;
    }

    /// Current raw token.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    /// Whether a token is present.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.token.read().is_some()
    }

    /// `Authorization` header value, e.g. `Bearer abc`.
    #[must_use]
    pub fn header_value(&self) -> Option<String> {
        self.token.read().as_ref().map(|token| bearer(token))
    }
}

impl std::fmt::Debug for DefaultCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultCredential").field("set", &self.is_set()).finish()
    }
}

/// Format a token as a bearer `Authorization` value.
#[must_use]
pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}
