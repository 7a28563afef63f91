//! Credential and session types

use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::RefreshError;

/// Access and refresh tokens held by the credential store
///
/// Both fields are optional: an empty record means "not authenticated".
/// When passed to [`CredentialStore::write`](super::CredentialStore::write),
/// `None` means "leave the stored value as it is", not "erase it".
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Short-lived bearer token attached to API requests
    pub access_token: Option<String>,

    /// Long-lived token used only against the refresh endpoint
    pub refresh_token: Option<String>,
}

impl CredentialRecord {
    #[must_use]
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self { access_token: Some(access_token.into()), refresh_token: Some(refresh_token.into()) }
    }

    /// Record that only updates the access token.
    #[must_use]
    pub fn access_only(access_token: impl Into<String>) -> Self {
        Self { access_token: Some(access_token.into()), refresh_token: None }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

// Tokens never reach log output.
impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Phase of the refresh coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    Refreshing,
}

/// Session lifecycle notifications for the hosting application
///
/// `LoginRequired` is the signal to present the login entry point; it is
/// fire-and-forget and nobody waits on its handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn,
    TokenRefreshed,
    LoginRequired { reason: RefreshError },
    LoggedOut,
}
