//! Error types for credential storage and token refresh

use thiserror::Error;

/// Failure of a refresh cycle.
///
/// The same value is delivered to the driver and to every waiter of the
/// cycle, so it is `Clone` and carries only owned strings. Routing treats all
/// variants alike; the distinction exists for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    /// Refresh requested while no refresh token is stored
    #[error("No refresh token available")]
    NoRefreshToken,

    /// Refresh endpoint answered with a non-success status
    #[error("Refresh rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// Refresh endpoint answered 2xx without a usable access token
    #[error("Malformed refresh response: {0}")]
    Malformed(String),

    /// Refresh endpoint could not be reached
    #[error("Refresh transport error: {0}")]
    Transport(String),

    /// New token could not be persisted
    #[error("Failed to persist refreshed token: {0}")]
    Storage(String),

    /// The driving caller went away before the cycle settled
    #[error("Token refresh was interrupted")]
    Interrupted,
}

impl RefreshError {
    /// Short machine-readable label for log fields.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoRefreshToken => "no_refresh_token",
            Self::Rejected { .. } => "refresh_rejected",
            Self::Malformed(_) => "refresh_malformed",
            Self::Transport(_) => "transport_error",
            Self::Storage(_) => "storage_error",
            Self::Interrupted => "interrupted",
        }
    }
}

/// Failure of the persisted slot backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Storage serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<StorageError> for RefreshError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}
