//! Traits for credential persistence and the refresh round trip
//!
//! These traits enable dependency injection and testing by abstracting
//! external dependencies (the persisted client-side slot, the refresh
//! endpoint).

use async_trait::async_trait;

use super::errors::{RefreshError, StorageError};

/// Persisted key-value slot backend
///
/// Values are opaque serialized strings. Implementations must be cheap and
/// synchronous; they are called while the credential store holds its lock.
pub trait SlotStorage: Send + Sync {
    /// Read the value stored under `key`, `Ok(None)` when absent
    ///
    /// # Errors
    /// Returns error if the backend cannot be read
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace the value stored under `key`
    ///
    /// # Errors
    /// Returns error if the backend cannot be written
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key` (idempotent)
    ///
    /// # Errors
    /// Returns error if the backend rejects the deletion
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Round trip to the token refresh endpoint
///
/// Implementations must not go through the request pipeline: a refresh that
/// itself triggered 401 handling would recurse.
#[async_trait]
pub trait RefreshTransport: Send + Sync {
    /// Exchange a refresh token for a new access token
    ///
    /// # Arguments
    /// * `refresh_token` - Presented as the bearer credential
    ///
    /// # Errors
    /// Returns `Rejected` for non-2xx answers, `Malformed` when the body
    /// carries no access token, `Transport` when the endpoint is unreachable
    async fn refresh(&self, refresh_token: &str) -> Result<String, RefreshError>;
}
