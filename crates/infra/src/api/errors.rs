//! API-specific error types
//!
//! Provides error classification for request pipeline failures.

use std::time::Duration;

use clinicflow_common::auth::RefreshError;
use clinicflow_domain::ClinicFlowError;
use thiserror::Error;

/// Categories of API errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiErrorCategory {
    /// Authentication errors (401, 403, failed refresh) - the session is gone
    Authentication,
    /// Rate limiting errors (429)
    RateLimit,
    /// Server errors (5xx)
    Server,
    /// Client errors (4xx except auth)
    Client,
    /// Network/connection errors
    Network,
    /// Configuration errors
    Config,
}

/// Request pipeline errors
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Token refresh failed; the session has been cleared
    #[error("Session refresh failed: {0}")]
    Refresh(#[from] RefreshError),

    /// The replay after a successful refresh was rejected again
    #[error("{method} {path} still unauthorized after token refresh")]
    AuthExhausted { method: String, path: String },

    #[error("{method} {path} returned status {status}: {message}")]
    Status { method: String, path: String, status: u16, message: String, body: String },

    #[error("{method} {path} failed: {message}")]
    Transport { method: String, path: String, message: String },

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Client error: {0}")]
    Client(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ApiError {
    /// Get the error category for this error
    pub fn category(&self) -> ApiErrorCategory {
        match self {
            Self::Refresh(_) | Self::AuthExhausted { .. } => ApiErrorCategory::Authentication,
            Self::Status { status, .. } => match status {
                401 | 403 => ApiErrorCategory::Authentication,
                429 => ApiErrorCategory::RateLimit,
                500..=599 => ApiErrorCategory::Server,
                _ => ApiErrorCategory::Client,
            },
            Self::Transport { .. } | Self::Timeout(_) => ApiErrorCategory::Network,
            Self::Client(_) => ApiErrorCategory::Client,
            Self::Config(_) => ApiErrorCategory::Config,
        }
    }

    /// HTTP status of the failed response, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::AuthExhausted { .. } => Some(401),
            _ => None,
        }
    }

    /// Whether the caller must send the user back to the login entry point.
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::Refresh(_))
    }
}

impl From<ClinicFlowError> for ApiError {
    fn from(err: ClinicFlowError) -> Self {
        match err {
            ClinicFlowError::Config(message) => Self::Config(message),
            other => Self::Client(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> ApiError {
        ApiError::Status {
            method: "GET".into(),
            path: "/patients".into(),
            status: code,
            message: "nope".into(),
            body: String::new(),
        }
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(status(401).category(), ApiErrorCategory::Authentication);
        assert_eq!(status(429).category(), ApiErrorCategory::RateLimit);
        assert_eq!(status(503).category(), ApiErrorCategory::Server);
        assert_eq!(status(422).category(), ApiErrorCategory::Client);
        assert_eq!(
            ApiError::Refresh(RefreshError::NoRefreshToken).category(),
            ApiErrorCategory::Authentication
        );
        assert_eq!(
            ApiError::Timeout(Duration::from_secs(1)).category(),
            ApiErrorCategory::Network
        );
    }

    #[test]
    fn test_only_refresh_failure_requires_login() {
        assert!(ApiError::from(RefreshError::Interrupted).requires_login());
        assert!(!ApiError::AuthExhausted { method: "GET".into(), path: "/x".into() }
            .requires_login());
        assert!(!status(401).requires_login());
    }

    #[test]
    fn test_status_display_includes_route() {
        assert_eq!(status(404).to_string(), "GET /patients returned status 404: nope");
        assert_eq!(status(404).status(), Some(404));
    }
}
