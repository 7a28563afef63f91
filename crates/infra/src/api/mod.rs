//! ClinicFlow API client
//!
//! This module provides the session-aware request pipeline used by every
//! feature that talks to the ClinicFlow API.
//!
//! # Architecture
//!
//! - Uses the shared `HttpClient` (no direct reqwest in callers)
//! - Bearer token from the credential store on every request
//! - One shared token refresh per burst of `401`s, one replay per request
//! - Structured tracing for every failure before it is returned

pub mod auth;
pub mod client;
pub mod errors;
pub mod request;

pub use auth::{AuthSession, HttpRefreshTransport, LoginResponse};
pub use client::{ApiClient, ApiClientBuilder};
pub use errors::{ApiError, ApiErrorCategory};
pub use request::{ApiRequest, ApiResponse, RequestAttempt};
