//! # ClinicFlow Infrastructure
//!
//! Infrastructure implementations of the session-auth ports.
//!
//! This crate contains:
//! - HTTP client implementation with retry and the ambient credential
//! - The session-aware API request pipeline and login/logout flows
//! - Credential slot backends (file, platform keychain)
//! - Configuration loading and tracing setup
//!
//! ## Architecture
//! - Implements traits defined in `clinicflow-common`
//! - Depends on `clinicflow-domain` and `clinicflow-common`
//! - Contains all "impure" code (network, filesystem, keychain)

pub mod api;
pub mod config;
pub mod errors;
pub mod http;
pub mod observability;
pub mod storage;

// Re-export commonly used items
pub use api::{ApiClient, ApiError, ApiRequest, ApiResponse, AuthSession, HttpRefreshTransport};
pub use errors::InfraError;
pub use http::HttpClient;
pub use storage::build_slot_storage;
