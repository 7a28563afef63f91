//! Session-auth building blocks shared across ClinicFlow client crates.
//!
//! # Safety and Quality
//!
//! This crate enforces strict safety and quality standards to ensure
//! reliability across all ClinicFlow components.
//!
//! # Feature Tiers
//!
//! - `runtime` (default): credential store, refresh coordinator, auth ports
//! - `test-utils`: scripted mocks for the auth ports

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod auth;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(any(feature = "test-utils", test))]
pub mod testing;

#[cfg(feature = "runtime")]
pub use auth::{
    CredentialRecord, CredentialStore, DefaultCredential, RefreshCoordinator, RefreshError,
    RefreshTransport, SessionEvent, SlotStorage, StorageError,
};
