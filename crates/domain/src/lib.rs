//! # ClinicFlow Domain
//!
//! Domain types shared by the ClinicFlow client crates.
//!
//! This crate contains:
//! - Domain error type and Result definition
//! - Client configuration structures
//! - API and session constants
//!
//! ## Architecture
//! - No dependencies on other ClinicFlow crates
//! - Only external dependencies allowed
//! - Pure data structures, no I/O

pub mod config;
pub mod constants;
pub mod errors;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
