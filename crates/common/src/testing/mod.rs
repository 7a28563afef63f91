//! Testing utilities and helpers
//!
//! - **[`mocks`]**: Mock implementations of the auth ports
//!
//! Available to dependents through the `test-utils` feature.

pub mod mocks;

pub use mocks::{FailingSlotStorage, MockRefreshTransport, RefreshGate};
