//! Session authentication for the API client
//!
//! This module owns the persisted credential record and the single-flight
//! refresh protocol that every request pipeline shares.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────┐
//! │ RefreshCoordinator │  Single-flight refresh + FIFO waiters
//! └─────────┬──────────┘
//!           │
//!           ├──► RefreshTransport   (POST /auth/refresh, provided by infra)
//!           ├──► DefaultCredential  (ambient Authorization header)
//!           └──► CredentialStore    (state.token / state.refresh_token)
//!                      │
//!                      └──► SlotStorage  (memory, file, keychain)
//! ```
//!
//! # Usage Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use clinicflow_common::auth::{
//!     CredentialStore, DefaultCredential, MemorySlotStorage, RefreshCoordinator,
//!     RefreshTransport,
//! };
//!
//! async fn fresh_token(transport: Arc<dyn RefreshTransport>) -> Option<String> {
//!     let store = Arc::new(CredentialStore::new(
//!         Arc::new(MemorySlotStorage::new()),
//!         "auth-storage",
//!     ));
//!     let coordinator = RefreshCoordinator::new(store, transport, DefaultCredential::new());
//!     coordinator.ensure_fresh_token().await.ok()
//! }
//! ```
//!
//! # Module Organization
//!
//! - **[`types`]**: `CredentialRecord`, `RefreshPhase`, `SessionEvent`
//! - **[`traits`]**: `SlotStorage` and `RefreshTransport` ports
//! - **[`credential_store`]**: Merge-preserving access to the persisted slot
//! - **[`coordinator`]**: The refresh state machine

pub mod coordinator;
pub mod credential_store;
pub mod default_credential;
pub mod errors;
pub mod storage;
pub mod traits;
pub mod types;

pub use coordinator::RefreshCoordinator;
pub use credential_store::CredentialStore;
pub use default_credential::{bearer, DefaultCredential};
pub use errors::{RefreshError, StorageError};
pub use storage::MemorySlotStorage;
pub use traits::{RefreshTransport, SlotStorage};
pub use types::{CredentialRecord, RefreshPhase, SessionEvent};
