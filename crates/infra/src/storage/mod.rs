//! Persistent backends for the credential slot
//!
//! Each backend implements the synchronous `SlotStorage` port from
//! `clinicflow-common`. [`build_slot_storage`] picks one from configuration.

pub mod file;
pub mod keychain;

use std::path::PathBuf;
use std::sync::Arc;

use clinicflow_common::auth::{MemorySlotStorage, SlotStorage};
use clinicflow_domain::constants::STORAGE_DIR_NAME;
use clinicflow_domain::{StorageBackend, StorageConfig};
use tracing::info;

pub use file::FileSlotStorage;
pub use keychain::KeychainSlotStorage;

/// Instantiate the configured slot backend.
pub fn build_slot_storage(config: &StorageConfig) -> Arc<dyn SlotStorage> {
    info!(backend = ?config.backend, key = %config.key, "Using credential slot storage");

    match config.backend {
        StorageBackend::Memory => Arc::new(MemorySlotStorage::new()),
        StorageBackend::File => {
            let directory = config.directory.clone().unwrap_or_else(default_storage_dir);
            Arc::new(FileSlotStorage::new(directory))
        }
        StorageBackend::Keychain => {
            Arc::new(KeychainSlotStorage::new(config.keychain_service.clone()))
        }
    }
}

/// `$HOME/.clinicflow`, or a directory under the system temp dir when no
/// home directory is known.
pub fn default_storage_dir() -> PathBuf {
    match std::env::var_os("HOME").filter(|home| !home.is_empty()) {
        Some(home) => PathBuf::from(home).join(format!(".{STORAGE_DIR_NAME}")),
        None => std::env::temp_dir().join(STORAGE_DIR_NAME),
    }
}
