//! Keychain-backed slot storage
//!
//! Stores each slot as a generic password in the platform keychain (macOS
//! Keychain Access, Windows Credential Manager, Linux Secret Service), with
//! the slot key as the account name.

use clinicflow_common::auth::{SlotStorage, StorageError};
use keyring::Entry;
use tracing::debug;

use crate::errors::InfraError;

pub struct KeychainSlotStorage {
    service_name: String,
}

impl KeychainSlotStorage {
    /// Create storage for a keychain service (e.g. "ClinicFlow")
    pub fn new(service_name: impl Into<String>) -> Self {
        Self { service_name: service_name.into() }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    fn entry(&self, key: &str) -> Result<Entry, StorageError> {
        Entry::new(&self.service_name, key).map_err(|e| InfraError::from(e).into())
    }
}

impl SlotStorage for KeychainSlotStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(InfraError::from(err).into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entry(key)?.set_password(value).map_err(InfraError::from)?;
        debug!(service = %self.service_name, key = %key, "Slot stored in keychain");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(InfraError::from(err).into()),
        }
    }
}

impl std::fmt::Debug for KeychainSlotStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeychainSlotStorage").field("service_name", &self.service_name).finish()
    }
}
