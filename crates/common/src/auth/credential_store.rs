//! Credential store over the persisted client-side slot
//!
//! The slot holds a JSON document shaped like
//!
//! ```json
//! { "state": { "token": "...", "refresh_token": "...", "user": { } }, "version": 0 }
//! ```
//!
//! `state.token`, `state.refresh_token` and the `state.user` profile belong
//! to this store. Every other field, inside `state` or next to it, is owned
//! by other parts of the application and is written back untouched.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::errors::StorageError;
use super::traits::SlotStorage;
use super::types::CredentialRecord;

const STATE_FIELD: &str = "state";
const ACCESS_FIELD: &str = "token";
const REFRESH_FIELD: &str = "refresh_token";
const USER_FIELD: &str = "user";

/// Sole authority over the persisted credential record
pub struct CredentialStore {
    storage: Arc<dyn SlotStorage>,
    key: String,
    // Serializes read-modify-write sequences on the slot.
    lock: Mutex<()>,
    generation: AtomicU64,
}

impl CredentialStore {
    /// Create a store over `storage`, using `key` as the slot name
    pub fn new(storage: Arc<dyn SlotStorage>, key: impl Into<String>) -> Self {
        Self { storage, key: key.into(), lock: Mutex::new(()), generation: AtomicU64::new(0) }
    }

    /// Slot key this store reads and writes.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read the current record
    ///
    /// Never fails: a missing slot yields an empty record, and a malformed
    /// slot is wiped before an empty record is returned.
    #[must_use]
    pub fn read(&self) -> CredentialRecord {
        let _guard = self.lock.lock();

        let raw = match self.storage.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return CredentialRecord::default(),
            Err(err) => {
                warn!(key = %self.key, error = %err, "Credential slot unreadable; treating as empty");
                return CredentialRecord::default();
            }
        };

        match parse_document(&raw) {
            Ok(document) => record_from(&document),
            Err(reason) => {
                warn!(key = %self.key, %reason, "Discarding malformed credential slot");
                if let Err(err) = self.storage.remove(&self.key) {
                    warn!(key = %self.key, error = %err, "Failed to wipe malformed credential slot");
                }
                CredentialRecord::default()
            }
        }
    }

    /// Current access token, if any.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.read().access_token
    }

    /// Current refresh token, if any.
    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.read().refresh_token
    }

    /// Merge `record` into the persisted slot
    ///
    /// Fields set to `Some` replace the stored value; `None` fields keep
    /// whatever is stored. Unrelated fields are preserved. A record carrying
    /// a refresh token starts a new session generation.
    ///
    /// # Errors
    /// Returns error if the backend cannot be read or written
    pub fn write(&self, record: &CredentialRecord) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        self.merge_tokens(record)?;
        if record.refresh_token.is_some() {
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Replace only the access token.
    ///
    /// # Errors
    /// Returns error if the backend cannot be read or written
    pub fn set_access_token(&self, token: &str) -> Result<(), StorageError> {
        self.write(&CredentialRecord::access_only(token))
    }

    /// Replace the access token only if the session is still `generation`
    ///
    /// Returns `Ok(false)` without touching the slot when the session was
    /// cleared or replaced since `generation` was read.
    ///
    /// # Errors
    /// Returns error if the backend cannot be read or written
    pub fn set_access_token_if_current(
        &self,
        generation: u64,
        token: &str,
    ) -> Result<bool, StorageError> {
        let _guard = self.lock.lock();
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(key = %self.key, "Session changed during refresh; dropping new token");
            return Ok(false);
        }
        self.merge_tokens(&CredentialRecord::access_only(token))?;
        Ok(true)
    }

    /// Session generation; changes on every login and every clear.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Persist the user profile next to the tokens (`state.user`).
    ///
    /// # Errors
    /// Returns error if the backend cannot be read or written
    pub fn write_user(&self, user: &Value) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        self.merge_state(|state| {
            state.insert(USER_FIELD.to_string(), user.clone());
        })
    }

    /// Persisted user profile, if any.
    #[must_use]
    pub fn user(&self) -> Option<Value> {
        let _guard = self.lock.lock();
        let raw = self.storage.get(&self.key).ok().flatten()?;
        let document = parse_document(&raw).ok()?;
        document
            .get(STATE_FIELD)
            .and_then(|state| state.get(USER_FIELD))
            .filter(|user| !user.is_null())
            .cloned()
    }

    /// Remove the persisted slot entirely
    ///
    /// # Errors
    /// Returns error if the backend rejects the deletion
    pub fn clear(&self) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.storage.remove(&self.key)?;
        debug!(key = %self.key, "Credential slot cleared");
        Ok(())
    }

    // Caller holds `self.lock`.
    fn merge_tokens(&self, record: &CredentialRecord) -> Result<(), StorageError> {
        self.merge_state(|state| {
            if let Some(token) = &record.access_token {
                state.insert(ACCESS_FIELD.to_string(), Value::String(token.clone()));
            }
            if let Some(token) = &record.refresh_token {
                state.insert(REFRESH_FIELD.to_string(), Value::String(token.clone()));
            }
        })?;

        debug!(
            key = %self.key,
            access_updated = record.access_token.is_some(),
            refresh_updated = record.refresh_token.is_some(),
            "Credential slot updated"
        );
        Ok(())
    }

    // Caller holds `self.lock`.
    fn merge_state(
        &self,
        update: impl FnOnce(&mut Map<String, Value>),
    ) -> Result<(), StorageError> {
        let mut document = match self.storage.get(&self.key)? {
            Some(raw) => parse_document(&raw).unwrap_or_else(|reason| {
                debug!(key = %self.key, %reason, "Replacing malformed credential slot on write");
                Map::new()
            }),
            None => Map::new(),
        };

        let state = document
            .entry(STATE_FIELD)
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(state) = state {
            update(state);
        }

        let serialized = serde_json::to_string(&Value::Object(document))?;
        self.storage.set(&self.key, &serialized)
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore").field("key", &self.key).finish_non_exhaustive()
    }
}

fn parse_document(raw: &str) -> Result<Map<String, Value>, String> {
    let value: Value = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    let Value::Object(document) = value else {
        return Err("slot is not a JSON object".to_string());
    };
    match document.get(STATE_FIELD) {
        None | Some(Value::Object(_)) => Ok(document),
        Some(_) => Err("`state` is not a JSON object".to_string()),
    }
}

// Empty strings count as absent, matching how the tokens are produced and
// cleared by the login flow.
fn record_from(document: &Map<String, Value>) -> CredentialRecord {
    let field = |name: &str| {
        document
            .get(STATE_FIELD)
            .and_then(|state| state.get(name))
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
    };

    CredentialRecord { access_token: field(ACCESS_FIELD), refresh_token: field(REFRESH_FIELD) }
}
