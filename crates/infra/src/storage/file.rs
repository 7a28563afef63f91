//! File-backed slot storage
//!
//! One JSON document per slot key, stored as `<directory>/<key>.json`.
//! Writes go to a temporary sibling first and are renamed into place, so a
//! crash never leaves a half-written slot behind.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use clinicflow_common::auth::{SlotStorage, StorageError};
use tracing::debug;

use crate::errors::InfraError;

#[derive(Debug, Clone)]
pub struct FileSlotStorage {
    directory: PathBuf,
}

impl FileSlotStorage {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self { directory: directory.into() }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// File holding `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.directory.join(format!("{}.json", file_stem(key)))
    }
}

impl SlotStorage for FileSlotStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(InfraError::from(err).into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.directory).map_err(InfraError::from)?;

        let path = self.path_for(key);
        let staging = self.directory.join(format!(".{}.json.tmp", file_stem(key)));
        fs::write(&staging, value).map_err(InfraError::from)?;
        fs::rename(&staging, &path).map_err(InfraError::from)?;

        debug!(path = %path.display(), "Slot written");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(InfraError::from(err).into()),
        }
    }
}

// Keys are application-chosen names; anything outside [A-Za-z0-9_-] becomes
// `_` so a key can never escape the directory.
fn file_stem(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
