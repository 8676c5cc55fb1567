//! Encrypted single-slot license store with atomic writes.
//!
//! Holds exactly one license blob at a fixed path. Writes go to a temp file that is
//! renamed over the target, so readers see either the old blob or the new one.
//! A store-scoped lock serializes every `save` and `load`.

use crate::crypto::cipher::{open, seal, EncryptedBlob};
use crate::crypto::keystore::{write_private, KeyStore};
use crate::protocol::models::LicenseRecord;
use crate::AnvarError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Encrypted license file backend.
pub struct LicenseStore {
    /// Path of the encrypted license blob.
    path: PathBuf,
    /// Source of the encryption key.
    keys: Arc<KeyStore>,
    /// Serializes file access within the process.
    lock: Mutex<()>,
}

impl LicenseStore {
    /// Create a store for the blob at `path`, encrypted with keys from `keys`.
    pub fn new(path: impl Into<PathBuf>, keys: Arc<KeyStore>) -> Self {
        Self {
            path: path.into(),
            keys,
            lock: Mutex::new(()),
        }
    }

    /// Path of the license blob.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>, AnvarError> {
        self.lock
            .lock()
            .map_err(|_| AnvarError::StorageFailure("License store lock poisoned".to_string()))
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Encrypt and persist `record`, fully replacing any previous blob.
    pub fn save(&self, record: &LicenseRecord) -> Result<(), AnvarError> {
        let _guard = self.guard()?;

        let plaintext = record.to_vec()?;
        let key = self.keys.get_key()?;
        let stored = seal(key, &plaintext)?.encode();

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AnvarError::StorageFailure(format!("Failed to create license dir: {}", e))
            })?;
        }

        let temp_path = self.temp_path();
        // A temp file left by a crashed write would make create_new fail.
        match fs::remove_file(&temp_path) {
            Ok(()) => debug!(path = %temp_path.display(), "Removed stale temp file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(AnvarError::StorageFailure(format!(
                    "Failed to remove stale temp file: {}",
                    e
                )))
            }
        }

        write_private(&temp_path, &stored).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            AnvarError::StorageFailure(format!("Failed to write temp file: {}", e))
        })?;

        fs::rename(&temp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            AnvarError::StorageFailure(format!("Failed to rename license file: {}", e))
        })?;

        debug!(path = %self.path.display(), "Saved license");
        Ok(())
    }

    /// Load and decrypt the license, or `None` if no blob exists.
    ///
    /// A blob that fails to decrypt is reported as `DecryptionFailure`, never as absent.
    pub fn load(&self) -> Result<Option<LicenseRecord>, AnvarError> {
        let _guard = self.guard()?;

        let stored = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AnvarError::StorageFailure(format!(
                    "Failed to read license file: {}",
                    e
                )))
            }
        };

        let key = self.keys.get_key()?;
        let blob = EncryptedBlob::decode(&stored)?;
        let plaintext = open(key, &blob)?;

        // Authenticated but unparseable plaintext is still corruption from our side.
        let record =
            LicenseRecord::from_slice(&plaintext).map_err(|_| AnvarError::DecryptionFailure)?;
        Ok(Some(record))
    }

    /// Remove the license blob if present.
    pub fn clear(&self) -> Result<(), AnvarError> {
        let _guard = self.guard()?;

        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AnvarError::StorageFailure(format!(
                "Failed to delete license file: {}",
                e
            ))),
        }
    }
}
