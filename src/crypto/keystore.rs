//! Persistent symmetric key material.
//!
//! The key is 32 raw bytes stored at a fixed path with mode 0600. On first use the
//! key is generated and published with a compare-and-create step (temp file + hard
//! link), so racing processes converge on a single key. After the first successful
//! load the key is memoized for the life of the process.

use crate::AnvarError;
use once_cell::sync::OnceCell;
use rand::RngCore;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the encryption key in bytes (256 bits for ChaCha20-Poly1305).
pub const KEY_SIZE: usize = 32;

/// Mode applied to the key file at creation.
const KEY_FILE_MODE: u32 = 0o600;

/// Symmetric key, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Build a key from stored bytes, rejecting anything that is not exactly `KEY_SIZE`.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, AnvarError> {
        let bytes: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| {
            AnvarError::KeyMaterial(format!(
                "expected {} key bytes, found {}",
                KEY_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self { bytes })
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey([REDACTED])")
    }
}

/// Owner of the daemon's encryption key.
pub struct KeyStore {
    path: PathBuf,
    key: OnceCell<EncryptionKey>,
}

impl KeyStore {
    /// Create a key store backed by the given file. Nothing is read until `get_key`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            key: OnceCell::new(),
        }
    }

    /// Path of the key file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the key, loading it from disk or generating and persisting it once.
    pub fn get_key(&self) -> Result<&EncryptionKey, AnvarError> {
        self.key.get_or_try_init(|| self.load_or_create())
    }

    fn load_or_create(&self) -> Result<EncryptionKey, AnvarError> {
        match fs::read(&self.path) {
            Ok(bytes) => {
                debug!(path = %self.path.display(), "Loaded encryption key");
                EncryptionKey::from_slice(&bytes)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => self.create(),
            Err(e) => Err(AnvarError::StorageFailure(format!(
                "Failed to read key file {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    /// Generate a key and publish it unless another process already has.
    fn create(&self) -> Result<EncryptionKey, AnvarError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AnvarError::StorageFailure(format!(
                    "Failed to create key directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let key = EncryptionKey::generate();
        let temp_path = temp_sibling(&self.path);

        write_private(&temp_path, key.as_bytes()).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            AnvarError::StorageFailure(format!("Failed to write key file: {}", e))
        })?;

        // hard_link fails if the target exists, which makes publication compare-and-create
        let linked = fs::hard_link(&temp_path, &self.path);
        let _ = fs::remove_file(&temp_path);

        match linked {
            Ok(()) => {
                info!(path = %self.path.display(), "Generated new encryption key");
                Ok(key)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                debug!(path = %self.path.display(), "Lost key creation race, using existing key");
                let bytes = fs::read(&self.path).map_err(|e| {
                    AnvarError::StorageFailure(format!("Failed to read key file: {}", e))
                })?;
                EncryptionKey::from_slice(&bytes)
            }
            Err(e) => Err(AnvarError::StorageFailure(format!(
                "Failed to publish key file {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

/// Unique temp path next to `path`, so the final link stays on one filesystem.
fn temp_sibling(path: &Path) -> PathBuf {
    let mut suffix = [0u8; 8];
    rand::rngs::OsRng.fill_bytes(&mut suffix);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tag: String = suffix.iter().map(|b| format!("{:02x}", b)).collect();
    path.with_file_name(format!(".{}.{}.tmp", name, tag))
}

/// Write `bytes` to a new owner-only file and flush it to disk.
pub(crate) fn write_private(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(KEY_FILE_MODE)
        .open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
