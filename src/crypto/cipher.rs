//! License blob encryption using ChaCha20-Poly1305.
//!
//! On-disk format: URL-safe base64 of `version || nonce || ciphertext+tag`.

use crate::crypto::keystore::EncryptionKey;
use crate::AnvarError;
use base64::{engine::general_purpose::URL_SAFE, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;

/// Blob format version.
pub const BLOB_VERSION: u8 = 0x01;

/// Size of nonce in bytes (96 bits for ChaCha20-Poly1305).
pub const NONCE_SIZE: usize = 12;

/// Size of authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Encrypted license record as stored on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedBlob {
    /// The nonce used for encryption (unique per encryption).
    pub nonce: [u8; NONCE_SIZE],
    /// The encrypted ciphertext (includes auth tag).
    pub ciphertext: Vec<u8>,
}

impl EncryptedBlob {
    /// Encode for storage.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + NONCE_SIZE + self.ciphertext.len());
        bytes.push(BLOB_VERSION);
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&self.ciphertext);
        URL_SAFE.encode(bytes).into_bytes()
    }

    /// Decode stored bytes. Anything malformed is a `DecryptionFailure`.
    pub fn decode(stored: &[u8]) -> Result<Self, AnvarError> {
        let bytes = URL_SAFE
            .decode(stored)
            .map_err(|_| AnvarError::DecryptionFailure)?;

        let Some((&version, rest)) = bytes.split_first() else {
            return Err(AnvarError::DecryptionFailure);
        };
        if version != BLOB_VERSION || rest.len() < NONCE_SIZE + TAG_SIZE {
            return Err(AnvarError::DecryptionFailure);
        }

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&rest[..NONCE_SIZE]);

        Ok(Self {
            nonce,
            ciphertext: rest[NONCE_SIZE..].to_vec(),
        })
    }
}

/// Encrypt plaintext under `key` with a fresh random nonce.
pub fn seal(key: &EncryptionKey, plaintext: &[u8]) -> Result<EncryptedBlob, AnvarError> {
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| AnvarError::EncryptionFailure)?;

    Ok(EncryptedBlob {
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Decrypt a blob. Wrong key and tampered data are indistinguishable.
pub fn open(key: &EncryptionKey, blob: &EncryptedBlob) -> Result<Vec<u8>, AnvarError> {
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
    let nonce = Nonce::from_slice(&blob.nonce);

    cipher
        .decrypt(nonce, blob.ciphertext.as_ref())
        .map_err(|_| AnvarError::DecryptionFailure)
}
