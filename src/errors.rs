//! Anvar error types.

use thiserror::Error;

/// Errors that can occur while validating, storing, or serving licenses.
#[derive(Debug, Error)]
pub enum AnvarError {
    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Key or license file I/O failed.
    #[error("Storage failure: {0}")]
    StorageFailure(String),

    /// Key file exists but does not hold usable key material.
    #[error("Invalid key material: {0}")]
    KeyMaterial(String),

    /// Sealing the license record failed.
    #[error("License encryption failed")]
    EncryptionFailure,

    /// License blob cannot be decrypted under the current key.
    #[error("License decryption failed (wrong key or corrupted file)")]
    DecryptionFailure,

    /// Transport error talking to the licensing service.
    #[error("Licensing service unavailable: {0}")]
    RemoteUnavailable(String),

    /// Licensing service answered with a non-success status.
    #[error("Licensing service rejected the request (HTTP {status})")]
    RemoteRejected {
        /// HTTP status code returned by the service.
        status: u16,
    },

    /// A license record is not shaped the way the daemon requires.
    #[error("Invalid license record: {0}")]
    InvalidRecord(String),

    /// Local socket could not be prepared or bound.
    #[error("Socket error: {0}")]
    SocketError(String),

    /// A process signal handler could not be installed.
    #[error("Signal handler error: {0}")]
    SignalError(String),

    /// Malformed client request on the local socket.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// No license key provided.
    #[error("No license key provided")]
    MissingLicense,
}

impl AnvarError {
    /// Whether the failure came from the remote licensing service.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            AnvarError::RemoteUnavailable(_) | AnvarError::RemoteRejected { .. }
        )
    }
}
