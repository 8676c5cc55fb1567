//! # Anvar
//!
//! **Local license-validation daemon with an encrypted license cache.**
//!
//! Anvar listens on a Unix socket and answers two commands from local clients:
//!
//! - `check <key>`: reply with the cached license while it is fresh, otherwise ask
//!   the remote licensing service and cache its answer
//! - `activate <key>`: always ask the remote licensing service
//!
//! Clients never hold network credentials or key material; the daemon owns both.
//!
//! ## Features
//!
//! - **Encrypted at rest**: the license record is sealed with ChaCha20-Poly1305 under a
//!   key generated once and kept owner-only on disk
//! - **Cache-first checks**: a fresh record answers with zero remote dependency
//! - **Atomic persistence**: temp file + rename, so a half-written license is never read
//! - **Bounded connections**: concurrent handlers, idle timeouts, graceful shutdown
//!
//! ## Quickstart
//!
//! ```no_run
//! use anvar::{
//!     DaemonConfig, HttpAuthority, KeyStore, LicenseStore, LicenseValidator, RequestServer,
//! };
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), anvar::AnvarError> {
//! let config = DaemonConfig::from_env()?;
//! config.validate()?;
//!
//! let keys = Arc::new(KeyStore::new(&config.key_path));
//! let store = LicenseStore::new(&config.license_path, keys);
//! let authority = Arc::new(HttpAuthority::new(&config)?);
//! let validator = Arc::new(LicenseValidator::new(store, authority));
//!
//! let server = RequestServer::bind(&config, validator)?;
//! server.serve(CancellationToken::new()).await
//! # }
//! ```
//!
//! ## Trust Boundary
//!
//! The socket defaults to mode `0o777`, so any local user can query and activate
//! licenses. The key file is always `0o600`. See [`DaemonConfig::socket_mode`].

#![deny(missing_docs)]

// Core modules
pub mod clock;
pub mod config;
pub mod errors;

// Crypto layer
pub mod crypto;

// Protocol layer
pub mod protocol;

// Client layer
pub mod client;

// Cache layer
pub mod cache;

// Validator (cache-versus-remote decisions)
pub mod validator;

// Socket server
pub mod server;

// Re-exports for public API
pub use cache::file::LicenseStore;
pub use client::http::{HttpAuthority, LicenseAuthority};
pub use clock::{Clock, SystemClock};
pub use config::DaemonConfig;
pub use crypto::keystore::{EncryptionKey, KeyStore};
pub use errors::AnvarError;
pub use protocol::models::{LicenseRecord, Response};
pub use protocol::request::Command;
pub use server::RequestServer;
pub use validator::{LicenseValidator, ValidationResult};

#[cfg(any(test, feature = "test-seams"))]
pub use clock::MockClock;
