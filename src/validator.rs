//! License Validator - the cache-versus-remote decision logic.
//!
//! `check` answers from the encrypted cache while the cached record is fresh and
//! only asks the licensing service when the cache is missing, expired, or
//! unreadable. `activate` always asks the service. A record is saved only after
//! the service answers successfully, so failures never touch the cache.
//!
//! Each operation holds the validator's exchange lock from its cache read through
//! its cache write. A slow `check` therefore cannot overwrite a record that an
//! `activate` started after it has already saved.

use crate::cache::file::LicenseStore;
use crate::client::http::LicenseAuthority;
use crate::clock::{Clock, SystemClock};
use crate::protocol::models::{LicenseRecord, Response, ACTIVATION_FAILED, CHECK_FAILED};
use crate::protocol::request::{redact_key, Command};
use crate::AnvarError;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// License validation result.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    /// The license record, cached or freshly issued.
    pub record: LicenseRecord,

    /// Whether this result came from cache.
    pub from_cache: bool,
}

/// Orchestrates the license cache and the remote licensing service.
pub struct LicenseValidator {
    store: Arc<LicenseStore>,
    authority: Arc<dyn LicenseAuthority>,
    clock: Arc<dyn Clock>,
    exchange: tokio::sync::Mutex<()>,
}

impl LicenseValidator {
    /// Create a validator using the system clock.
    pub fn new(store: LicenseStore, authority: Arc<dyn LicenseAuthority>) -> Self {
        Self::with_clock(store, authority, Arc::new(SystemClock))
    }

    /// Create a validator with a custom clock (for testing).
    #[cfg(any(test, feature = "test-seams"))]
    pub fn new_with_clock(
        store: LicenseStore,
        authority: Arc<dyn LicenseAuthority>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_clock(store, authority, clock)
    }

    fn with_clock(
        store: LicenseStore,
        authority: Arc<dyn LicenseAuthority>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store: Arc::new(store),
            authority,
            clock,
            exchange: tokio::sync::Mutex::new(()),
        }
    }

    /// The underlying license store.
    pub fn store(&self) -> &LicenseStore {
        &self.store
    }

    /// Check a license key.
    ///
    /// 1. Load the cached record
    /// 2. If present and not expired, return it without contacting the service
    /// 3. Otherwise ask the service, cache the answer, and return it
    ///
    /// A cached blob that cannot be decrypted is logged and treated as absent; the
    /// next successful remote answer overwrites it.
    ///
    /// # Errors
    /// - `MissingLicense` - No license key provided
    /// - `StorageFailure` - Cache could not be read or written
    /// - `RemoteUnavailable` / `RemoteRejected` - Service unreachable or refused
    /// - `InvalidRecord` - Service answered without a usable record
    pub async fn check_license(&self, license_key: &str) -> Result<ValidationResult, AnvarError> {
        if license_key.is_empty() {
            return Err(AnvarError::MissingLicense);
        }
        let _exchange = self.exchange.lock().await;

        let cached = match self.load().await {
            Ok(cached) => cached,
            Err(AnvarError::DecryptionFailure) => {
                warn!(
                    path = %self.store.path().display(),
                    "Cached license unreadable, refreshing from licensing service"
                );
                None
            }
            Err(e) => return Err(e),
        };

        if let Some(record) = cached {
            if !record.is_expired(self.clock.unix_seconds()) {
                debug!(key = %redact_key(license_key), "License served from cache");
                return Ok(ValidationResult {
                    record,
                    from_cache: true,
                });
            }
            debug!(key = %redact_key(license_key), "Cached license expired");
        }

        let record = self.authority.check(license_key).await?;
        self.save(record.clone()).await?;
        info!(key = %redact_key(license_key), "License refreshed from licensing service");

        Ok(ValidationResult {
            record,
            from_cache: false,
        })
    }

    /// Activate a license key.
    ///
    /// Always contacts the service, whatever the cache holds. The cache is only
    /// replaced when activation succeeds.
    pub async fn activate_license(
        &self,
        license_key: &str,
    ) -> Result<ValidationResult, AnvarError> {
        if license_key.is_empty() {
            return Err(AnvarError::MissingLicense);
        }
        let _exchange = self.exchange.lock().await;

        let record = self.authority.activate(license_key).await?;
        self.save(record.clone()).await?;
        info!(key = %redact_key(license_key), "License activated");

        Ok(ValidationResult {
            record,
            from_cache: false,
        })
    }

    /// Run a parsed command and turn the outcome into a socket reply.
    ///
    /// Every error becomes a `{"status":"failed",...}` reply; nothing escapes.
    pub async fn handle(&self, command: &Command) -> Response {
        let key = command.license_key();
        let (outcome, failure_message) = match command {
            Command::Check(_) => (self.check_license(key).await, CHECK_FAILED),
            Command::Activate(_) => (self.activate_license(key).await, ACTIVATION_FAILED),
        };

        match outcome {
            Ok(result) => Response::License(result.record),
            Err(e) => {
                match &e {
                    AnvarError::StorageFailure(_) | AnvarError::KeyMaterial(_) => {
                        error!(command = command.name(), error = %e, "License request failed")
                    }
                    AnvarError::RemoteRejected { status } => warn!(
                        command = command.name(),
                        key = %redact_key(key),
                        status,
                        "Licensing service rejected request"
                    ),
                    _ => warn!(command = command.name(), error = %e, "License request failed"),
                }
                Response::failed(failure_message)
            }
        }
    }

    async fn load(&self) -> Result<Option<LicenseRecord>, AnvarError> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.load())
            .await
            .map_err(|e| AnvarError::StorageFailure(format!("License load task failed: {}", e)))?
    }

    async fn save(&self, record: LicenseRecord) -> Result<(), AnvarError> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.save(&record))
            .await
            .map_err(|e| AnvarError::StorageFailure(format!("License save task failed: {}", e)))?
    }
}
