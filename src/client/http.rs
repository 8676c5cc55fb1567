//! Reqwest-based client for the remote licensing service.
//!
//! The service exposes two GET endpoints:
//! - `{base}/{license_key}` validates a key
//! - `{base}/{license_key}/activate` activates a key
//!
//! HTTP 200 with a license record body is success; any other status is a rejection.

use crate::config::DaemonConfig;
use crate::protocol::models::LicenseRecord;
use crate::AnvarError;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode, Url};
use std::time::Duration;

/// The remote authority that issues license records.
#[async_trait]
pub trait LicenseAuthority: Send + Sync {
    /// Ask the authority whether `license_key` is currently valid.
    async fn check(&self, license_key: &str) -> Result<LicenseRecord, AnvarError>;

    /// Ask the authority to activate `license_key`.
    async fn activate(&self, license_key: &str) -> Result<LicenseRecord, AnvarError>;
}

/// HTTP licensing client.
pub struct HttpAuthority {
    client: Client,
    base_url: Url,
    user_agent: String,
}

impl HttpAuthority {
    /// Create a client from daemon configuration.
    pub fn new(config: &DaemonConfig) -> Result<Self, AnvarError> {
        Self::with_base_url(&config.base_url, config.request_timeout)
    }

    /// Create a client for an explicit base URL.
    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, AnvarError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AnvarError::ConfigError(format!("Invalid base URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(AnvarError::ConfigError(format!(
                "Base URL cannot carry a path: {}",
                base_url
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AnvarError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            user_agent: build_user_agent(),
        })
    }

    /// The configured base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build `{base}/{key}[/{suffix}]` with the key as a single encoded path segment.
    pub fn endpoint(&self, license_key: &str, suffix: Option<&str>) -> Result<Url, AnvarError> {
        if license_key.is_empty() {
            return Err(AnvarError::MissingLicense);
        }
        // `.` and `..` are dropped by URL path normalization instead of being pushed.
        if is_dot_segment(license_key) {
            return Err(AnvarError::ProtocolError(format!(
                "`{}` is not a usable license key",
                license_key
            )));
        }

        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                AnvarError::ConfigError("Base URL cannot carry a path".to_string())
            })?;
            segments.pop_if_empty().push(license_key);
            if let Some(suffix) = suffix {
                segments.push(suffix);
            }
        }
        Ok(url)
    }

    async fn fetch(&self, url: Url) -> Result<LicenseRecord, AnvarError> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| AnvarError::RemoteUnavailable(format!("Request failed: {}", e)))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(AnvarError::RemoteRejected {
                status: status.as_u16(),
            });
        }

        let body: serde_json::Value = response.json().await.map_err(|e| {
            if e.is_decode() {
                AnvarError::InvalidRecord(format!("Response is not JSON: {}", e))
            } else {
                AnvarError::RemoteUnavailable(format!("Failed to read body: {}", e))
            }
        })?;

        LicenseRecord::from_value(body)
    }
}

#[async_trait]
impl LicenseAuthority for HttpAuthority {
    async fn check(&self, license_key: &str) -> Result<LicenseRecord, AnvarError> {
        let url = self.endpoint(license_key, None)?;
        self.fetch(url).await
    }

    async fn activate(&self, license_key: &str) -> Result<LicenseRecord, AnvarError> {
        let url = self.endpoint(license_key, Some("activate"))?;
        self.fetch(url).await
    }
}

/// Whether `key` is a relative path segment (`.` or `..`).
pub fn is_dot_segment(key: &str) -> bool {
    key == "." || key == ".."
}

/// Build a User-Agent string: `anvar/<version>`.
pub fn build_user_agent() -> String {
    format!("anvar/{}", env!("CARGO_PKG_VERSION"))
}
