//! Daemon configuration.

use crate::AnvarError;
use std::path::PathBuf;
use std::time::Duration;

/// Default socket path.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/anvar.sock";

/// Default key file path.
pub const DEFAULT_KEY_PATH: &str = "/etc/anvar/.key";

/// Default encrypted license path.
pub const DEFAULT_LICENSE_PATH: &str = "/etc/anvar/license.dat";

/// Default licensing service base URL.
pub const DEFAULT_BASE_URL: &str = "https://lisence.freecp.biz.id";

/// Configuration for the license daemon.
///
/// Every path the daemon touches is carried here and injected into the stores and the
/// server; nothing reads module-level path constants at runtime.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Path of the Unix socket clients connect to.
    pub socket_path: PathBuf,

    /// Permission bits applied to the socket after bind.
    /// SECURITY: the default `0o777` lets any local user query and activate licenses.
    pub socket_mode: u32,

    /// Path of the raw encryption key (written with mode 0600).
    pub key_path: PathBuf,

    /// Path of the encrypted license blob.
    pub license_path: PathBuf,

    /// Base URL of the remote licensing service.
    pub base_url: String,

    /// Timeout for a single remote licensing call.
    pub request_timeout: Duration,

    /// How long a connection may sit idle before the server drops it.
    pub idle_timeout: Duration,

    /// Connections served at once. `1` serves clients strictly one after another.
    pub max_connections: usize,

    /// Upper bound on a single read from a client.
    pub max_request_bytes: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            socket_mode: 0o777,
            key_path: PathBuf::from(DEFAULT_KEY_PATH),
            license_path: PathBuf::from(DEFAULT_LICENSE_PATH),
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(60),
            max_connections: 64,
            max_request_bytes: 1024,
        }
    }
}

impl DaemonConfig {
    /// Build a configuration from `ANVAR_*` environment variables over the defaults.
    pub fn from_env() -> Result<Self, AnvarError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup over the defaults.
    ///
    /// Recognized variables: `ANVAR_SOCKET_PATH`, `ANVAR_SOCKET_MODE` (octal),
    /// `ANVAR_KEY_PATH`, `ANVAR_LICENSE_PATH`, `ANVAR_BASE_URL`,
    /// `ANVAR_REQUEST_TIMEOUT_SECS`, `ANVAR_IDLE_TIMEOUT_SECS`,
    /// `ANVAR_MAX_CONNECTIONS`, `ANVAR_MAX_REQUEST_BYTES`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AnvarError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("ANVAR_SOCKET_PATH") {
            config.socket_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("ANVAR_SOCKET_MODE") {
            config.socket_mode = u32::from_str_radix(v.trim().trim_start_matches("0o"), 8)
                .map_err(|e| {
                    AnvarError::ConfigError(format!("ANVAR_SOCKET_MODE must be octal: {}", e))
                })?;
        }
        if let Some(v) = lookup("ANVAR_KEY_PATH") {
            config.key_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("ANVAR_LICENSE_PATH") {
            config.license_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("ANVAR_BASE_URL") {
            config.base_url = v;
        }
        if let Some(v) = lookup("ANVAR_REQUEST_TIMEOUT_SECS") {
            let secs = parse_number("ANVAR_REQUEST_TIMEOUT_SECS", &v)?;
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = lookup("ANVAR_IDLE_TIMEOUT_SECS") {
            let secs = parse_number("ANVAR_IDLE_TIMEOUT_SECS", &v)?;
            config.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = lookup("ANVAR_MAX_CONNECTIONS") {
            config.max_connections = parse_number("ANVAR_MAX_CONNECTIONS", &v)?;
        }
        if let Some(v) = lookup("ANVAR_MAX_REQUEST_BYTES") {
            config.max_request_bytes = parse_number("ANVAR_MAX_REQUEST_BYTES", &v)?;
        }

        Ok(config)
    }

    /// Validate configuration for obvious errors.
    pub fn validate(&self) -> Result<(), AnvarError> {
        for (name, path) in [
            ("socket_path", &self.socket_path),
            ("key_path", &self.key_path),
            ("license_path", &self.license_path),
        ] {
            if path.as_os_str().is_empty() {
                return Err(AnvarError::ConfigError(format!("{} cannot be empty", name)));
            }
        }
        if self.key_path == self.license_path {
            return Err(AnvarError::ConfigError(
                "key_path and license_path must differ".to_string(),
            ));
        }
        if !(self.base_url.starts_with("https://") || self.base_url.starts_with("http://")) {
            return Err(AnvarError::ConfigError(format!(
                "base_url must be an http(s) URL, got {:?}",
                self.base_url
            )));
        }
        if self.socket_mode > 0o777 {
            return Err(AnvarError::ConfigError(format!(
                "socket_mode must be at most 0o777, got {:o}",
                self.socket_mode
            )));
        }
        if self.request_timeout.is_zero() || self.idle_timeout.is_zero() {
            return Err(AnvarError::ConfigError(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        if self.max_connections == 0 {
            return Err(AnvarError::ConfigError(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.max_request_bytes == 0 {
            return Err(AnvarError::ConfigError(
                "max_request_bytes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, AnvarError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| AnvarError::ConfigError(format!("{} is not a valid number: {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = DaemonConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.socket_path, PathBuf::from("/var/run/anvar.sock"));
        assert_eq!(config.socket_mode, 0o777);
        assert_eq!(config.max_request_bytes, 1024);
    }

    #[test]
    fn lookup_overrides_defaults() {
        let config = DaemonConfig::from_lookup(lookup_from(&[
            ("ANVAR_SOCKET_PATH", "/tmp/a.sock"),
            ("ANVAR_SOCKET_MODE", "660"),
            ("ANVAR_BASE_URL", "http://127.0.0.1:9000"),
            ("ANVAR_IDLE_TIMEOUT_SECS", "5"),
            ("ANVAR_MAX_CONNECTIONS", "1"),
        ]))
        .unwrap();

        assert_eq!(config.socket_path, PathBuf::from("/tmp/a.sock"));
        assert_eq!(config.socket_mode, 0o660);
        assert_eq!(config.base_url, "http://127.0.0.1:9000");
        assert_eq!(config.idle_timeout, Duration::from_secs(5));
        assert_eq!(config.max_connections, 1);
        assert_eq!(config.key_path, PathBuf::from(DEFAULT_KEY_PATH));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn socket_mode_accepts_rust_octal_prefix() {
        let config =
            DaemonConfig::from_lookup(lookup_from(&[("ANVAR_SOCKET_MODE", "0o600")])).unwrap();
        assert_eq!(config.socket_mode, 0o600);
    }

    #[test]
    fn malformed_numbers_are_config_errors() {
        let result = DaemonConfig::from_lookup(lookup_from(&[("ANVAR_MAX_CONNECTIONS", "many")]));
        assert!(matches!(result, Err(AnvarError::ConfigError(_))));

        let result = DaemonConfig::from_lookup(lookup_from(&[("ANVAR_SOCKET_MODE", "999")]));
        assert!(matches!(result, Err(AnvarError::ConfigError(_))));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = DaemonConfig::default();
        config.base_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());

        let mut config = DaemonConfig::default();
        config.max_connections = 0;
        assert!(config.validate().is_err());

        let mut config = DaemonConfig::default();
        config.license_path = config.key_path.clone();
        assert!(config.validate().is_err());

        let mut config = DaemonConfig::default();
        config.idle_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = DaemonConfig::default();
        config.key_path = PathBuf::new();
        assert!(config.validate().is_err());
    }
}
