//! Socket request parsing.
//!
//! A request is two whitespace-separated tokens: a command and a license key.

use crate::client::http::is_dot_segment;
use crate::AnvarError;

/// A parsed client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `check <license_key>`: answer from cache when fresh, otherwise ask the service.
    Check(String),
    /// `activate <license_key>`: always ask the service.
    Activate(String),
}

impl Command {
    /// Parse one request line.
    pub fn parse(line: &str) -> Result<Self, AnvarError> {
        let mut tokens = line.split_whitespace();

        let verb = tokens
            .next()
            .ok_or_else(|| AnvarError::ProtocolError("empty request".to_string()))?;
        let key = tokens.next().ok_or_else(|| {
            AnvarError::ProtocolError(format!("`{}` requires a license key", verb))
        })?;
        if tokens.next().is_some() {
            return Err(AnvarError::ProtocolError(
                "unexpected trailing arguments".to_string(),
            ));
        }

        if is_dot_segment(key) {
            return Err(AnvarError::ProtocolError(format!(
                "`{}` is not a usable license key",
                key
            )));
        }

        match verb {
            "check" => Ok(Command::Check(key.to_string())),
            "activate" => Ok(Command::Activate(key.to_string())),
            other => Err(AnvarError::ProtocolError(format!(
                "unknown command `{}`",
                other
            ))),
        }
    }

    /// Name of the command, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Check(_) => "check",
            Command::Activate(_) => "activate",
        }
    }

    /// The license key argument.
    pub fn license_key(&self) -> &str {
        match self {
            Command::Check(key) | Command::Activate(key) => key,
        }
    }
}

/// Shortened license key safe to put in logs.
pub fn redact_key(key: &str) -> String {
    let prefix: String = key.chars().take(4).collect();
    format!("{}…", prefix)
}
