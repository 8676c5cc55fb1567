//! License record and socket response structs.

use crate::AnvarError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Reply to a `check` that could not produce a usable license.
pub const CHECK_FAILED: &str = "License invalid or expired.";

/// Reply to an `activate` the licensing service refused.
pub const ACTIVATION_FAILED: &str = "Activation failed.";

/// Reply to a request the daemon could not parse.
pub const BAD_REQUEST: &str = "bad request";

/// License record as issued by the licensing service.
///
/// Fields are passed through untouched (key order included); the daemon only
/// requires a numeric `until`, in Unix seconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct LicenseRecord {
    fields: Map<String, Value>,
}

impl<'de> Deserialize<'de> for LicenseRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}

impl LicenseRecord {
    /// Build a record from a parsed JSON value, requiring an object with a numeric `until`.
    pub fn from_value(value: Value) -> Result<Self, AnvarError> {
        let Value::Object(fields) = value else {
            return Err(AnvarError::InvalidRecord(
                "license record must be a JSON object".to_string(),
            ));
        };
        match fields.get("until") {
            Some(Value::Number(_)) => Ok(Self { fields }),
            Some(other) => Err(AnvarError::InvalidRecord(format!(
                "`until` must be a number, got {}",
                other
            ))),
            None => Err(AnvarError::InvalidRecord(
                "license record has no `until` field".to_string(),
            )),
        }
    }

    /// Parse a record from raw JSON bytes.
    pub fn from_slice(body: &[u8]) -> Result<Self, AnvarError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| AnvarError::InvalidRecord(format!("Failed to parse record: {}", e)))?;
        Self::from_value(value)
    }

    /// Serialize to compact JSON.
    pub fn to_vec(&self) -> Result<Vec<u8>, AnvarError> {
        serde_json::to_vec(self)
            .map_err(|e| AnvarError::InvalidRecord(format!("Failed to serialize record: {}", e)))
    }

    /// Expiry as Unix seconds.
    pub fn until(&self) -> Option<f64> {
        self.fields.get("until").and_then(Value::as_f64)
    }

    /// Server-assigned `status` field, if it is a string.
    pub fn status(&self) -> Option<&str> {
        self.fields.get("status").and_then(Value::as_str)
    }

    /// Any other field, by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Whether the record is expired at `now` (Unix seconds).
    ///
    /// Expired means strictly `now > until`: a record expiring at exactly `now`
    /// is still usable. A record without a readable `until` is always expired.
    pub fn is_expired(&self, now: f64) -> bool {
        match self.until() {
            Some(until) => now > until,
            None => true,
        }
    }
}

/// A single JSON reply written back on the socket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    /// The license record, exactly as issued.
    License(LicenseRecord),
    /// A failure with a human-readable message.
    Failed {
        /// Always `"failed"`.
        status: &'static str,
        /// Reason shown to the client.
        message: &'static str,
    },
}

impl Response {
    /// A failure response with the given message.
    pub fn failed(message: &'static str) -> Self {
        Response::Failed {
            status: "failed",
            message,
        }
    }

    /// Serialize to compact JSON.
    pub fn to_json(&self) -> String {
        // Maps with string keys and &'static str fields cannot fail to serialize.
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"status":"failed","message":"License invalid or expired."}"#.to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REMOTE_BODY: &str =
        r#"{"status":"ok","until":1900000000,"plan":"pro","seats":{"max":5,"used":1}}"#;

    #[test]
    fn record_passes_fields_through_in_order() {
        let record = LicenseRecord::from_slice(REMOTE_BODY.as_bytes()).unwrap();
        assert_eq!(String::from_utf8(record.to_vec().unwrap()).unwrap(), REMOTE_BODY);
        assert_eq!(record.status(), Some("ok"));
        assert_eq!(record.until(), Some(1_900_000_000.0));
        assert_eq!(record.get("plan"), Some(&Value::from("pro")));
    }

    #[test]
    fn fractional_until_is_accepted() {
        let record = LicenseRecord::from_slice(br#"{"until": 1700000000.25}"#).unwrap();
        assert_eq!(record.until(), Some(1_700_000_000.25));
    }

    #[test]
    fn record_without_until_is_rejected() {
        let result = LicenseRecord::from_slice(br#"{"status":"ok"}"#);
        assert!(matches!(result, Err(AnvarError::InvalidRecord(_))));
    }

    #[test]
    fn non_numeric_until_is_rejected() {
        let result = LicenseRecord::from_slice(br#"{"until":"tomorrow"}"#);
        assert!(matches!(result, Err(AnvarError::InvalidRecord(_))));
    }

    #[test]
    fn serde_deserialize_enforces_until() {
        let record: LicenseRecord = serde_json::from_str(REMOTE_BODY).unwrap();
        assert_eq!(record.until(), Some(1_900_000_000.0));

        assert!(serde_json::from_str::<LicenseRecord>(r#"{"status":"ok"}"#).is_err());
        assert!(serde_json::from_str::<LicenseRecord>(r#"{"until":"soon"}"#).is_err());
        assert!(serde_json::from_str::<LicenseRecord>("[]").is_err());
    }

    #[test]
    fn non_object_bodies_are_rejected() {
        assert!(LicenseRecord::from_slice(b"[1,2,3]").is_err());
        assert!(LicenseRecord::from_slice(b"not json").is_err());
    }

    #[test]
    fn expiry_is_strictly_greater_than() {
        let record = LicenseRecord::from_slice(br#"{"until":1000}"#).unwrap();
        assert!(!record.is_expired(999.0));
        assert!(!record.is_expired(1000.0));
        assert!(record.is_expired(1000.001));
    }

    #[test]
    fn failure_responses_match_wire_format() {
        assert_eq!(
            Response::failed(CHECK_FAILED).to_json(),
            r#"{"status":"failed","message":"License invalid or expired."}"#
        );
        assert_eq!(
            Response::failed(ACTIVATION_FAILED).to_json(),
            r#"{"status":"failed","message":"Activation failed."}"#
        );
        assert_eq!(
            Response::failed(BAD_REQUEST).to_json(),
            r#"{"status":"failed","message":"bad request"}"#
        );
    }

    #[test]
    fn license_response_is_the_raw_record() {
        let record = LicenseRecord::from_slice(REMOTE_BODY.as_bytes()).unwrap();
        assert_eq!(Response::License(record).to_json(), REMOTE_BODY);
    }
}
