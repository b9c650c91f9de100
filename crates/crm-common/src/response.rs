//! Response contract for the calling layer
//!
//! The HTTP layer is external; it copies `status`, `headers` and the JSON
//! body verbatim.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Structured error body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    /// Short machine-stable error label
    pub error: String,
    /// Human-readable message
    pub message: String,
    /// Single permission that was required
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_permission: Option<String>,
    /// Permission set that was required
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_permissions: Option<Vec<String>>,
    /// Role allow-list that was required
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_roles: Option<Vec<String>>,
    /// Caller's role
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_role: Option<String>,
    /// When rate-limit capacity returns
    #[serde(rename = "resetAt", skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<DateTime<Utc>>,
}

impl ErrorBody {
    /// Body with only `error` and `message`
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            required_permission: None,
            required_permissions: None,
            required_roles: None,
            current_role: None,
            reset_at: None,
        }
    }
}

/// Status, headers and body handed back to the HTTP layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryResponse {
    /// HTTP status code
    pub status: u16,
    /// Extra response headers
    pub headers: Vec<(String, String)>,
    /// JSON body
    pub body: ErrorBody,
}

impl BoundaryResponse {
    /// Response without headers
    pub fn new(status: u16, body: ErrorBody) -> Self {
        Self { status, headers: Vec::new(), body }
    }

    /// Append a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Look up a header value, case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Serialized body
    pub fn body_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_fields_are_omitted() {
        let resp = BoundaryResponse::new(404, ErrorBody::new("Not found", "gone"));
        let json = resp.body_json();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert_eq!(obj["error"], "Not found");
    }

    #[test]
    fn test_reset_at_uses_camel_case() {
        let mut body = ErrorBody::new("Too many requests", "slow down");
        body.reset_at = DateTime::<Utc>::from_timestamp(0, 0);
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("resetAt").is_some());
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let resp = BoundaryResponse::new(429, ErrorBody::new("e", "m")).with_header("Retry-After", "5");
        assert_eq!(resp.header("retry-after"), Some("5"));
        assert_eq!(resp.header("x-missing"), None);
    }
}
