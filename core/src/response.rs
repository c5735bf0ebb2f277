//! Observed response

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Outcome of one request as seen by a worker
///
/// A response carrying `error` is a transport failure: there is no status
/// code (it is 0) and the body is empty. It is still a completed observation
/// and is recorded like any other.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// HTTP status code, 0 on transport failure
    pub status: u16,

    /// Response headers, first value per name
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Raw response body
    #[serde(default, skip_serializing)]
    pub body: Vec<u8>,

    /// Time from send until the body was fully read
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,

    /// Number of body bytes received
    pub content_length: u64,

    /// Transport failure description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    /// Successful transport exchange
    pub fn new(status: u16, body: impl Into<Vec<u8>>, elapsed: Duration) -> Self {
        let body = body.into();
        Self {
            status,
            headers: BTreeMap::new(),
            content_length: body.len() as u64,
            body,
            elapsed,
            error: None,
        }
    }

    /// Transport failure observed after `elapsed`
    pub fn failure(error: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            elapsed,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Attach a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Whether the transport failed
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    /// Whether this observation counts as a failed request in the metrics
    pub fn is_error(&self) -> bool {
        self.is_failure() || self.status >= 400
    }

    /// Body decoded as UTF-8, lossy
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_response() {
        let resp = Response::failure("connection refused", Duration::from_millis(3));
        assert!(resp.is_failure());
        assert!(resp.is_error());
        assert_eq!(resp.status, 0);
        assert_eq!(resp.content_length, 0);
    }

    #[test]
    fn test_error_status_is_error_but_not_failure() {
        let resp = Response::new(503, "busy", Duration::from_millis(1));
        assert!(!resp.is_failure());
        assert!(resp.is_error());
        assert_eq!(resp.content_length, 4);
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let resp = Response::new(200, "", Duration::ZERO).with_header("content-type", "text/plain");
        assert_eq!(resp.header("Content-Type"), Some("text/plain"));
        assert_eq!(resp.header("x-missing"), None);
    }
}
