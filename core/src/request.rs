//! Outgoing request description

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::scenario::Scenario;

/// A single request handed to a [`ProtocolClient`](crate::traits::ProtocolClient)
///
/// Built once per run from the [`Scenario`] and shared read-only by every
/// worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// HTTP method (upper case)
    pub method: String,

    /// Fully joined target URL (base URL + path), without query string
    pub url: String,

    /// Request headers
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    /// Raw request body
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub body: Vec<u8>,

    /// Per-request timeout configured by the scenario
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Query parameters, appended by the transport
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query_params: Vec<(String, String)>,
}

impl Request {
    /// Create a bodiless request with the default timeout
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: BTreeMap::new(),
            body: Vec::new(),
            timeout: crate::scenario::DEFAULT_REQUEST_TIMEOUT,
            query_params: Vec::new(),
        }
    }

    /// Build the request described by a scenario
    ///
    /// A JSON string body is sent verbatim; any other JSON value is sent in
    /// its serialized form. Query values that are JSON strings lose their
    /// quotes, everything else uses its JSON text.
    pub fn from_scenario(scenario: &Scenario) -> Self {
        let body = match &scenario.body {
            None | Some(serde_json::Value::Null) => Vec::new(),
            Some(serde_json::Value::String(raw)) => raw.clone().into_bytes(),
            Some(value) => value.to_string().into_bytes(),
        };

        let query_params = scenario
            .query_params
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), value)
            })
            .collect();

        Self {
            method: scenario.method.to_uppercase(),
            url: scenario.full_url(),
            headers: scenario.headers.clone(),
            body,
            timeout: scenario.timeout(),
            query_params,
        }
    }

    /// Add a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the body
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add a query parameter
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.push((key.into(), value.into()));
        self
    }
}
