//! Scenario definition and loading

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::environment::Environment;
use crate::error::{ConfigError, EngineError, EngineResult};
use crate::validation::ValidationRules;

/// Per-request timeout when a scenario sets none
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const VALID_METHODS: [&str; 7] = ["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"];

/// A declarative request scenario
///
/// Read from a JSON file before the run and never modified while it is in
/// progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name
    pub name: String,

    /// Free-form description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// HTTP method
    pub method: String,

    /// Path appended to `base_url`
    pub url: String,

    /// Target origin, e.g. `https://api.example.com`
    pub base_url: String,

    /// Request headers
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    /// Query parameters; non-string values are sent as their JSON text
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query_params: BTreeMap<String, serde_json::Value>,

    /// Request body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,

    /// Per-request timeout
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,

    /// Response validation rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationRules>,

    /// Scenario-local variables for `{{env.NAME}}` expansion
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
}

impl Scenario {
    /// Minimal scenario without validation rules
    pub fn new(
        name: impl Into<String>,
        method: impl Into<String>,
        base_url: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            method: method.into(),
            url: url.into(),
            base_url: base_url.into(),
            headers: BTreeMap::new(),
            query_params: BTreeMap::new(),
            body: None,
            timeout: None,
            validation: None,
            environment: BTreeMap::new(),
        }
    }

    /// Read, expand and validate a scenario file
    pub fn from_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        Self::from_file_with_env(path, Environment::new())
    }

    /// Like [`Scenario::from_file`] with extra variables for expansion
    pub fn from_file_with_env(path: impl AsRef<Path>, env: Environment) -> EngineResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::config(format!(
                "failed to read scenario file {}: {e}",
                path.display()
            ))
        })?;
        let scenario = Self::from_json_with_env(&content, env)?;
        debug!(path = %path.display(), scenario = %scenario.name, "Loaded scenario");
        Ok(scenario)
    }

    /// Parse, expand and validate a scenario from JSON text
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Self::from_json_with_env(json, Environment::new())
    }

    /// Like [`Scenario::from_json`] with extra variables for expansion
    pub fn from_json_with_env(json: &str, mut env: Environment) -> Result<Self, ConfigError> {
        let mut scenario: Scenario = serde_json::from_str(json)?;
        env.merge_missing(&scenario.environment);
        scenario.expand(&env);
        scenario.validate()?;
        Ok(scenario)
    }

    /// Replace `{{env.NAME}}` placeholders in the URL parts, header values
    /// and string query values
    pub fn expand(&mut self, env: &Environment) {
        self.base_url = env.expand(&self.base_url);
        self.url = env.expand(&self.url);
        for value in self.headers.values_mut() {
            *value = env.expand(value);
        }
        for value in self.query_params.values_mut() {
            if let serde_json::Value::String(s) = value {
                *s = env.expand(s);
            }
        }
    }

    /// Check required fields, the method and the validation rules
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingField("name"));
        }
        if self.method.trim().is_empty() {
            return Err(ConfigError::MissingField("method"));
        }
        if self.url.trim().is_empty() {
            return Err(ConfigError::MissingField("url"));
        }
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::MissingField("base_url"));
        }

        let method = self.method.to_uppercase();
        if !VALID_METHODS.contains(&method.as_str()) {
            return Err(ConfigError::InvalidMethod(self.method.clone()));
        }

        if self.timeout == Some(Duration::ZERO) {
            return Err(ConfigError::InvalidDuration(
                "scenario timeout must be greater than zero".into(),
            ));
        }

        if let Some(rules) = &self.validation {
            rules.validate()?;
        }
        Ok(())
    }

    /// Base URL and path joined with exactly one slash
    pub fn full_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = self.url.trim_start_matches('/');
        if path.is_empty() {
            base.to_string()
        } else {
            format!("{base}/{path}")
        }
    }

    /// Effective per-request timeout
    pub fn timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Effective validation rules; `[200]` when the scenario has none
    pub fn validation_rules(&self) -> ValidationRules {
        self.validation
            .clone()
            .unwrap_or_else(ValidationRules::default_for_scenario)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SCENARIO: &str = r#"{
        "name": "list orders",
        "method": "GET",
        "base_url": "https://{{env.HOST}}/",
        "url": "/api/orders",
        "headers": {"Authorization": "Bearer {{env.TOKEN}}"},
        "query_params": {"limit": 10, "region": "{{env.REGION}}"},
        "timeout": "5s",
        "environment": {"HOST": "shop.test", "TOKEN": "t0k", "REGION": "eu"},
        "validation": {"status_codes": [200], "response_time_max": "1s"}
    }"#;

    #[test]
    fn test_from_json_expands_and_validates() {
        let scenario = Scenario::from_json(SCENARIO).unwrap();
        assert_eq!(scenario.full_url(), "https://shop.test/api/orders");
        assert_eq!(
            scenario.headers.get("Authorization").map(String::as_str),
            Some("Bearer t0k")
        );
        assert_eq!(scenario.query_params["region"], serde_json::json!("eu"));
        assert_eq!(scenario.query_params["limit"], serde_json::json!(10));
        assert_eq!(scenario.timeout(), Duration::from_secs(5));
        assert_eq!(
            scenario.validation_rules().response_time_max,
            Some(Duration::from_secs(1))
        );
    }

    #[test]
    fn test_caller_variables_shadow_scenario_environment() {
        let mut env = Environment::new();
        env.set("HOST", "staging.test");
        let scenario = Scenario::from_json_with_env(SCENARIO, env).unwrap();
        assert_eq!(scenario.full_url(), "https://staging.test/api/orders");
    }

    #[test]
    fn test_defaults() {
        let scenario = Scenario::new("ping", "GET", "http://localhost", "health");
        assert_eq!(scenario.timeout(), DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(scenario.validation_rules().status_codes, vec![200]);
        assert_eq!(scenario.full_url(), "http://localhost/health");
    }

    #[test]
    fn test_missing_fields_rejected() {
        let mut scenario = Scenario::new("ping", "GET", "http://localhost", "/");
        scenario.base_url.clear();
        assert!(matches!(
            scenario.validate(),
            Err(ConfigError::MissingField("base_url"))
        ));

        let scenario = Scenario::new("", "GET", "http://localhost", "/");
        assert!(matches!(
            scenario.validate(),
            Err(ConfigError::MissingField("name"))
        ));
    }

    #[test]
    fn test_invalid_method_rejected() {
        let scenario = Scenario::new("ping", "FETCH", "http://localhost", "/");
        assert!(matches!(
            scenario.validate(),
            Err(ConfigError::InvalidMethod(m)) if m == "FETCH"
        ));
        assert!(Scenario::new("ping", "get", "http://localhost", "/")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_bad_duration_is_a_parse_error() {
        let err = Scenario::from_json(
            r#"{"name":"x","method":"GET","url":"/","base_url":"http://h","timeout":"soon"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_invalid_rules_rejected() {
        let err = Scenario::from_json(
            r#"{"name":"x","method":"GET","url":"/","base_url":"http://h",
                "validation":{"body_regex":"[unclosed"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRegex { .. }));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SCENARIO.as_bytes()).unwrap();
        let scenario = Scenario::from_file(file.path()).unwrap();
        assert_eq!(scenario.name, "list orders");

        let err = Scenario::from_file("/definitely/not/here.json").unwrap_err();
        assert!(err.message.contains("failed to read scenario file"));
    }
}
