//! Response validation
//!
//! A [`ResponseValidator`] evaluates one [`Response`] against a
//! [`ValidationRules`] set. Rules are checked in a fixed order and the first
//! failing rule decides the result:
//!
//! 1. transport failure (`request_error`)
//! 2. status code allow-list (`status_code`)
//! 3. maximum response time (`response_time`)
//! 4. body size bounds (`response_size`)
//! 5. required, then forbidden substrings (`body_content`)
//! 6. body regex (`body_regex`)
//! 7. JSON path query (`body_json_path`)
//! 8. required headers (`header_missing` / `header_value`)

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::response::Response;

/// Why a response failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    /// The transport reported a failure
    RequestError,
    /// Status code not in the allow-list
    StatusCode,
    /// Response slower than the configured maximum
    ResponseTime,
    /// Body size outside the configured bounds
    ResponseSize,
    /// Required substring missing or forbidden substring present
    BodyContent,
    /// Body does not match the configured regex
    BodyRegex,
    /// JSON path query found nothing
    BodyJsonPath,
    /// Required header absent
    HeaderMissing,
    /// Required header present with another value
    HeaderValue,
}

impl ValidationErrorKind {
    /// Stable identifier used as the metrics bucket key
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationErrorKind::RequestError => "request_error",
            ValidationErrorKind::StatusCode => "status_code",
            ValidationErrorKind::ResponseTime => "response_time",
            ValidationErrorKind::ResponseSize => "response_size",
            ValidationErrorKind::BodyContent => "body_content",
            ValidationErrorKind::BodyRegex => "body_regex",
            ValidationErrorKind::BodyJsonPath => "body_json_path",
            ValidationErrorKind::HeaderMissing => "header_missing",
            ValidationErrorKind::HeaderValue => "header_value",
        }
    }
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of validating one response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether every rule passed
    pub passed: bool,

    /// First failing rule
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ValidationErrorKind>,

    /// Human-readable failure detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ValidationResult {
    /// Passing result
    pub fn pass() -> Self {
        Self {
            passed: true,
            kind: None,
            message: None,
        }
    }

    /// Failing result
    pub fn fail(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            passed: false,
            kind: Some(kind),
            message: Some(message.into()),
        }
    }
}

/// Validation rules as written in a scenario file
///
/// Every field is optional. An empty `status_codes` list accepts any status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationRules {
    /// Accepted status codes
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub status_codes: Vec<u16>,

    /// Maximum accepted response time
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub response_time_max: Option<Duration>,

    /// Substrings the body must contain
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub body_contains: Vec<String>,

    /// Substrings the body must not contain
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub body_not_contains: Vec<String>,

    /// Regex the body must match
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_regex: Option<String>,

    /// Dotted JSON path that must resolve in the body (`data.items.0.id`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_json_path: Option<String>,

    /// Headers that must be present with exactly these values
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    /// Minimum body size in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_response_size: Option<u64>,

    /// Maximum body size in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_response_size: Option<u64>,
}

impl ValidationRules {
    /// Rules used when a scenario has no validation block
    pub fn default_for_scenario() -> Self {
        Self {
            status_codes: vec![200],
            ..Default::default()
        }
    }

    /// Check the rules themselves are well-formed
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(code) = self
            .status_codes
            .iter()
            .copied()
            .find(|code| !(100..=599).contains(code))
        {
            return Err(ConfigError::InvalidStatusCode(code));
        }

        if let (Some(min), Some(max)) = (self.min_response_size, self.max_response_size) {
            if min > max {
                return Err(ConfigError::InvalidSizeRange { min, max });
            }
        }

        self.compile_regex()?;
        Ok(())
    }

    /// Return a copy with CLI-level overrides applied
    ///
    /// `self` is left untouched.
    pub fn overlay(&self, overrides: &ValidationOverrides) -> Self {
        let mut rules = self.clone();

        if !overrides.expect_status.is_empty() {
            rules.status_codes = overrides.expect_status.clone();
        }
        if let Some(max) = overrides.expect_response_time {
            rules.response_time_max = Some(max);
        }
        if let Some(body) = &overrides.expect_body {
            rules.body_contains = vec![body.clone()];
        }
        if let Some(body) = &overrides.expect_body_not {
            rules.body_not_contains = vec![body.clone()];
        }

        rules
    }

    fn compile_regex(&self) -> Result<Option<Regex>, ConfigError> {
        self.body_regex
            .as_deref()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| ConfigError::InvalidRegex {
                    pattern: pattern.to_string(),
                    source,
                })
            })
            .transpose()
    }
}

/// Expectations given on the command line
///
/// Each set field replaces the corresponding scenario rule for the run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationOverrides {
    /// Replaces `status_codes`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expect_status: Vec<u16>,

    /// Replaces `response_time_max`
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub expect_response_time: Option<Duration>,

    /// Replaces `body_contains`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_body: Option<String>,

    /// Replaces `body_not_contains`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_body_not: Option<String>,
}

impl ValidationOverrides {
    /// Whether no override is set
    pub fn is_empty(&self) -> bool {
        self.expect_status.is_empty()
            && self.expect_response_time.is_none()
            && self.expect_body.is_none()
            && self.expect_body_not.is_none()
    }
}

/// Validates responses against a fixed rule set
///
/// Construction compiles the regex, so an invalid pattern is rejected before
/// any request is sent.
#[derive(Debug, Clone)]
pub struct ResponseValidator {
    rules: ValidationRules,
    body_regex: Option<Regex>,
}

impl ResponseValidator {
    /// Create a validator, rejecting malformed rules
    pub fn new(rules: ValidationRules) -> Result<Self, ConfigError> {
        rules.validate()?;
        let body_regex = rules.compile_regex()?;
        Ok(Self { rules, body_regex })
    }

    /// Create a validator for `rules` overlaid with `overrides`
    pub fn with_overrides(
        rules: &ValidationRules,
        overrides: &ValidationOverrides,
    ) -> Result<Self, ConfigError> {
        Self::new(rules.overlay(overrides))
    }

    /// The effective rules
    pub fn rules(&self) -> &ValidationRules {
        &self.rules
    }

    /// Validate a response, stopping at the first failing rule
    pub fn validate(&self, response: &Response) -> ValidationResult {
        if let Some(error) = &response.error {
            return ValidationResult::fail(ValidationErrorKind::RequestError, error.clone());
        }

        self.check_status(response.status)
            .or_else(|| self.check_response_time(response.elapsed))
            .or_else(|| self.check_size(response.content_length))
            .or_else(|| self.check_body(response))
            .or_else(|| self.check_headers(response))
            .unwrap_or_else(ValidationResult::pass)
    }

    fn check_status(&self, status: u16) -> Option<ValidationResult> {
        let allowed = &self.rules.status_codes;
        if allowed.is_empty() || allowed.contains(&status) {
            return None;
        }
        Some(ValidationResult::fail(
            ValidationErrorKind::StatusCode,
            format!("expected status codes {allowed:?}, got {status}"),
        ))
    }

    fn check_response_time(&self, elapsed: Duration) -> Option<ValidationResult> {
        let max = self.rules.response_time_max?;
        (elapsed > max).then(|| {
            ValidationResult::fail(
                ValidationErrorKind::ResponseTime,
                format!("response time {elapsed:?} exceeds maximum {max:?}"),
            )
        })
    }

    fn check_size(&self, size: u64) -> Option<ValidationResult> {
        if let Some(min) = self.rules.min_response_size {
            if size < min {
                return Some(ValidationResult::fail(
                    ValidationErrorKind::ResponseSize,
                    format!("response size {size} is below minimum {min}"),
                ));
            }
        }
        if let Some(max) = self.rules.max_response_size {
            if size > max {
                return Some(ValidationResult::fail(
                    ValidationErrorKind::ResponseSize,
                    format!("response size {size} exceeds maximum {max}"),
                ));
            }
        }
        None
    }

    fn check_body(&self, response: &Response) -> Option<ValidationResult> {
        let body = response.body_text();

        if let Some(required) = self
            .rules
            .body_contains
            .iter()
            .find(|required| !body.contains(required.as_str()))
        {
            return Some(ValidationResult::fail(
                ValidationErrorKind::BodyContent,
                format!("response body does not contain required string: {required}"),
            ));
        }

        if let Some(forbidden) = self
            .rules
            .body_not_contains
            .iter()
            .find(|forbidden| body.contains(forbidden.as_str()))
        {
            return Some(ValidationResult::fail(
                ValidationErrorKind::BodyContent,
                format!("response body contains forbidden string: {forbidden}"),
            ));
        }

        if let Some(regex) = &self.body_regex {
            if !regex.is_match(&body) {
                return Some(ValidationResult::fail(
                    ValidationErrorKind::BodyRegex,
                    format!("response body does not match regex pattern: {}", regex.as_str()),
                ));
            }
        }

        if let Some(path) = &self.rules.body_json_path {
            if !json_path_exists(&response.body, path) {
                return Some(ValidationResult::fail(
                    ValidationErrorKind::BodyJsonPath,
                    format!("JSON path not found or invalid: {path}"),
                ));
            }
        }

        None
    }

    fn check_headers(&self, response: &Response) -> Option<ValidationResult> {
        for (name, expected) in &self.rules.headers {
            match response.header(name) {
                None => {
                    return Some(ValidationResult::fail(
                        ValidationErrorKind::HeaderMissing,
                        format!("required header missing: {name}"),
                    ))
                }
                Some(actual) if actual != expected => {
                    return Some(ValidationResult::fail(
                        ValidationErrorKind::HeaderValue,
                        format!(
                            "header {name} has unexpected value: expected {expected}, got {actual}"
                        ),
                    ))
                }
                Some(_) => {}
            }
        }
        None
    }
}

/// Whether a dotted path resolves inside a JSON document
///
/// Segments are object keys or array indices (`items.0.id`, `items[0].id`);
/// `\.` escapes a dot inside a key, `#` matches any array, and a leading `$`
/// is ignored. An empty or non-JSON body never matches.
///
/// Only this subset of gjson path syntax is understood. Key wildcards
/// (`na*`, `n?me`), `@` modifiers, `|` pipes and `#(...)` queries are not
/// interpreted: each such segment is looked up as a literal key, so it
/// matches only a key spelled exactly that way.
pub fn json_path_exists(body: &[u8], path: &str) -> bool {
    if body.is_empty() {
        return false;
    }
    let Ok(root) = serde_json::from_slice::<serde_json::Value>(body) else {
        return false;
    };

    let path = path.trim();
    let path = path.strip_prefix('$').unwrap_or(path);
    let path = path.strip_prefix('.').unwrap_or(path);
    if path.is_empty() {
        return true;
    }

    let segments = split_path(path);
    let mut current = &root;
    for segment in &segments {
        current = match current {
            serde_json::Value::Object(map) => match map.get(segment) {
                Some(next) => next,
                None => return false,
            },
            serde_json::Value::Array(items) => {
                if segment == "#" {
                    return true;
                }
                match segment.parse::<usize>().ok().and_then(|idx| items.get(idx)) {
                    Some(next) => next,
                    None => return false,
                }
            }
            _ => return false,
        };
    }
    true
}

fn split_path(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            '.' => segments.push(std::mem::take(&mut current)),
            '[' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
            }
            ']' => {
                segments.push(std::mem::take(&mut current));
                if chars.peek() == Some(&'.') {
                    chars.next();
                }
            }
            other => current.push(other),
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}
