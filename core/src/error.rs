//! Error types for tsunami-core

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Broad classification of an [`EngineError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid or inconsistent configuration
    Config,
    /// A required builder field was never set
    MissingConfig,
    /// The protocol client could not be constructed or used
    Protocol,
    /// Worker spawning or joining failed
    Orchestration,
    /// Filesystem access failed
    Io,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Config => "configuration error",
            ErrorCategory::MissingConfig => "missing configuration",
            ErrorCategory::Protocol => "protocol error",
            ErrorCategory::Orchestration => "orchestration error",
            ErrorCategory::Io => "IO error",
        };
        f.write_str(name)
    }
}

/// Hard error surfaced to the caller of the engine
///
/// Per-request failures never become an `EngineError`; they are absorbed into
/// the metrics. Only pre-run configuration problems and orchestration
/// failures are reported this way.
#[derive(Debug, Error)]
#[error("{category}: {message}")]
pub struct EngineError {
    /// Error classification
    pub category: ErrorCategory,
    /// Human-readable detail
    pub message: String,
}

impl EngineError {
    /// Create an error with an explicit category
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    /// Configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Config, message)
    }

    /// A builder was finalized without a required field
    pub fn missing_config(field: &str) -> Self {
        Self::new(
            ErrorCategory::MissingConfig,
            format!("required field `{field}` was not set"),
        )
    }

    /// Protocol client error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Protocol, message)
    }

    /// Orchestration error
    pub fn orchestration(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Orchestration, message)
    }
}

impl From<ConfigError> for EngineError {
    fn from(err: ConfigError) -> Self {
        EngineError::config(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::new(ErrorCategory::Io, err.to_string())
    }
}

/// Result type alias
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Configuration validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required scenario field is empty
    #[error("scenario {0} is required")]
    MissingField(&'static str),

    /// HTTP method outside the supported set
    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// Status code outside 100..=599
    #[error("invalid status code: {0}")]
    InvalidStatusCode(u16),

    /// Body regex failed to compile
    #[error("invalid body regex pattern `{pattern}`: {source}")]
    InvalidRegex {
        /// The offending pattern
        pattern: String,
        /// Compiler error
        #[source]
        source: regex::Error,
    },

    /// Minimum body size larger than maximum
    #[error("min_response_size ({min}) cannot be greater than max_response_size ({max})")]
    InvalidSizeRange {
        /// Configured minimum
        min: u64,
        /// Configured maximum
        max: u64,
    },

    /// Run duration problems (zero duration, ramps longer than the run)
    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    /// Rate limit is zero or negative
    #[error("invalid rate limit: {0}")]
    InvalidRateLimit(String),

    /// Scenario file could not be parsed
    #[error("failed to parse scenario: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Transport-level failure reported by a [`ProtocolClient`](crate::traits::ProtocolClient)
#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    /// Request exceeded its timeout
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection could not be established or was reset
    #[error("connection failed: {0}")]
    Connection(String),

    /// The request could not be built (bad URL, bad header)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The response body could not be read
    #[error("failed to read response body: {0}")]
    Body(String),

    /// The run was stopped while the request was in flight
    #[error("request cancelled")]
    Cancelled,

    /// The client was closed before the call
    #[error("protocol client is closed")]
    Closed,

    /// Anything else the transport reports
    #[error("{0}")]
    Other(String),
}
