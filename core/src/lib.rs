//! tsunami-core: load-generation and measurement pipeline
//!
//! This crate provides the engine used by every tsunami component,
//! including:
//!
//! - Scenario and run configuration types
//! - The `ProtocolClient` trait and request/response types
//! - Response validation
//! - Load patterns and pacing
//! - The concurrent metrics collector
//! - Workers and the load engine
//! - Error handling

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod environment;
pub mod error;
pub mod metrics;
pub mod pattern;
pub mod request;
pub mod response;
pub mod scenario;
pub mod traits;
pub mod validation;
pub mod worker;

pub use config::RunConfig;
pub use engine::{EngineBuilder, LoadEngine, StopHandle};
pub use environment::Environment;
pub use error::*;
pub use metrics::*;
pub use pattern::{LoadPattern, LoadProfile, Pacing, Phase};
pub use request::Request;
pub use response::Response;
pub use scenario::{Scenario, DEFAULT_REQUEST_TIMEOUT};
pub use traits::ProtocolClient;
pub use validation::{
    ResponseValidator, ValidationErrorKind, ValidationOverrides, ValidationResult, ValidationRules,
};
pub use worker::{RequestRateLimiter, Worker, WorkerBuilder, WorkerExit, WorkerStats};
