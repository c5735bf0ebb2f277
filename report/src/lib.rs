//! Report generation for tsunami runs
//!
//! This crate provides:
//!
//! - JSON reports built from a run summary
//! - A live terminal progress display

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::path::PathBuf;

use thiserror::Error;

pub mod json;
pub mod live;

pub use json::{write_report, JsonReport};
pub use live::{render_summary, LiveHandle, LiveReporter, DEFAULT_INTERVAL};

/// Report output errors
#[derive(Debug, Error)]
pub enum ReportError {
    /// Report could not be serialized
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Report file could not be written
    #[error("failed to write report to {}: {source}", path.display())]
    Write {
        /// Target file
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Writing to stdout failed
    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for report operations
pub type ReportResult<T> = Result<T, ReportError>;
