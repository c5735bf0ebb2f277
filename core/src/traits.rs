//! Core traits for protocol clients
//!
//! The trait lives in core so the worker can drive any transport without
//! depending on it. Implementations live in their own crate (protocols/).

use crate::error::ProtocolError;
use crate::request::Request;
use crate::response::Response;
use async_trait::async_trait;

// ============================================================================
// Protocol Client Trait
// ============================================================================

/// Transport capability invoked by every worker
///
/// Implementations own their connection pool and must be safe for concurrent
/// `execute` calls from all workers. A transport failure is returned as
/// `Err`; the worker turns it into a failed [`Response`] so it is still
/// recorded. The per-request timeout is enforced by the caller.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Protocol identifier (e.g. "HTTP")
    fn name(&self) -> &str;

    /// Protocol version string (e.g. "1.1")
    fn version(&self) -> &str;

    /// Execute a request and return the complete response
    async fn execute(&self, request: &Request) -> Result<Response, ProtocolError>;

    /// Release pooled resources
    ///
    /// Called once by the engine after every worker has joined. Calls to
    /// `execute` after `close` fail with [`ProtocolError::Closed`].
    async fn close(&self) -> Result<(), ProtocolError>;
}
