//! Transport clients for tsunami
//!
//! This crate provides implementations of the `ProtocolClient` trait for:
//!
//! - HTTP/1.1 (reqwest, rustls)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod http;

pub use http::{HttpClient, HttpConfig, DEFAULT_POOL_SIZE};
