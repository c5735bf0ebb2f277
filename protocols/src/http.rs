//! reqwest-backed HTTP client

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method};

use tsunami_core::error::ProtocolError;
use tsunami_core::request::Request;
use tsunami_core::response::Response;
use tsunami_core::traits::ProtocolClient;

/// Idle connections kept per host
pub const DEFAULT_POOL_SIZE: usize = 100;

/// Transport settings for [`HttpClient`]
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Maximum idle connections kept per host
    pub pool_size: usize,

    /// Reuse connections between requests
    pub keep_alive: bool,

    /// Accept invalid TLS certificates
    pub insecure: bool,

    /// Proxy URL applied to every scheme
    pub proxy: Option<String>,

    /// `User-Agent` header value
    pub user_agent: String,

    /// Client-wide timeout, on top of the per-request one
    pub timeout: Option<Duration>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            keep_alive: true,
            insecure: false,
            proxy: None,
            user_agent: format!("Tsunami/{}", env!("CARGO_PKG_VERSION")),
            timeout: None,
        }
    }
}

/// HTTP/1.1 implementation of [`ProtocolClient`]
///
/// One pooled `reqwest::Client` is shared by every worker. `close` drops it;
/// later calls fail with [`ProtocolError::Closed`].
pub struct HttpClient {
    config: HttpConfig,
    client: RwLock<Option<Client>>,
}

impl HttpClient {
    /// Build a client from `config`
    ///
    /// # Errors
    ///
    /// Fails when the proxy URL is invalid or the TLS backend cannot be
    /// initialised.
    pub fn new(config: HttpConfig) -> Result<Self, ProtocolError> {
        let mut builder = Client::builder()
            .user_agent(config.user_agent.clone())
            .danger_accept_invalid_certs(config.insecure);

        builder = if config.keep_alive {
            builder.pool_max_idle_per_host(config.pool_size)
        } else {
            builder.pool_max_idle_per_host(0)
        };

        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy.as_str())
                .map_err(|e| ProtocolError::InvalidRequest(format!("invalid proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| ProtocolError::Other(format!("failed to build HTTP client: {e}")))?;

        tracing::debug!(
            pool_size = config.pool_size,
            keep_alive = config.keep_alive,
            insecure = config.insecure,
            proxy = ?config.proxy,
            "HTTP client ready"
        );

        Ok(Self {
            config,
            client: RwLock::new(Some(client)),
        })
    }

    /// Settings this client was built with
    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.client.read().is_none()
    }

    fn pooled(&self) -> Result<Client, ProtocolError> {
        self.client.read().clone().ok_or(ProtocolError::Closed)
    }
}

#[async_trait]
impl ProtocolClient for HttpClient {
    fn name(&self) -> &str {
        "HTTP"
    }

    fn version(&self) -> &str {
        "1.1"
    }

    async fn execute(&self, request: &Request) -> Result<Response, ProtocolError> {
        let client = self.pooled()?;

        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| ProtocolError::InvalidRequest(format!("bad method {}", request.method)))?;

        let mut builder = client
            .request(method, &request.url)
            .timeout(request.timeout);

        if !request.query_params.is_empty() {
            builder = builder.query(&request.query_params);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let started = Instant::now();
        let response = builder
            .send()
            .await
            .map_err(|e| map_error(e, request.timeout))?;

        let status = response.status().as_u16();
        let headers = flatten_headers(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| map_error(e, request.timeout))?;
        let elapsed = started.elapsed();

        let mut observed = Response::new(status, body.to_vec(), elapsed);
        observed.headers = headers;
        Ok(observed)
    }

    async fn close(&self) -> Result<(), ProtocolError> {
        if self.client.write().take().is_some() {
            tracing::debug!("HTTP client closed");
        }
        Ok(())
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// First value per header name
fn flatten_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut flat = BTreeMap::new();
    for (name, value) in headers {
        flat.entry(name.as_str().to_string())
            .or_insert_with(|| String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    flat
}

fn map_error(err: reqwest::Error, timeout: Duration) -> ProtocolError {
    if err.is_timeout() {
        ProtocolError::Timeout(timeout)
    } else if err.is_connect() {
        ProtocolError::Connection(err.to_string())
    } else if err.is_builder() {
        ProtocolError::InvalidRequest(err.to_string())
    } else if err.is_body() || err.is_decode() {
        ProtocolError::Body(err.to_string())
    } else {
        ProtocolError::Other(err.to_string())
    }
}
