//! Builder pattern for Worker construction

use crate::error::{EngineError, EngineResult};
use crate::metrics::MetricsCollector;
use crate::pattern::LoadProfile;
use crate::request::Request;
use crate::traits::ProtocolClient;
use crate::validation::ResponseValidator;

use super::executor::{RunSchedule, Worker};
use super::rate_limiter::RequestRateLimiter;

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Builder for creating Worker instances
///
/// Client, request, validator, collector, profile and run start are
/// required. The deadline defaults to the run start plus the profile length.
///
/// # Example
/// ```ignore
/// let worker = WorkerBuilder::new(0)
///     .client(client)
///     .request(request)
///     .validator(validator)
///     .collector(collector)
///     .profile(profile)
///     .run_start(Instant::now())
///     .build()?;
/// ```
pub struct WorkerBuilder {
    id: usize,
    client: Option<Arc<dyn ProtocolClient>>,
    request: Option<Arc<Request>>,
    validator: Option<Arc<ResponseValidator>>,
    collector: Option<Arc<MetricsCollector>>,
    profile: Option<Arc<LoadProfile>>,
    rate_limiter: Option<Arc<RequestRateLimiter>>,
    run_start: Option<Instant>,
    deadline: Option<Instant>,
    max_requests: u64,
    delay: Duration,
}

impl WorkerBuilder {
    /// Create a new builder with the given worker ID
    pub fn new(id: usize) -> Self {
        Self {
            id,
            client: None,
            request: None,
            validator: None,
            collector: None,
            profile: None,
            rate_limiter: None,
            run_start: None,
            deadline: None,
            max_requests: 0,
            delay: Duration::ZERO,
        }
    }

    /// Set the protocol client
    pub fn client(mut self, client: Arc<dyn ProtocolClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the request to send
    pub fn request(mut self, request: Arc<Request>) -> Self {
        self.request = Some(request);
        self
    }

    /// Set the response validator
    pub fn validator(mut self, validator: Arc<ResponseValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Set the metrics collector
    pub fn collector(mut self, collector: Arc<MetricsCollector>) -> Self {
        self.collector = Some(collector);
        self
    }

    /// Set the load profile
    pub fn profile(mut self, profile: Arc<LoadProfile>) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Set the shared rate limiter
    pub fn rate_limiter(mut self, limiter: Arc<RequestRateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Set the run start instant
    pub fn run_start(mut self, start: Instant) -> Self {
        self.run_start = Some(start);
        self
    }

    /// Set the run deadline
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set the per-worker request cap (0 = unbounded)
    pub fn max_requests(mut self, max: u64) -> Self {
        self.max_requests = max;
        self
    }

    /// Set the inter-request delay
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Build the Worker
    ///
    /// # Errors
    /// Returns an error if any required field is missing.
    pub fn build(self) -> EngineResult<Worker> {
        let client = self.client.ok_or(EngineError::missing_config("client"))?;
        let request = self.request.ok_or(EngineError::missing_config("request"))?;
        let validator = self
            .validator
            .ok_or(EngineError::missing_config("validator"))?;
        let collector = self
            .collector
            .ok_or(EngineError::missing_config("collector"))?;
        let profile = self.profile.ok_or(EngineError::missing_config("profile"))?;
        let run_start = self
            .run_start
            .ok_or(EngineError::missing_config("run_start"))?;

        let deadline = self
            .deadline
            .unwrap_or_else(|| run_start + profile.total_duration());
        let rate_limiter = self
            .rate_limiter
            .unwrap_or_else(|| Arc::new(RequestRateLimiter::unlimited()));

        let schedule = RunSchedule {
            run_start,
            deadline,
            max_requests: self.max_requests,
            delay: self.delay,
        };

        Ok(Worker::new(
            self.id,
            client,
            request,
            validator,
            collector,
            profile,
            rate_limiter,
            schedule,
        ))
    }
}
