//! Worker execution loop

use crate::error::ProtocolError;
use crate::metrics::MetricsCollector;
use crate::pattern::{LoadProfile, Pacing, BASE_UNIT, MAX_PACING_STEP};
use crate::request::Request;
use crate::response::Response;
use crate::traits::ProtocolClient;
use crate::validation::ResponseValidator;

use super::rate_limiter::RequestRateLimiter;
use super::stats::WorkerStats;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a worker stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Cancellation was requested or the run deadline passed
    Cancelled,
    /// The per-user request cap was reached
    ReachedRequestCap,
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerExit::Cancelled => f.write_str("cancelled"),
            WorkerExit::ReachedRequestCap => f.write_str("reached request cap"),
        }
    }
}

/// Timing parameters shared by every worker of a run
#[derive(Debug, Clone, Copy)]
pub struct RunSchedule {
    /// Monotonic instant the run started; pacing is measured against it
    pub run_start: Instant,
    /// Instant after which no new request is issued
    pub deadline: Instant,
    /// Requests per worker, 0 for unbounded
    pub max_requests: u64,
    /// Pause after every request
    pub delay: Duration,
}

impl RunSchedule {
    /// Schedule starting at `run_start` and lasting `duration`
    pub fn new(run_start: Instant, duration: Duration) -> Self {
        Self {
            run_start,
            deadline: run_start + duration,
            max_requests: 0,
            delay: Duration::ZERO,
        }
    }
}

/// One virtual user
///
/// Workers are tokio tasks managed by the [`LoadEngine`](crate::engine::LoadEngine).
/// They share the client, request, validator, profile and collector via Arc.
pub struct Worker {
    /// Unique worker identifier
    id: usize,

    /// Protocol client (shared across workers)
    client: Arc<dyn ProtocolClient>,

    /// Request built once from the scenario
    request: Arc<Request>,

    /// Response validator
    validator: Arc<ResponseValidator>,

    /// Shared metrics sink
    collector: Arc<MetricsCollector>,

    /// Load shape for pacing
    profile: Arc<LoadProfile>,

    /// Aggregate rate limiter (shared)
    rate_limiter: Arc<RequestRateLimiter>,

    /// Run timing
    schedule: RunSchedule,
}

impl Worker {
    /// Create a new worker
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: usize,
        client: Arc<dyn ProtocolClient>,
        request: Arc<Request>,
        validator: Arc<ResponseValidator>,
        collector: Arc<MetricsCollector>,
        profile: Arc<LoadProfile>,
        rate_limiter: Arc<RequestRateLimiter>,
        schedule: RunSchedule,
    ) -> Self {
        Self {
            id,
            client,
            request,
            validator,
            collector,
            profile,
            rate_limiter,
            schedule,
        }
    }

    /// Run the worker loop until cancellation, the deadline or the request cap
    ///
    /// Every issued request is recorded. One in flight when the deadline
    /// passes runs into its remaining-time timeout; one in flight when the
    /// run is stopped early is recorded as a cancelled failure.
    pub async fn run(self, cancel: CancellationToken) -> WorkerStats {
        let mut stats = WorkerStats::new();
        stats.start();

        tracing::debug!(worker_id = self.id, "Worker started");

        // Fraction of a long pacing interval already slept
        let mut credit = 0.0_f64;

        let exit = loop {
            if cancel.is_cancelled() || Instant::now() >= self.schedule.deadline {
                break WorkerExit::Cancelled;
            }
            if self.schedule.max_requests > 0 && stats.requests >= self.schedule.max_requests {
                break WorkerExit::ReachedRequestCap;
            }

            match self.profile.pacing(self.schedule.run_start.elapsed()) {
                Pacing::Idle => {
                    credit = 0.0;
                    stats.idle_ticks += 1;
                    if !pause(BASE_UNIT, &cancel).await {
                        break WorkerExit::Cancelled;
                    }
                    continue;
                }
                Pacing::Immediate => {}
                Pacing::Wait(delay) if delay <= MAX_PACING_STEP => {
                    if !pause(delay, &cancel).await {
                        break WorkerExit::Cancelled;
                    }
                }
                Pacing::Wait(delay) => {
                    if !pause(MAX_PACING_STEP, &cancel).await {
                        break WorkerExit::Cancelled;
                    }
                    credit += MAX_PACING_STEP.as_secs_f64() / delay.as_secs_f64();
                    if credit < 1.0 {
                        continue;
                    }
                }
            }
            credit = 0.0;

            tokio::select! {
                biased;

                _ = cancel.cancelled() => break WorkerExit::Cancelled,
                _ = self.rate_limiter.wait() => {}
            }

            let remaining = self
                .schedule
                .deadline
                .saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break WorkerExit::Cancelled;
            }

            stats.requests += 1;

            let started = Instant::now();
            let call = self.execute_one(remaining);
            tokio::pin!(call);

            let (response, interrupted) = tokio::select! {
                biased;

                response = &mut call => (response, false),
                _ = cancel.cancelled() => {
                    if Instant::now() >= self.schedule.deadline {
                        // Bounded by the remaining run time, so this settles now
                        (call.await, true)
                    } else {
                        tracing::debug!(worker_id = self.id, "Request cut short by stop");
                        let error = ProtocolError::Cancelled.to_string();
                        (Response::failure(error, started.elapsed()), true)
                    }
                }
            };

            self.record(&response, &mut stats);

            if interrupted {
                break WorkerExit::Cancelled;
            }
            if !self.schedule.delay.is_zero() && !pause(self.schedule.delay, &cancel).await {
                break WorkerExit::Cancelled;
            }
        };

        stats.stop(exit);
        tracing::debug!(
            worker_id = self.id,
            exit = %exit,
            requests = stats.requests,
            recorded = stats.recorded,
            failures = stats.failures,
            idle_ticks = stats.idle_ticks,
            elapsed_ms = ?stats.elapsed().map(|d| d.as_millis()),
            "Worker finished"
        );

        stats
    }

    /// Validate a response and feed it to the collector
    fn record(&self, response: &Response, stats: &mut WorkerStats) {
        let result = self.validator.validate(response);
        self.collector.record_validation(result.passed, result.kind);
        self.collector.record_response(response);
        stats.record(response, result.passed);

        if let Some(error) = &response.error {
            tracing::trace!(worker_id = self.id, error = %error, "Request failed");
        }
    }

    /// Execute one request, converting every transport outcome into a Response
    ///
    /// A call cut short by the end of the run is reported with the request
    /// timeout so error buckets stay stable.
    async fn execute_one(&self, remaining: Duration) -> Response {
        let timeout = self.request.timeout.min(remaining);
        let started = Instant::now();

        match tokio::time::timeout(timeout, self.client.execute(&self.request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => Response::failure(e.to_string(), started.elapsed()),
            Err(_) => Response::failure(
                ProtocolError::Timeout(self.request.timeout).to_string(),
                started.elapsed(),
            ),
        }
    }

    /// Get the worker ID
    pub fn id(&self) -> usize {
        self.id
    }
}

/// Sleep unless cancelled first; returns `false` on cancellation
async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;

        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("client", &self.client.name())
            .field("url", &self.request.url)
            .field("pattern", &self.profile.pattern())
            .field("rate_limiter", &self.rate_limiter)
            .field("schedule", &self.schedule)
            .finish()
    }
}
