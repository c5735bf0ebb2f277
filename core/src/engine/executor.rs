//! Engine execution logic

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::RunConfig;
use crate::error::{EngineError, EngineResult};
use crate::metrics::{MetricsCollector, Summary};
use crate::pattern::LoadProfile;
use crate::request::Request;
use crate::traits::ProtocolClient;
use crate::validation::ResponseValidator;
use crate::worker::{RequestRateLimiter, WorkerBuilder, WorkerStats};

use super::aggregator::aggregate_worker_stats;

/// Extra time past the run duration allowed for workers to wind down
pub const GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Cloneable handle that stops a running engine
#[derive(Debug, Clone)]
pub struct StopHandle {
    cancel: CancellationToken,
    requested: Arc<AtomicBool>,
}

impl StopHandle {
    fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request early cancellation
    ///
    /// Returns `true` for the call that cancelled the run; later calls do
    /// nothing and return `false`.
    pub fn stop(&self) -> bool {
        if self.requested.swap(true, Ordering::AcqRel) {
            return false;
        }
        tracing::info!("Stop requested, cancelling workers");
        self.cancel.cancel();
        true
    }

    /// Whether a stop was requested
    pub fn is_stopped(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

/// LoadEngine manages one run
///
/// Responsible for spawning workers, coordinating cancellation,
/// and producing the final summary. An engine runs once.
pub struct LoadEngine {
    /// Run configuration
    pub(crate) config: RunConfig,

    /// Protocol client (shared across workers)
    pub(crate) client: Arc<dyn ProtocolClient>,

    /// Request built from the scenario
    pub(crate) request: Arc<Request>,

    /// Validator with overrides applied
    pub(crate) validator: Arc<ResponseValidator>,

    /// Load shape
    pub(crate) profile: Arc<LoadProfile>,

    /// Statistics sink
    pub(crate) collector: Arc<MetricsCollector>,

    /// Aggregate rate limiter
    pub(crate) rate_limiter: Arc<RequestRateLimiter>,

    /// Shared cancellation
    pub(crate) stop: StopHandle,

    /// Set once `run` has been entered
    pub(crate) started: AtomicBool,
}

impl LoadEngine {
    /// Create a new engine
    ///
    /// Use `EngineBuilder` for a more ergonomic construction.
    pub fn new(
        config: RunConfig,
        client: Arc<dyn ProtocolClient>,
        request: Request,
        validator: ResponseValidator,
        collector: Arc<MetricsCollector>,
    ) -> Self {
        let profile = Arc::new(LoadProfile::from_config(&config));
        let rate_limiter = Arc::new(RequestRateLimiter::new(config.rate_limit));

        Self {
            config,
            client,
            request: Arc::new(request),
            validator: Arc::new(validator),
            profile,
            collector,
            rate_limiter,
            stop: StopHandle::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Get the run configuration
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Get the request every worker sends
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Shared collector, for live displays
    pub fn collector(&self) -> Arc<MetricsCollector> {
        Arc::clone(&self.collector)
    }

    /// Handle that stops this engine from another task
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Request early cancellation; see [`StopHandle::stop`]
    pub fn stop(&self) -> bool {
        self.stop.stop()
    }

    /// Run the load test
    ///
    /// Spawns the workers, waits until the deadline, an explicit stop or all
    /// workers finishing, joins them and returns the final summary.
    pub async fn run(&self) -> EngineResult<Summary> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(EngineError::orchestration("engine has already been run"));
        }

        let worker_count = self.config.worker_count();
        tracing::info!(
            virtual_users = worker_count,
            duration = ?self.config.duration,
            pattern = %self.config.pattern,
            max_requests = self.config.max_requests,
            rate_limit = ?self.config.rate_limit,
            url = %self.request.url,
            "Starting load test"
        );

        self.collector.start();
        let run_start = Instant::now();
        let deadline = run_start + self.config.duration;
        let hard_limit = deadline + GRACE_PERIOD;

        let mut workers = JoinSet::new();
        for worker_id in 0..worker_count {
            let worker = WorkerBuilder::new(worker_id)
                .client(Arc::clone(&self.client))
                .request(Arc::clone(&self.request))
                .validator(Arc::clone(&self.validator))
                .collector(Arc::clone(&self.collector))
                .profile(Arc::clone(&self.profile))
                .rate_limiter(Arc::clone(&self.rate_limiter))
                .run_start(run_start)
                .deadline(deadline)
                .max_requests(self.config.max_requests)
                .delay(self.config.delay)
                .build()?;

            workers.spawn(worker.run(self.stop.cancel.child_token()));
        }

        let mut results = Vec::with_capacity(worker_count);
        let mut worker_failures = 0usize;

        let finished_early = tokio::select! {
            biased;

            _ = self.stop.cancel.cancelled() => false,
            _ = tokio::time::sleep_until(deadline) => false,
            _ = join_all(&mut workers, &mut results, &mut worker_failures) => true,
        };

        if finished_early {
            tracing::debug!("All workers finished before the deadline");
        }
        self.stop.cancel.cancel();

        if tokio::time::timeout_at(
            hard_limit,
            join_all(&mut workers, &mut results, &mut worker_failures),
        )
        .await
        .is_err()
        {
            tracing::warn!(
                remaining = workers.len(),
                grace = ?GRACE_PERIOD,
                "Workers did not stop within the grace period, aborting them"
            );
            workers.abort_all();
            while let Some(joined) = workers.join_next().await {
                if let Ok(stats) = joined {
                    results.push(stats);
                }
            }
        }

        self.collector.stop();

        if let Err(e) = self.client.close().await {
            tracing::warn!(error = %e, "Failed to close protocol client");
        }

        if results.is_empty() && worker_failures > 0 {
            return Err(EngineError::orchestration(format!(
                "All {worker_failures} workers failed to complete"
            )));
        }

        let aggregated = aggregate_worker_stats(&results);
        let summary = self.collector.summary();
        tracing::info!(
            elapsed_secs = run_start.elapsed().as_secs_f64(),
            total_requests = summary.total_requests,
            failed_requests = summary.failed_requests,
            success_rate = summary.success_rate,
            capped_workers = aggregated.capped_workers,
            abandoned = aggregated.abandoned(),
            "Load test completed"
        );

        Ok(summary)
    }

    /// Run with Ctrl+C signal handling
    ///
    /// The first Ctrl+C stops the engine gracefully.
    pub async fn run_with_signal_handling(&self) -> EngineResult<Summary> {
        let stop = self.stop_handle();

        let signal_handle = tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
                    stop.stop();
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                }
            }
        });

        let result = self.run().await;
        signal_handle.abort();

        result
    }
}

/// Join every worker, counting panicked tasks
async fn join_all(
    workers: &mut JoinSet<WorkerStats>,
    results: &mut Vec<WorkerStats>,
    failures: &mut usize,
) {
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(stats) => results.push(stats),
            Err(e) => {
                *failures += 1;
                tracing::error!(error = %e, "Worker task panicked");
            }
        }
    }
}

impl std::fmt::Debug for LoadEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadEngine")
            .field("config", &self.config)
            .field("client", &self.client.name())
            .field("url", &self.request.url)
            .finish()
    }
}
