//! Metrics collection and percentile calculation
//!
//! [`MetricsCollector`] is written by every worker and read by the engine and
//! the live display. Integer counters are atomics; keyed distributions and
//! the latency samples sit behind their own short-held locks, so no single
//! lock is taken for a whole observation.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::response::Response;
use crate::validation::ValidationErrorKind;

/// Error bucket key for a failure without text
pub const UNKNOWN_ERROR: &str = "unknown";

/// Latency distribution of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    /// Fastest response
    #[serde(with = "humantime_serde")]
    pub min: Duration,
    /// Slowest response
    #[serde(with = "humantime_serde")]
    pub max: Duration,
    /// Arithmetic mean
    #[serde(with = "humantime_serde")]
    pub mean: Duration,
    /// Median
    #[serde(with = "humantime_serde")]
    pub p50: Duration,
    /// 90th percentile
    #[serde(with = "humantime_serde")]
    pub p90: Duration,
    /// 95th percentile
    #[serde(with = "humantime_serde")]
    pub p95: Duration,
    /// 99th percentile
    #[serde(with = "humantime_serde")]
    pub p99: Duration,
    /// 99.9th percentile
    #[serde(with = "humantime_serde")]
    pub p999: Duration,
}

impl LatencyStats {
    /// Compute the distribution of `samples`, which is sorted in place
    pub fn from_samples(samples: &mut [Duration]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        samples.sort_unstable();

        let total: u128 = samples.iter().map(Duration::as_nanos).sum();
        let mean = Duration::from_nanos((total / samples.len() as u128) as u64);

        Self {
            min: samples[0],
            max: samples[samples.len() - 1],
            mean,
            p50: percentile(samples, 50.0),
            p90: percentile(samples, 90.0),
            p95: percentile(samples, 95.0),
            p99: percentile(samples, 99.0),
            p999: percentile(samples, 99.9),
        }
    }
}

/// Nearest-rank percentile of ascending-sorted samples
///
/// Index is `floor((n - 1) * p / 100)`, clamped to the last sample. Empty
/// input yields zero.
pub fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let last = sorted.len() - 1;
    let idx = ((last as f64) * p.clamp(0.0, 100.0) / 100.0).floor() as usize;
    sorted[idx.min(last)]
}

/// Validation outcome counts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationStats {
    /// Responses validated
    pub total: u64,
    /// Responses passing every rule
    pub passed: u64,
    /// Responses failing a rule
    pub failed: u64,
    /// Failures by rule
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failures_by_kind: BTreeMap<String, u64>,
}

/// Immutable snapshot of a collector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Completed observations (`successful_requests + failed_requests`)
    pub total_requests: u64,
    /// Observations with status < 400 and no transport failure
    pub successful_requests: u64,
    /// Transport failures and error statuses
    pub failed_requests: u64,
    /// `successful / total * 100`, 0 when nothing was recorded
    pub success_rate: f64,
    /// Body bytes received
    pub total_bytes: u64,
    /// Run window (stop - start), zero while the run is open
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Requests per second over the run window
    pub requests_per_second: f64,
    /// Body bytes per second over the run window
    pub bytes_per_second: f64,
    /// Latency distribution
    pub latency: LatencyStats,
    /// Responses by status code (0 = transport failure)
    pub status_codes: BTreeMap<u16, u64>,
    /// Failed requests by error signature
    pub errors: BTreeMap<String, u64>,
    /// Validation outcomes
    pub validation: ValidationStats,
}

impl Summary {
    /// Whether the success rate reaches `threshold` percent
    pub fn meets_success_rate(&self, threshold: f64) -> bool {
        self.success_rate >= threshold
    }
}

/// Counter-level view of a collector, cheap enough to take every tick
///
/// Unlike [`Summary`] it never touches the latency samples beyond running
/// totals, so it carries no percentiles.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Progress {
    /// Completed observations (`successful_requests + failed_requests`)
    pub total_requests: u64,
    /// Observations with status < 400 and no transport failure
    pub successful_requests: u64,
    /// Transport failures and error statuses
    pub failed_requests: u64,
    /// `successful / total * 100`, 0 when nothing was recorded
    pub success_rate: f64,
    /// Body bytes received
    pub total_bytes: u64,
    /// Mean latency so far
    pub mean_latency: Duration,
    /// Slowest response so far
    pub max_latency: Duration,
}

#[derive(Debug, Default)]
struct LatencySamples {
    samples: Vec<Duration>,
    total_nanos: u128,
    max: Duration,
}

impl LatencySamples {
    fn push(&mut self, elapsed: Duration) {
        self.samples.push(elapsed);
        self.total_nanos += elapsed.as_nanos();
        self.max = self.max.max(elapsed);
    }

    fn mean(&self) -> Duration {
        match self.samples.len() as u128 {
            0 => Duration::ZERO,
            n => Duration::from_nanos((self.total_nanos / n) as u64),
        }
    }
}

fn success_rate(successful: u64, total: u64) -> f64 {
    if total > 0 {
        successful as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct RunWindow {
    started_at: Option<Instant>,
    stopped_at: Option<Instant>,
}

/// Concurrent aggregator of request outcomes
///
/// Many writers, any number of readers. Every `record_*` call is counted
/// exactly once; a [`Summary`] taken mid-run is internally consistent for
/// its counters.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    successful: AtomicU64,
    failed: AtomicU64,
    total_bytes: AtomicU64,

    validations: AtomicU64,
    validations_passed: AtomicU64,
    validations_failed: AtomicU64,

    latencies: Mutex<LatencySamples>,
    status_codes: Mutex<BTreeMap<u16, u64>>,
    errors: Mutex<BTreeMap<String, u64>>,
    validation_failures: Mutex<BTreeMap<String, u64>>,
    window: Mutex<RunWindow>,
}

impl MetricsCollector {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the start of the run window
    pub fn start(&self) {
        let mut window = self.window.lock();
        window.started_at = Some(Instant::now());
        window.stopped_at = None;
    }

    /// Mark the end of the run window
    pub fn stop(&self) {
        self.window.lock().stopped_at = Some(Instant::now());
    }

    /// Time since [`start`](Self::start), up to [`stop`](Self::stop) if called
    pub fn elapsed(&self) -> Duration {
        let window = *self.window.lock();
        match (window.started_at, window.stopped_at) {
            (Some(start), Some(stop)) => stop.saturating_duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }

    /// Record one completed observation
    pub fn record_response(&self, response: &Response) {
        self.total_bytes
            .fetch_add(response.content_length, Ordering::Relaxed);

        self.latencies.lock().push(response.elapsed);
        *self.status_codes.lock().entry(response.status).or_insert(0) += 1;

        if response.is_error() {
            let key = match &response.error {
                Some(error) if !error.is_empty() => error.clone(),
                Some(_) => UNKNOWN_ERROR.to_string(),
                None => format!("HTTP {}", response.status),
            };
            *self.errors.lock().entry(key).or_insert(0) += 1;
            self.failed.fetch_add(1, Ordering::AcqRel);
        } else {
            self.successful.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Record one validation outcome
    pub fn record_validation(&self, passed: bool, kind: Option<ValidationErrorKind>) {
        self.validations.fetch_add(1, Ordering::Relaxed);
        if passed {
            self.validations_passed.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.validations_failed.fetch_add(1, Ordering::Relaxed);
        if let Some(kind) = kind {
            *self
                .validation_failures
                .lock()
                .entry(kind.as_str().to_string())
                .or_insert(0) += 1;
        }
    }

    /// Completed observations so far
    pub fn total_requests(&self) -> u64 {
        self.successful.load(Ordering::Acquire) + self.failed.load(Ordering::Acquire)
    }

    /// Counters plus running mean and max latency, without sorting samples
    pub fn progress(&self) -> Progress {
        let successful = self.successful.load(Ordering::Acquire);
        let failed = self.failed.load(Ordering::Acquire);
        let total = successful + failed;
        let (mean_latency, max_latency) = {
            let latencies = self.latencies.lock();
            (latencies.mean(), latencies.max)
        };

        Progress {
            total_requests: total,
            successful_requests: successful,
            failed_requests: failed,
            success_rate: success_rate(successful, total),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            mean_latency,
            max_latency,
        }
    }

    /// Snapshot the current statistics
    ///
    /// Copies and sorts every latency sample; pollers that only need
    /// counters should use [`progress`](Self::progress).
    pub fn summary(&self) -> Summary {
        let successful = self.successful.load(Ordering::Acquire);
        let failed = self.failed.load(Ordering::Acquire);
        let total = successful + failed;
        let total_bytes = self.total_bytes.load(Ordering::Relaxed);

        let success_rate = success_rate(successful, total);

        let duration = {
            let window = *self.window.lock();
            match (window.started_at, window.stopped_at) {
                (Some(start), Some(stop)) => stop.saturating_duration_since(start),
                _ => Duration::ZERO,
            }
        };
        let secs = duration.as_secs_f64();
        let (requests_per_second, bytes_per_second) = if secs > 0.0 {
            (total as f64 / secs, total_bytes as f64 / secs)
        } else {
            (0.0, 0.0)
        };

        let mut samples = self.latencies.lock().samples.clone();
        let latency = LatencyStats::from_samples(&mut samples);

        Summary {
            total_requests: total,
            successful_requests: successful,
            failed_requests: failed,
            success_rate,
            total_bytes,
            duration,
            requests_per_second,
            bytes_per_second,
            latency,
            status_codes: self.status_codes.lock().clone(),
            errors: self.errors.lock().clone(),
            validation: ValidationStats {
                total: self.validations.load(Ordering::Relaxed),
                passed: self.validations_passed.load(Ordering::Relaxed),
                failed: self.validations_failed.load(Ordering::Relaxed),
                failures_by_kind: self.validation_failures.lock().clone(),
            },
        }
    }
}
