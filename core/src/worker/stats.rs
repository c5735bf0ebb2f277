//! Worker statistics tracking

use crate::response::Response;

use super::executor::WorkerExit;

use std::time::Duration;
use tokio::time::Instant;

/// Private counters of one worker
///
/// The collector holds the authoritative run statistics; these exist for
/// per-worker logging and for enforcing the request cap.
#[derive(Debug, Default, Clone)]
pub struct WorkerStats {
    /// Requests issued (the request-cap counter)
    pub requests: u64,

    /// Responses recorded in the collector
    pub recorded: u64,

    /// Recorded responses that counted as failures
    pub failures: u64,

    /// Recorded responses that failed validation
    pub validation_failures: u64,

    /// Pacing ticks spent at zero intensity
    pub idle_ticks: u64,

    /// Why the worker stopped
    pub exit: Option<WorkerExit>,

    /// Worker start time
    pub started_at: Option<Instant>,

    /// Worker end time
    pub ended_at: Option<Instant>,
}

impl WorkerStats {
    /// Create new empty stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking (records start time)
    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    /// Stop tracking with the exit reason
    pub fn stop(&mut self, exit: WorkerExit) {
        self.ended_at = Some(Instant::now());
        self.exit = Some(exit);
    }

    /// Count a recorded response
    pub fn record(&mut self, response: &Response, validation_passed: bool) {
        self.recorded += 1;
        if response.is_error() {
            self.failures += 1;
        }
        if !validation_passed {
            self.validation_failures += 1;
        }
    }

    /// Requests issued but not recorded
    pub fn abandoned(&self) -> u64 {
        self.requests.saturating_sub(self.recorded)
    }

    /// Get elapsed time since start
    pub fn elapsed(&self) -> Option<Duration> {
        self.started_at.map(|start| {
            self.ended_at
                .map(|end| end.duration_since(start))
                .unwrap_or_else(|| start.elapsed())
        })
    }

    /// Merge stats from another worker
    pub fn merge(&mut self, other: &WorkerStats) {
        self.requests += other.requests;
        self.recorded += other.recorded;
        self.failures += other.failures;
        self.validation_failures += other.validation_failures;
        self.idle_ticks += other.idle_ticks;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_stats_defaults() {
        let stats = WorkerStats::default();
        assert_eq!(stats.requests, 0);
        assert_eq!(stats.recorded, 0);
        assert!(stats.exit.is_none());
        assert!(stats.started_at.is_none());
        assert!(stats.elapsed().is_none());
    }

    #[test]
    fn test_worker_stats_record() {
        let mut stats = WorkerStats::new();
        stats.requests = 3;
        stats.record(&Response::new(200, "", Duration::ZERO), true);
        stats.record(&Response::new(500, "", Duration::ZERO), false);

        assert_eq!(stats.recorded, 2);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.validation_failures, 1);
        assert_eq!(stats.abandoned(), 1);
    }

    #[test]
    fn test_worker_stats_merge() {
        let mut a = WorkerStats {
            requests: 10,
            recorded: 10,
            failures: 1,
            idle_ticks: 2,
            ..Default::default()
        };
        let b = WorkerStats {
            requests: 5,
            recorded: 4,
            failures: 2,
            validation_failures: 3,
            ..Default::default()
        };
        a.merge(&b);

        assert_eq!(a.requests, 15);
        assert_eq!(a.recorded, 14);
        assert_eq!(a.failures, 3);
        assert_eq!(a.validation_failures, 3);
        assert_eq!(a.idle_ticks, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_stats_start_stop() {
        let mut stats = WorkerStats::new();
        stats.start();
        tokio::time::sleep(Duration::from_millis(10)).await;
        stats.stop(WorkerExit::ReachedRequestCap);

        assert_eq!(stats.exit, Some(WorkerExit::ReachedRequestCap));
        assert!(stats.elapsed().unwrap() >= Duration::from_millis(10));
    }
}
