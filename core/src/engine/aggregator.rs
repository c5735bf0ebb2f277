//! Result aggregation from multiple workers

use std::time::Duration;

use crate::worker::{WorkerExit, WorkerStats};

/// Aggregated statistics from all workers
#[derive(Debug, Clone, Default)]
pub struct AggregatedStats {
    /// Number of workers that returned stats
    pub total_workers: usize,

    /// Requests issued
    pub total_requests: u64,

    /// Responses recorded
    pub total_recorded: u64,

    /// Recorded failures
    pub total_failures: u64,

    /// Recorded validation failures
    pub total_validation_failures: u64,

    /// Pacing ticks spent idle
    pub total_idle_ticks: u64,

    /// Workers that stopped at their request cap
    pub capped_workers: usize,

    /// Workers that stopped on cancellation or the deadline
    pub cancelled_workers: usize,

    /// Longest worker lifetime
    pub total_duration: Duration,
}

impl AggregatedStats {
    /// Requests issued but never recorded
    pub fn abandoned(&self) -> u64 {
        self.total_requests.saturating_sub(self.total_recorded)
    }
}

/// Aggregate statistics from multiple workers
pub fn aggregate_worker_stats(stats: &[WorkerStats]) -> AggregatedStats {
    if stats.is_empty() {
        return AggregatedStats::default();
    }

    let mut merged = WorkerStats::new();
    for s in stats {
        merged.merge(s);
    }

    let exits = |kind: WorkerExit| stats.iter().filter(|s| s.exit == Some(kind)).count();

    // Use the maximum elapsed time across all workers
    let total_duration = stats
        .iter()
        .filter_map(|s| s.elapsed())
        .max()
        .unwrap_or(Duration::ZERO);

    AggregatedStats {
        total_workers: stats.len(),
        total_requests: merged.requests,
        total_recorded: merged.recorded,
        total_failures: merged.failures,
        total_validation_failures: merged.validation_failures,
        total_idle_ticks: merged.idle_ticks,
        capped_workers: exits(WorkerExit::ReachedRequestCap),
        cancelled_workers: exits(WorkerExit::Cancelled),
        total_duration,
    }
}
