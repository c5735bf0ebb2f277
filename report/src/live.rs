//! Live terminal progress

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use tsunami_core::metrics::{MetricsCollector, Progress, Summary};

/// Default refresh interval
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Polls a collector and renders a one-line spinner while a run is live
pub struct LiveReporter {
    collector: Arc<MetricsCollector>,
    interval: Duration,
    bar: ProgressBar,
}

impl LiveReporter {
    /// Reporter drawing to stderr every [`DEFAULT_INTERVAL`]
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );

        Self {
            collector,
            interval: DEFAULT_INTERVAL,
            bar,
        }
    }

    /// Set the refresh interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Draw nothing
    pub fn hidden(mut self) -> Self {
        self.bar = ProgressBar::hidden();
        self
    }

    /// Spawn the polling task
    pub fn start(self) -> LiveHandle {
        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(self.poll(stopped));
        LiveHandle { stop, task }
    }

    async fn poll(self, mut stopped: oneshot::Receiver<()>) -> u64 {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        let mut rate = RollingRate::new(self.collector.total_requests(), Instant::now());
        let mut renders = 0u64;

        loop {
            tokio::select! {
                _ = &mut stopped => break,
                _ = ticker.tick() => {
                    let progress = self.collector.progress();
                    let rps = rate.update(progress.total_requests, Instant::now());
                    self.bar.set_message(progress_line(&progress, rps));
                    self.bar.tick();
                    renders += 1;
                }
            }
        }

        self.bar.finish_and_clear();
        renders
    }
}

/// Running live reporter
pub struct LiveHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<u64>,
}

impl LiveHandle {
    /// Stop polling and clear the spinner
    ///
    /// Returns how many times the display was refreshed.
    pub async fn stop(self) -> u64 {
        // The task may already be gone
        let _ = self.stop.send(());
        match self.task.await {
            Ok(renders) => renders,
            Err(e) => {
                tracing::warn!(error = %e, "Live reporter task failed");
                0
            }
        }
    }
}

/// Requests per second between two polls
struct RollingRate {
    last_total: u64,
    last_at: Instant,
}

impl RollingRate {
    fn new(total: u64, at: Instant) -> Self {
        Self {
            last_total: total,
            last_at: at,
        }
    }

    fn update(&mut self, total: u64, at: Instant) -> f64 {
        let window = at.saturating_duration_since(self.last_at).as_secs_f64();
        let delta = total.saturating_sub(self.last_total);
        self.last_total = total;
        self.last_at = at;

        if window > 0.0 {
            delta as f64 / window
        } else {
            0.0
        }
    }
}

fn progress_line(progress: &Progress, rps: f64) -> String {
    format!(
        "{} requests | {:.2}% ok | {:.1} req/s | mean {} | max {}",
        progress.total_requests,
        progress.success_rate,
        rps,
        short(progress.mean_latency),
        short(progress.max_latency),
    )
}

fn short(duration: Duration) -> String {
    if duration >= Duration::from_secs(1) {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{:.2}ms", duration.as_secs_f64() * 1000.0)
    }
}

/// Final summary block printed after a run
pub fn render_summary(summary: &Summary) -> String {
    let mut out = String::new();
    let rule = "-".repeat(60);

    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, " Tsunami run complete");
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, " Total requests:  {}", summary.total_requests);
    let _ = writeln!(
        out,
        " Successful:      {} ({:.2}%)",
        summary.successful_requests, summary.success_rate
    );
    let _ = writeln!(out, " Failed:          {}", summary.failed_requests);
    let _ = writeln!(out, " Requests/sec:    {:.2}", summary.requests_per_second);
    let _ = writeln!(out, " Duration:        {}", short(summary.duration));

    if summary.total_requests > 0 {
        let latency = &summary.latency;
        let _ = writeln!(
            out,
            " Latency:         min {} | mean {} | p50 {} | p95 {} | p99 {} | max {}",
            short(latency.min),
            short(latency.mean),
            short(latency.p50),
            short(latency.p95),
            short(latency.p99),
            short(latency.max),
        );
    }

    if !summary.status_codes.is_empty() {
        let codes: Vec<String> = summary
            .status_codes
            .iter()
            .map(|(code, count)| format!("{code}: {count}"))
            .collect();
        let _ = writeln!(out, " Status codes:    {}", codes.join(", "));
    }

    if !summary.errors.is_empty() {
        let _ = writeln!(out, " Errors:");
        let mut errors: Vec<_> = summary.errors.iter().collect();
        errors.sort_by(|a, b| b.1.cmp(a.1));
        for (kind, count) in errors {
            let _ = writeln!(out, "   {kind}: {count}");
        }
    }

    if summary.validation.failed > 0 {
        let _ = writeln!(
            out,
            " Validation:      {} passed, {} failed",
            summary.validation.passed, summary.validation.failed
        );
    }

    let _ = write!(out, "{rule}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsunami_core::response::Response;

    #[test]
    fn test_rolling_rate() {
        let start = Instant::now();
        let mut rate = RollingRate::new(0, start);

        let rps = rate.update(50, start + Duration::from_millis(500));
        assert!((rps - 100.0).abs() < 1e-9);

        let rps = rate.update(60, start + Duration::from_millis(1500));
        assert!((rps - 10.0).abs() < 1e-9);

        // Same instant
        assert_eq!(rate.update(70, start + Duration::from_millis(1500)), 0.0);
    }

    #[test]
    fn test_short_durations() {
        assert_eq!(short(Duration::from_micros(1500)), "1.50ms");
        assert_eq!(short(Duration::from_millis(2500)), "2.50s");
        assert_eq!(short(Duration::ZERO), "0.00ms");
    }

    #[test]
    fn test_progress_line() {
        let collector = MetricsCollector::new();
        collector.record_response(&Response::new(200, "ok", Duration::from_millis(10)));
        collector.record_response(&Response::new(500, "no", Duration::from_millis(30)));

        let line = progress_line(&collector.progress(), 12.5);
        assert_eq!(line, "2 requests | 50.00% ok | 12.5 req/s | mean 20.00ms | max 30.00ms");
    }

    #[test]
    fn test_render_summary() {
        let collector = MetricsCollector::new();
        collector.start();
        collector.record_response(&Response::new(200, "ok", Duration::from_millis(10)));
        collector.record_response(&Response::failure("connection failed: refused", Duration::ZERO));
        collector.record_validation(false, None);
        collector.stop();

        let text = render_summary(&collector.summary());
        assert!(text.contains("Total requests:  2"));
        assert!(text.contains("(50.00%)"));
        assert!(text.contains("Status codes:    0: 1, 200: 1"));
        assert!(text.contains("connection failed: refused: 1"));
        assert!(text.contains("0 passed, 1 failed"));
    }

    #[test]
    fn test_render_empty_summary_skips_latency() {
        let text = render_summary(&Summary::default());
        assert!(text.contains("Total requests:  0"));
        assert!(!text.contains("Latency"));
        assert!(!text.contains("Errors"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_reporter_polls_until_stopped() {
        let collector = Arc::new(MetricsCollector::new());
        collector.start();

        let handle = LiveReporter::new(Arc::clone(&collector))
            .with_interval(Duration::from_millis(100))
            .hidden()
            .start();

        collector.record_response(&Response::new(200, "ok", Duration::from_millis(1)));
        tokio::time::sleep(Duration::from_millis(350)).await;

        let renders = handle.stop().await;
        assert_eq!(renders, 3);
    }
}
