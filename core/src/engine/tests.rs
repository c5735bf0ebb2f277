//! Tests for the engine module

use super::aggregator::{aggregate_worker_stats, AggregatedStats};
use super::builder::EngineBuilder;
use crate::config::RunConfig;
use crate::error::{ErrorCategory, ProtocolError};
use crate::metrics::MetricsCollector;
use crate::pattern::LoadPattern;
use crate::request::Request;
use crate::response::Response;
use crate::scenario::Scenario;
use crate::traits::ProtocolClient;
use crate::validation::{ValidationOverrides, ValidationRules};
use crate::worker::{WorkerExit, WorkerStats};

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

// ============================================================================
// Mock ProtocolClient
// ============================================================================

struct MockClient {
    delay: Option<Duration>,
    status: u16,
    counter: AtomicUsize,
    closed: AtomicBool,
}

impl MockClient {
    fn new() -> Self {
        Self {
            delay: None,
            status: 200,
            counter: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    fn calls(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProtocolClient for MockClient {
    fn name(&self) -> &str {
        "MOCK"
    }

    fn version(&self) -> &str {
        "0"
    }

    async fn execute(&self, _request: &Request) -> Result<Response, ProtocolError> {
        if self.is_closed() {
            return Err(ProtocolError::Closed);
        }
        self.counter.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        Ok(Response::new(self.status, "pong", started.elapsed()))
    }

    async fn close(&self) -> Result<(), ProtocolError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn scenario() -> Scenario {
    Scenario::new("ping", "GET", "http://localhost:9", "/ping")
}

fn engine_with(client: &Arc<MockClient>, config: RunConfig) -> super::LoadEngine {
    EngineBuilder::new()
        .scenario(scenario())
        .config(config)
        .client(Arc::clone(client) as Arc<dyn ProtocolClient>)
        .build()
        .expect("Failed to build engine")
}

// ============================================================================
// Unit Tests
// ============================================================================

#[test]
fn test_aggregated_stats_default() {
    let stats = AggregatedStats::default();
    assert_eq!(stats.total_workers, 0);
    assert_eq!(stats.total_requests, 0);
    assert_eq!(stats.abandoned(), 0);
}

#[test]
fn test_aggregate_worker_stats_empty() {
    let stats = aggregate_worker_stats(&[]);
    assert_eq!(stats.total_workers, 0);
    assert_eq!(stats.total_recorded, 0);
}

#[tokio::test(start_paused = true)]
async fn test_aggregate_worker_stats() {
    let mut s1 = WorkerStats::new();
    s1.requests = 50;
    s1.recorded = 50;
    s1.failures = 5;
    s1.start();
    tokio::time::sleep(Duration::from_millis(10)).await;
    s1.stop(WorkerExit::ReachedRequestCap);

    let mut s2 = WorkerStats::new();
    s2.requests = 40;
    s2.recorded = 39;
    s2.validation_failures = 2;
    s2.start();
    s2.stop(WorkerExit::Cancelled);

    let aggregated = aggregate_worker_stats(&[s1, s2]);

    assert_eq!(aggregated.total_workers, 2);
    assert_eq!(aggregated.total_requests, 90);
    assert_eq!(aggregated.total_recorded, 89);
    assert_eq!(aggregated.total_failures, 5);
    assert_eq!(aggregated.total_validation_failures, 2);
    assert_eq!(aggregated.capped_workers, 1);
    assert_eq!(aggregated.cancelled_workers, 1);
    assert_eq!(aggregated.abandoned(), 1);
    assert!(aggregated.total_duration >= Duration::from_millis(10));
}

#[test]
fn test_builder_missing_client() {
    let result = EngineBuilder::new().scenario(scenario()).build();

    let err = result.unwrap_err();
    assert_eq!(err.category, ErrorCategory::MissingConfig);
    assert!(err.message.contains("client"));
}

#[test]
fn test_builder_missing_scenario() {
    let client: Arc<dyn ProtocolClient> = Arc::new(MockClient::new());
    let result = EngineBuilder::new().client(client).build();

    assert!(result.is_err());
}

#[test]
fn test_builder_invalid_config() {
    let client: Arc<dyn ProtocolClient> = Arc::new(MockClient::new());
    let result = EngineBuilder::new()
        .scenario(scenario())
        .client(client)
        .config(RunConfig::new(1, Duration::ZERO))
        .build();

    let err = result.unwrap_err();
    assert_eq!(err.category, ErrorCategory::Config);
}

#[test]
fn test_builder_invalid_rules() {
    let client: Arc<dyn ProtocolClient> = Arc::new(MockClient::new());
    let mut scenario = scenario();
    scenario.validation = Some(ValidationRules {
        min_response_size: Some(10),
        max_response_size: Some(5),
        ..Default::default()
    });

    let result = EngineBuilder::new()
        .scenario(scenario)
        .client(client)
        .build();

    assert_eq!(result.unwrap_err().category, ErrorCategory::Config);
}

#[test]
fn test_builder_applies_timeout_override() {
    let client = Arc::new(MockClient::new());
    let engine = engine_with(
        &client,
        RunConfig::new(1, Duration::from_secs(5)).with_timeout(Duration::from_millis(750)),
    );
    assert_eq!(engine.request().timeout, Duration::from_millis(750));
    assert_eq!(engine.request().url, "http://localhost:9/ping");
}

// ============================================================================
// Integration Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_request_cap_yields_exactly_one_per_worker() {
    let client = Arc::new(MockClient::new());
    let engine = engine_with(
        &client,
        RunConfig::new(6, Duration::from_secs(30)).with_max_requests(1),
    );

    let start = Instant::now();
    let summary = engine.run().await.expect("Run failed");

    assert_eq!(summary.total_requests, 6);
    assert_eq!(summary.successful_requests, 6);
    assert_eq!(client.calls(), 6);
    assert!(client.is_closed());
    // Workers finishing on their own end the run before the deadline
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_run_stops_at_deadline() {
    let client = Arc::new(MockClient::new().with_delay(Duration::from_millis(10)));
    let engine = engine_with(&client, RunConfig::new(2, Duration::from_secs(2)));

    let start = Instant::now();
    let summary = engine.run().await.expect("Run failed");
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_secs(2));
    assert!(elapsed < Duration::from_secs(2) + super::GRACE_PERIOD);
    assert!(summary.total_requests > 0);
    assert_eq!(
        summary.total_requests,
        summary.successful_requests + summary.failed_requests
    );
    assert!(client.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_stop_mid_run_still_yields_summary() {
    let client = Arc::new(MockClient::new().with_delay(Duration::from_millis(20)));
    let engine = engine_with(&client, RunConfig::new(3, Duration::from_secs(60)));

    let start = Instant::now();
    let (result, (first_stop, second_stop)) = tokio::join!(engine.run(), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        (engine.stop(), engine.stop())
    });

    assert!(first_stop);
    assert!(!second_stop);

    let summary = result.expect("Run failed");
    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(summary.total_requests > 0);
    assert_eq!(
        summary.total_requests,
        summary.successful_requests + summary.failed_requests
    );
    let cancelled = summary.errors.get("request cancelled").copied().unwrap_or(0);
    assert!(cancelled <= 3);
    assert_eq!(
        summary.status_codes[&200] + cancelled,
        summary.total_requests
    );
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_requests_at_deadline_are_recorded() {
    let client = Arc::new(MockClient::new().with_delay(Duration::from_millis(1500)));
    let engine = engine_with(
        &client,
        RunConfig::new(4, Duration::from_millis(500)).with_max_requests(1),
    );

    let start = Instant::now();
    let summary = engine.run().await.expect("Run failed");

    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(client.calls(), 4);
    assert_eq!(summary.total_requests, 4);
    assert_eq!(summary.failed_requests, 4);
    assert_eq!(summary.status_codes[&0], 4);
    assert_eq!(summary.errors["request timed out after 30s"], 4);
}

#[tokio::test(start_paused = true)]
async fn test_run_twice_is_rejected() {
    let client = Arc::new(MockClient::new());
    let engine = engine_with(
        &client,
        RunConfig::new(1, Duration::from_secs(5)).with_max_requests(1),
    );

    engine.run().await.expect("first run");
    let err = engine.run().await.unwrap_err();
    assert_eq!(err.category, ErrorCategory::Orchestration);
}

#[tokio::test(start_paused = true)]
async fn test_overrides_replace_scenario_rules() {
    let client = Arc::new(MockClient::new().with_status(404));
    let config = RunConfig::new(2, Duration::from_secs(10))
        .with_max_requests(2)
        .with_overrides(ValidationOverrides {
            expect_status: vec![404],
            ..Default::default()
        });
    let engine = engine_with(&client, config);

    let summary = engine.run().await.expect("Run failed");

    assert_eq!(summary.total_requests, 4);
    assert_eq!(summary.failed_requests, 4);
    assert_eq!(summary.errors["HTTP 404"], 4);
    assert_eq!(summary.validation.passed, 4);
    assert_eq!(summary.validation.failed, 0);
}

#[tokio::test(start_paused = true)]
async fn test_shared_collector_is_visible_during_run() {
    let client = Arc::new(MockClient::new());
    let collector = Arc::new(MetricsCollector::new());
    let engine = EngineBuilder::new()
        .scenario(scenario())
        .config(RunConfig::new(2, Duration::from_secs(3)).with_pattern(LoadPattern::Stress))
        .client(Arc::clone(&client) as Arc<dyn ProtocolClient>)
        .collector(Arc::clone(&collector))
        .build()
        .expect("Failed to build engine");

    let (summary, midway) = tokio::join!(engine.run(), async {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        collector.summary()
    });

    let summary = summary.expect("Run failed");
    assert!(midway.total_requests > 0);
    assert!(midway.total_requests <= summary.total_requests);
    assert_eq!(engine.collector().summary(), collector.summary());
}
