//! JSON run report

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use tsunami_core::config::RunConfig;
use tsunami_core::metrics::{LatencyStats, Summary};
use tsunami_core::scenario::Scenario;

use crate::{ReportError, ReportResult};

const TOOL_NAME: &str = "Tsunami";

/// Complete report of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonReport {
    /// Tool, time and scenario identification
    pub metadata: ReportMetadata,
    /// Effective run configuration
    pub configuration: ReportConfiguration,
    /// Request totals
    pub summary: ReportSummary,
    /// Latency table
    pub latency: ReportLatency,
    /// Throughput over the run window
    pub throughput: ReportThroughput,
    /// Error signatures, most frequent first
    pub errors: Vec<ReportErrorEntry>,
    /// Responses by status code
    pub status_codes: BTreeMap<String, u64>,
    /// Validation outcome
    pub validation: ReportValidation,
}

/// Report metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Tool name
    pub tool: String,
    /// Tool version
    pub version: String,
    /// Generation time, RFC 3339
    pub timestamp: String,
    /// Scenario name
    pub scenario: String,
    /// HTTP method
    pub method: String,
    /// Target URL
    pub url: String,
}

/// Run configuration as reported
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfiguration {
    /// Virtual users
    pub virtual_users: usize,
    /// Configured run length
    pub duration: String,
    /// Ramp-up length
    pub ramp_up: String,
    /// Ramp-down length
    pub ramp_down: String,
    /// Pause after every request
    pub delay: String,
    /// Load pattern name
    pub pattern: String,
    /// Per-user request cap, 0 when unbounded
    pub max_requests: u64,
    /// Request timeout override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    /// Aggregate rate limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<f64>,
}

/// Request totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Completed observations
    pub total_requests: u64,
    /// Observations without a failure or error status
    pub successful_requests: u64,
    /// Transport failures and error statuses
    pub failed_requests: u64,
    /// Successful share, in percent
    pub success_rate: f64,
    /// Body bytes received
    pub total_bytes: u64,
    /// Measured run window
    pub total_duration: String,
}

/// Latency table in human-readable durations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct ReportLatency {
    pub min: String,
    pub mean: String,
    pub median: String,
    pub p90: String,
    pub p95: String,
    pub p99: String,
    #[serde(rename = "p99.9")]
    pub p999: String,
    pub max: String,
}

/// Throughput figures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportThroughput {
    /// Completed requests per second
    pub requests_per_second: f64,
    /// Body bytes per second
    pub bytes_per_second: f64,
}

/// One error signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportErrorEntry {
    /// Error text or `HTTP <status>`
    #[serde(rename = "type")]
    pub kind: String,
    /// Occurrences
    pub count: u64,
    /// Share of all errors, in percent
    pub percentage: f64,
}

/// Validation outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportValidation {
    /// Responses validated
    pub total: u64,
    /// Responses passing every rule
    pub passed: u64,
    /// Responses failing a rule
    pub failed: u64,
    /// Passed share of validated responses, in percent
    pub pass_rate: f64,
    /// Failures by rule
    pub failures_by_kind: BTreeMap<String, u64>,
}

impl JsonReport {
    /// Build a report stamped with the current time
    pub fn new(summary: &Summary, scenario: &Scenario, config: &RunConfig) -> Self {
        Self::generated_at(summary, scenario, config, Utc::now())
    }

    /// Build a report stamped with `timestamp`
    pub fn generated_at(
        summary: &Summary,
        scenario: &Scenario,
        config: &RunConfig,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let validation = &summary.validation;
        let pass_rate = if validation.total > 0 {
            validation.passed as f64 / validation.total as f64 * 100.0
        } else {
            0.0
        };

        Self {
            metadata: ReportMetadata {
                tool: TOOL_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
                scenario: scenario.name.clone(),
                method: scenario.method.to_uppercase(),
                url: scenario.full_url(),
            },
            configuration: ReportConfiguration {
                virtual_users: config.virtual_users,
                duration: human(config.duration),
                ramp_up: human(config.ramp_up),
                ramp_down: human(config.ramp_down),
                delay: human(config.delay),
                pattern: config.pattern.to_string(),
                max_requests: config.max_requests,
                timeout: config.timeout.map(human),
                rate_limit: config.rate_limit,
            },
            summary: ReportSummary {
                total_requests: summary.total_requests,
                successful_requests: summary.successful_requests,
                failed_requests: summary.failed_requests,
                success_rate: summary.success_rate,
                total_bytes: summary.total_bytes,
                total_duration: human(summary.duration),
            },
            latency: latency_table(&summary.latency),
            throughput: ReportThroughput {
                requests_per_second: summary.requests_per_second,
                bytes_per_second: summary.bytes_per_second,
            },
            errors: error_entries(&summary.errors),
            status_codes: summary
                .status_codes
                .iter()
                .map(|(code, count)| (code.to_string(), *count))
                .collect(),
            validation: ReportValidation {
                total: validation.total,
                passed: validation.passed,
                failed: validation.failed,
                pass_rate,
                failures_by_kind: validation.failures_by_kind.clone(),
            },
        }
    }

    /// Pretty-printed JSON
    pub fn to_json_pretty(&self) -> ReportResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Write `report` as pretty JSON to `path`, or to stdout when `None`
pub fn write_report(report: &JsonReport, path: Option<&Path>) -> ReportResult<()> {
    let json = report.to_json_pretty()?;

    match path {
        Some(path) => {
            std::fs::write(path, json.as_bytes()).map_err(|source| ReportError::Write {
                path: path.to_path_buf(),
                source,
            })?;
            tracing::info!(path = %path.display(), "Report written");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(json.as_bytes())?;
            stdout.write_all(b"\n")?;
        }
    }

    Ok(())
}

/// Duration rounded to microseconds, in humantime form
fn human(duration: Duration) -> String {
    let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
    humantime::format_duration(Duration::from_micros(micros)).to_string()
}

fn latency_table(latency: &LatencyStats) -> ReportLatency {
    ReportLatency {
        min: human(latency.min),
        mean: human(latency.mean),
        median: human(latency.p50),
        p90: human(latency.p90),
        p95: human(latency.p95),
        p99: human(latency.p99),
        p999: human(latency.p999),
        max: human(latency.max),
    }
}

fn error_entries(errors: &BTreeMap<String, u64>) -> Vec<ReportErrorEntry> {
    let total: u64 = errors.values().sum();

    let mut entries: Vec<ReportErrorEntry> = errors
        .iter()
        .map(|(kind, count)| ReportErrorEntry {
            kind: kind.clone(),
            count: *count,
            percentage: if total > 0 {
                *count as f64 / total as f64 * 100.0
            } else {
                0.0
            },
        })
        .collect();

    // BTreeMap order breaks ties alphabetically
    entries.sort_by(|a, b| b.count.cmp(&a.count));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tsunami_core::metrics::ValidationStats;
    use tsunami_core::pattern::LoadPattern;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn summary() -> Summary {
        let mut errors = BTreeMap::new();
        errors.insert("HTTP 500".to_string(), 6);
        errors.insert("connection failed: refused".to_string(), 2);
        errors.insert("HTTP 404".to_string(), 2);

        let mut status_codes = BTreeMap::new();
        status_codes.insert(0, 2);
        status_codes.insert(200, 90);
        status_codes.insert(404, 2);
        status_codes.insert(500, 6);

        let mut failures_by_kind = BTreeMap::new();
        failures_by_kind.insert("status_code".to_string(), 8);

        Summary {
            total_requests: 100,
            successful_requests: 90,
            failed_requests: 10,
            success_rate: 90.0,
            total_bytes: 4096,
            duration: Duration::from_secs(10),
            requests_per_second: 10.0,
            bytes_per_second: 409.6,
            latency: LatencyStats {
                min: ms(100),
                max: ms(500),
                mean: ms(300),
                p50: ms(300),
                p90: ms(460),
                p95: ms(480),
                p99: ms(496),
                p999: Duration::from_micros(499_600),
            },
            status_codes,
            errors,
            validation: ValidationStats {
                total: 100,
                passed: 92,
                failed: 8,
                failures_by_kind,
            },
        }
    }

    fn scenario() -> Scenario {
        Scenario::new("checkout", "post", "http://localhost:8080", "/api/checkout")
    }

    fn config() -> RunConfig {
        RunConfig::new(25, Duration::from_secs(10))
            .with_ramps(Duration::from_secs(2), Duration::from_secs(1))
            .with_pattern(LoadPattern::Spike)
            .with_timeout(Duration::from_millis(1500))
    }

    fn report() -> JsonReport {
        let timestamp = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        JsonReport::generated_at(&summary(), &scenario(), &config(), timestamp)
    }

    #[test]
    fn test_metadata() {
        let report = report();
        assert_eq!(report.metadata.tool, "Tsunami");
        assert_eq!(report.metadata.timestamp, "2024-03-01T12:30:00Z");
        assert_eq!(report.metadata.scenario, "checkout");
        assert_eq!(report.metadata.method, "POST");
        assert_eq!(report.metadata.url, "http://localhost:8080/api/checkout");
    }

    #[test]
    fn test_configuration_uses_human_durations() {
        let configuration = report().configuration;
        assert_eq!(configuration.virtual_users, 25);
        assert_eq!(configuration.duration, "10s");
        assert_eq!(configuration.ramp_up, "2s");
        assert_eq!(configuration.delay, "0s");
        assert_eq!(configuration.pattern, "spike");
        assert_eq!(configuration.timeout.as_deref(), Some("1s 500ms"));
        assert_eq!(configuration.rate_limit, None);
    }

    #[test]
    fn test_latency_table() {
        let latency = report().latency;
        assert_eq!(latency.min, "100ms");
        assert_eq!(latency.median, "300ms");
        assert_eq!(latency.p999, "499ms 600us");
        assert_eq!(latency.max, "500ms");
    }

    #[test]
    fn test_errors_sorted_with_percentages() {
        let errors = report().errors;
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].kind, "HTTP 500");
        assert_eq!(errors[0].count, 6);
        assert!((errors[0].percentage - 60.0).abs() < 1e-9);
        // Ties keep alphabetical order
        assert_eq!(errors[1].kind, "HTTP 404");
        assert_eq!(errors[2].kind, "connection failed: refused");
        let total: f64 = errors.iter().map(|e| e.percentage).sum();
        assert!((total - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_status_codes_and_validation() {
        let report = report();
        assert_eq!(report.status_codes["200"], 90);
        assert_eq!(report.status_codes["0"], 2);
        assert_eq!(report.validation.failed, 8);
        assert!((report.validation.pass_rate - 92.0).abs() < 1e-9);
        assert_eq!(report.validation.failures_by_kind["status_code"], 8);
    }

    #[test]
    fn test_empty_summary_report() {
        let report = JsonReport::new(&Summary::default(), &scenario(), &config());
        assert!(report.errors.is_empty());
        assert!(report.status_codes.is_empty());
        assert_eq!(report.validation.pass_rate, 0.0);
        assert_eq!(report.summary.total_duration, "0s");
    }

    #[test]
    fn test_json_field_names() {
        let value: serde_json::Value =
            serde_json::from_str(&report().to_json_pretty().unwrap()).unwrap();
        assert_eq!(value["latency"]["p99.9"], "499ms 600us");
        assert_eq!(value["errors"][0]["type"], "HTTP 500");
        assert_eq!(value["throughput"]["requests_per_second"], 10.0);
        assert!(value["configuration"].get("rate_limit").is_none());
    }

    #[test]
    fn test_write_report_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        write_report(&report(), Some(&path)).unwrap();

        let written: JsonReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, report());
    }

    #[test]
    fn test_write_report_bad_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("report.json");

        let err = write_report(&report(), Some(&path)).unwrap_err();
        assert!(matches!(err, ReportError::Write { .. }));
        assert!(err.to_string().contains("report.json"));
    }
}
