//! Run configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::pattern::LoadPattern;
use crate::validation::ValidationOverrides;

/// Run configuration
///
/// Defines how many virtual users run, for how long, and how their request
/// rate is shaped. Immutable once a run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Number of virtual users; 0 selects the available parallelism
    pub virtual_users: usize,

    /// Total run duration
    #[serde(with = "humantime_serde")]
    pub duration: Duration,

    /// Length of the initial ramp for the `steady` pattern
    #[serde(default, with = "humantime_serde")]
    pub ramp_up: Duration,

    /// Length of the final ramp for the `steady` pattern
    #[serde(default, with = "humantime_serde")]
    pub ramp_down: Duration,

    /// Fixed pause after every request
    #[serde(default, with = "humantime_serde")]
    pub delay: Duration,

    /// Requests per virtual user; 0 means unbounded
    #[serde(default)]
    pub max_requests: u64,

    /// Load pattern shaping the request rate
    #[serde(default)]
    pub pattern: LoadPattern,

    /// Overrides the scenario's per-request timeout
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,

    /// Aggregate cap across all virtual users, in requests per second
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<f64>,

    /// Expectations replacing the scenario's validation rules
    #[serde(default, skip_serializing_if = "ValidationOverrides::is_empty")]
    pub overrides: ValidationOverrides,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            virtual_users: 10,
            duration: Duration::from_secs(30),
            ramp_up: Duration::ZERO,
            ramp_down: Duration::ZERO,
            delay: Duration::ZERO,
            max_requests: 0,
            pattern: LoadPattern::default(),
            timeout: None,
            rate_limit: None,
            overrides: ValidationOverrides::default(),
        }
    }
}

impl RunConfig {
    /// Create a config with the given virtual users and duration
    pub fn new(virtual_users: usize, duration: Duration) -> Self {
        Self {
            virtual_users,
            duration,
            ..Default::default()
        }
    }

    /// Set the ramp durations
    pub fn with_ramps(mut self, ramp_up: Duration, ramp_down: Duration) -> Self {
        self.ramp_up = ramp_up;
        self.ramp_down = ramp_down;
        self
    }

    /// Set the load pattern
    pub fn with_pattern(mut self, pattern: LoadPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Set the per-user request cap
    pub fn with_max_requests(mut self, max_requests: u64) -> Self {
        self.max_requests = max_requests;
        self
    }

    /// Set the inter-request delay
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the per-request timeout override
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the aggregate rate limit
    pub fn with_rate_limit(mut self, rps: f64) -> Self {
        self.rate_limit = Some(rps);
        self
    }

    /// Set the validation overrides
    pub fn with_overrides(mut self, overrides: ValidationOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Number of worker tasks to spawn
    pub fn worker_count(&self) -> usize {
        if self.virtual_users > 0 {
            self.virtual_users
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }

    /// Per-request timeout: the override if set, otherwise `scenario_timeout`
    pub fn request_timeout(&self, scenario_timeout: Duration) -> Duration {
        self.timeout.unwrap_or(scenario_timeout)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.duration.is_zero() {
            return Err(ConfigError::InvalidDuration(
                "duration must be greater than zero".into(),
            ));
        }

        if self.ramp_up + self.ramp_down > self.duration {
            return Err(ConfigError::InvalidDuration(format!(
                "ramp-up ({:?}) + ramp-down ({:?}) exceeds duration ({:?})",
                self.ramp_up, self.ramp_down, self.duration
            )));
        }

        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::InvalidDuration(
                "timeout must be greater than zero".into(),
            ));
        }

        if let Some(rps) = self.rate_limit {
            if !rps.is_finite() || rps <= 0.0 {
                return Err(ConfigError::InvalidRateLimit(
                    "rate limit must be positive".into(),
                ));
            }
        }

        if let Some(code) = self
            .overrides
            .expect_status
            .iter()
            .copied()
            .find(|code| !(100..=599).contains(code))
        {
            return Err(ConfigError::InvalidStatusCode(code));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RunConfig::default();
        assert_eq!(config.virtual_users, 10);
        assert_eq!(config.duration, Duration::from_secs(30));
        assert_eq!(config.pattern, LoadPattern::Steady);
        assert_eq!(config.max_requests, 0);
        assert!(config.rate_limit.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = RunConfig::new(4, Duration::from_secs(60))
            .with_ramps(Duration::from_secs(10), Duration::from_secs(5))
            .with_pattern(LoadPattern::Spike)
            .with_max_requests(3)
            .with_delay(Duration::from_millis(20))
            .with_rate_limit(50.0);

        assert_eq!(config.virtual_users, 4);
        assert_eq!(config.ramp_up, Duration::from_secs(10));
        assert_eq!(config.pattern, LoadPattern::Spike);
        assert_eq!(config.max_requests, 3);
        assert_eq!(config.rate_limit, Some(50.0));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_duration_rejected() {
        let config = RunConfig::new(1, Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDuration(_))
        ));
    }

    #[test]
    fn test_ramps_longer_than_run_rejected() {
        let config = RunConfig::new(1, Duration::from_secs(10))
            .with_ramps(Duration::from_secs(6), Duration::from_secs(5));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDuration(_))
        ));

        let exact = RunConfig::new(1, Duration::from_secs(10))
            .with_ramps(Duration::from_secs(5), Duration::from_secs(5));
        assert!(exact.validate().is_ok());
    }

    #[test]
    fn test_rate_limit_must_be_positive() {
        assert!(RunConfig::default().with_rate_limit(0.0).validate().is_err());
        assert!(RunConfig::default().with_rate_limit(-1.0).validate().is_err());
        assert!(RunConfig::default()
            .with_rate_limit(f64::NAN)
            .validate()
            .is_err());
    }

    #[test]
    fn test_override_status_codes_checked() {
        let config = RunConfig::default().with_overrides(ValidationOverrides {
            expect_status: vec![99],
            ..Default::default()
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidStatusCode(99))
        ));
    }

    #[test]
    fn test_worker_count_falls_back_to_parallelism() {
        assert_eq!(RunConfig::new(7, Duration::from_secs(1)).worker_count(), 7);
        assert!(RunConfig::new(0, Duration::from_secs(1)).worker_count() >= 1);
    }

    #[test]
    fn test_request_timeout_override() {
        let config = RunConfig::default();
        assert_eq!(
            config.request_timeout(Duration::from_secs(5)),
            Duration::from_secs(5)
        );
        let config = config.with_timeout(Duration::from_secs(2));
        assert_eq!(
            config.request_timeout(Duration::from_secs(5)),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_config_deserialization() {
        let config: RunConfig = serde_json::from_str(
            r#"{"virtual_users":5,"duration":"1m","ramp_up":"10s","pattern":"stress"}"#,
        )
        .unwrap();
        assert_eq!(config.virtual_users, 5);
        assert_eq!(config.duration, Duration::from_secs(60));
        assert_eq!(config.ramp_up, Duration::from_secs(10));
        assert_eq!(config.pattern, LoadPattern::Stress);
        assert!(config.overrides.is_empty());
    }
}
