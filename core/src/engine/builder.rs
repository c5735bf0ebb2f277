//! Builder pattern for LoadEngine construction

use std::sync::Arc;

use crate::config::RunConfig;
use crate::error::{EngineError, EngineResult};
use crate::metrics::MetricsCollector;
use crate::request::Request;
use crate::scenario::Scenario;
use crate::traits::ProtocolClient;
use crate::validation::ResponseValidator;

use super::executor::LoadEngine;

/// Builder for creating a LoadEngine with validated configuration
///
/// # Example
///
/// ```ignore
/// let engine = EngineBuilder::new()
///     .scenario(scenario)
///     .config(RunConfig::new(10, Duration::from_secs(30)))
///     .client(client)
///     .build()?;
/// ```
pub struct EngineBuilder {
    config: RunConfig,
    scenario: Option<Scenario>,
    client: Option<Arc<dyn ProtocolClient>>,
    collector: Option<Arc<MetricsCollector>>,
}

impl EngineBuilder {
    /// Create a new engine builder with default configuration
    pub fn new() -> Self {
        Self {
            config: RunConfig::default(),
            scenario: None,
            client: None,
            collector: None,
        }
    }

    /// Set the full run configuration
    pub fn config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the scenario
    pub fn scenario(mut self, scenario: Scenario) -> Self {
        self.scenario = Some(scenario);
        self
    }

    /// Set the protocol client
    pub fn client(mut self, client: Arc<dyn ProtocolClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Use an existing collector instead of a fresh one
    pub fn collector(mut self, collector: Arc<MetricsCollector>) -> Self {
        self.collector = Some(collector);
        self
    }

    /// Build the engine
    ///
    /// # Errors
    ///
    /// Returns an error if the scenario or client is missing, or if the
    /// scenario, run configuration or effective validation rules are invalid.
    pub fn build(self) -> EngineResult<LoadEngine> {
        let scenario = self
            .scenario
            .ok_or_else(|| EngineError::missing_config("scenario"))?;
        let client = self
            .client
            .ok_or_else(|| EngineError::missing_config("client"))?;

        scenario.validate()?;
        self.config.validate()?;

        let validator =
            ResponseValidator::with_overrides(&scenario.validation_rules(), &self.config.overrides)?;

        let request = Request::from_scenario(&scenario)
            .with_timeout(self.config.request_timeout(scenario.timeout()));

        tracing::debug!(
            scenario = %scenario.name,
            method = %request.method,
            url = %request.url,
            timeout = ?request.timeout,
            "Engine configured"
        );

        let collector = self.collector.unwrap_or_default();
        Ok(LoadEngine::new(self.config, client, request, validator, collector))
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
