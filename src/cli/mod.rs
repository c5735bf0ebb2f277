//! CLI argument parsing and command dispatch

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use tsunami_core::{
    EngineBuilder, Environment, LoadPattern, MetricsCollector, ProtocolClient, ResponseValidator,
    RunConfig, Scenario, ValidationOverrides,
};
use tsunami_protocols::{HttpClient, HttpConfig, DEFAULT_POOL_SIZE};
use tsunami_report::{render_summary, write_report, JsonReport, LiveReporter};

/// Success rate, in percent, below which `run` exits with [`EXIT_BELOW_THRESHOLD`]
pub const SUCCESS_THRESHOLD: f64 = 95.0;

/// Exit status for a completed run under [`SUCCESS_THRESHOLD`]
pub const EXIT_BELOW_THRESHOLD: u8 = 2;

/// Tsunami - scenario-driven HTTP load generator
#[derive(Parser, Debug)]
#[command(name = "tsunami")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum Commands {
    /// Run a load test
    Run(RunArgs),

    /// Check a scenario file without sending traffic
    Validate {
        /// Scenario file (JSON)
        scenario: PathBuf,

        /// .env-style file used for {{env.NAME}} placeholders
        #[arg(long, env = "TSUNAMI_ENV_FILE")]
        env_file: Option<PathBuf>,
    },

    /// Print version information
    Version,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Scenario file (JSON)
    pub scenario: PathBuf,

    /// Number of virtual users (0 = available parallelism)
    #[arg(short = 'u', long, env = "TSUNAMI_VUS", default_value_t = 10)]
    pub vus: usize,

    /// Test duration (e.g. 30s, 5m)
    #[arg(short, long, env = "TSUNAMI_DURATION", default_value = "30s", value_parser = humantime::parse_duration)]
    pub duration: Duration,

    /// Ramp-up length for the steady pattern
    #[arg(long, env = "TSUNAMI_RAMP_UP", default_value = "0s", value_parser = humantime::parse_duration)]
    pub ramp_up: Duration,

    /// Ramp-down length for the steady pattern
    #[arg(long, env = "TSUNAMI_RAMP_DOWN", default_value = "0s", value_parser = humantime::parse_duration)]
    pub ramp_down: Duration,

    /// Pause after every request
    #[arg(long, env = "TSUNAMI_DELAY", default_value = "0s", value_parser = humantime::parse_duration)]
    pub delay: Duration,

    /// Requests per virtual user (0 = unbounded)
    #[arg(short = 'n', long, env = "TSUNAMI_MAX_REQUESTS", default_value_t = 0)]
    pub max_requests: u64,

    /// Load pattern: steady, spike, ramp-up or stress
    #[arg(short, long, env = "TSUNAMI_PATTERN", default_value = "steady")]
    pub pattern: String,

    /// Per-request timeout, overrides the scenario
    #[arg(short, long, env = "TSUNAMI_TIMEOUT", value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,

    /// Aggregate requests per second across all virtual users
    #[arg(long, env = "TSUNAMI_RATE_LIMIT")]
    pub rate_limit: Option<f64>,

    /// Accepted status codes, replaces the scenario rule (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub expect_status: Vec<u16>,

    /// Required body substring, replaces the scenario rule
    #[arg(long)]
    pub expect_body: Option<String>,

    /// Forbidden body substring, replaces the scenario rule
    #[arg(long)]
    pub expect_body_not: Option<String>,

    /// Maximum response time, replaces the scenario rule
    #[arg(long, value_parser = humantime::parse_duration)]
    pub expect_response_time: Option<Duration>,

    /// .env-style file used for {{env.NAME}} placeholders
    #[arg(long, env = "TSUNAMI_ENV_FILE")]
    pub env_file: Option<PathBuf>,

    /// Write the JSON report to this file
    #[arg(short, long, env = "TSUNAMI_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Print the JSON report to stdout
    #[arg(long)]
    pub json: bool,

    /// Disable the live progress display
    #[arg(long)]
    pub no_live: bool,

    /// Idle connections kept per host
    #[arg(long, env = "TSUNAMI_POOL_SIZE", default_value_t = DEFAULT_POOL_SIZE)]
    pub pool_size: usize,

    /// Open a new connection for every request
    #[arg(long)]
    pub no_keep_alive: bool,

    /// Skip TLS certificate verification
    #[arg(short = 'k', long)]
    pub insecure: bool,

    /// Proxy URL for all requests
    #[arg(long, env = "TSUNAMI_PROXY")]
    pub proxy: Option<String>,

    /// User-Agent header value
    #[arg(long, env = "TSUNAMI_USER_AGENT")]
    pub user_agent: Option<String>,
}

impl RunArgs {
    /// Run configuration described by the flags
    pub fn run_config(&self) -> RunConfig {
        let pattern = LoadPattern::from_name(&self.pattern);
        if pattern == LoadPattern::Steady && !self.pattern.trim().eq_ignore_ascii_case("steady") {
            tracing::warn!(pattern = %self.pattern, "Unknown load pattern, using steady");
        }

        let mut config = RunConfig::new(self.vus, self.duration)
            .with_ramps(self.ramp_up, self.ramp_down)
            .with_pattern(pattern)
            .with_max_requests(self.max_requests)
            .with_delay(self.delay)
            .with_overrides(ValidationOverrides {
                expect_status: self.expect_status.clone(),
                expect_response_time: self.expect_response_time,
                expect_body: self.expect_body.clone(),
                expect_body_not: self.expect_body_not.clone(),
            });

        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }
        if let Some(rps) = self.rate_limit {
            config = config.with_rate_limit(rps);
        }
        config
    }

    /// Transport settings described by the flags
    pub fn http_config(&self) -> HttpConfig {
        let mut config = HttpConfig {
            pool_size: self.pool_size,
            keep_alive: !self.no_keep_alive,
            insecure: self.insecure,
            proxy: self.proxy.clone(),
            ..Default::default()
        };
        if let Some(user_agent) = &self.user_agent {
            config.user_agent = user_agent.clone();
        }
        config
    }
}

impl Cli {
    /// Dispatch the selected command
    pub async fn run(self) -> Result<ExitCode> {
        match self.command {
            Commands::Run(args) => run_load_test(args).await,
            Commands::Validate {
                scenario,
                env_file,
            } => {
                let scenario = load_scenario(&scenario, env_file.as_deref())?;
                ResponseValidator::new(scenario.validation_rules())
                    .context("Invalid validation rules")?;
                println!(
                    "Scenario '{}' is valid: {} {}",
                    scenario.name,
                    scenario.method.to_uppercase(),
                    scenario.full_url()
                );
                Ok(ExitCode::SUCCESS)
            }
            Commands::Version => {
                println!("tsunami {}", env!("CARGO_PKG_VERSION"));
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}

/// Load a scenario, expanding placeholders from `env_file` and the process
fn load_scenario(path: &Path, env_file: Option<&Path>) -> Result<Scenario> {
    let env = match env_file {
        Some(env_file) => Environment::from_file(env_file)
            .with_context(|| format!("Failed to load env file: {}", env_file.display()))?,
        None => Environment::new(),
    };

    Scenario::from_file_with_env(path, env)
        .with_context(|| format!("Failed to load scenario: {}", path.display()))
}

async fn run_load_test(args: RunArgs) -> Result<ExitCode> {
    let scenario = load_scenario(&args.scenario, args.env_file.as_deref())?;
    let config = args.run_config();

    let client = HttpClient::new(args.http_config()).context("Failed to create HTTP client")?;
    let collector = Arc::new(MetricsCollector::new());

    let engine = EngineBuilder::new()
        .scenario(scenario.clone())
        .config(config)
        .client(Arc::new(client) as Arc<dyn ProtocolClient>)
        .collector(Arc::clone(&collector))
        .build()
        .context("Invalid run configuration")?;

    tracing::info!(
        scenario = %scenario.name,
        url = %engine.request().url,
        virtual_users = engine.config().worker_count(),
        duration = %humantime::format_duration(engine.config().duration),
        "Starting tsunami"
    );

    let live = (!args.no_live).then(|| LiveReporter::new(Arc::clone(&collector)).start());
    let result = engine.run_with_signal_handling().await;
    if let Some(live) = live {
        live.stop().await;
    }
    let summary = result.context("Load test failed")?;

    eprintln!("{}", render_summary(&summary));

    let report = JsonReport::new(&summary, &scenario, engine.config());
    if let Some(output) = &args.output {
        write_report(&report, Some(output))
            .with_context(|| format!("Failed to write report: {}", output.display()))?;
    }
    if args.json {
        write_report(&report, None).context("Failed to print report")?;
    }

    if summary.meets_success_rate(SUCCESS_THRESHOLD) {
        Ok(ExitCode::SUCCESS)
    } else {
        tracing::warn!(
            success_rate = summary.success_rate,
            threshold = SUCCESS_THRESHOLD,
            "Success rate below threshold"
        );
        Ok(ExitCode::from(EXIT_BELOW_THRESHOLD))
    }
}
