//! Worker module: one virtual user
//!
//! A Worker is a tokio task running the loop
//! **pace -> execute -> validate -> record -> repeat**:
//!
//! 1. Ask the [`LoadProfile`](crate::pattern::LoadProfile) how long to wait
//!    at the current elapsed time and sleep that long (idle ticks send nothing)
//! 2. Wait for the shared rate limiter, if one is configured
//! 3. Execute the scenario request through the shared
//!    [`ProtocolClient`](crate::traits::ProtocolClient), bounded by the
//!    request timeout and the remaining run time
//! 4. Validate the response and record both outcomes in the shared
//!    [`MetricsCollector`](crate::metrics::MetricsCollector)
//! 5. Sleep the inter-request delay
//!
//! Workers never talk to each other. The collector is the only shared
//! mutable state; the per-worker request counter is private.
//!
//! # Example
//!
//! ```ignore
//! use tsunami_core::worker::WorkerBuilder;
//!
//! let worker = WorkerBuilder::new(0)
//!     .client(client)
//!     .request(request)
//!     .validator(validator)
//!     .collector(collector)
//!     .profile(profile)
//!     .run_start(Instant::now())
//!     .max_requests(100)
//!     .build()?;
//!
//! let stats = worker.run(cancel.child_token()).await;
//! println!("Sent: {}", stats.requests);
//! ```

mod builder;
mod executor;
mod rate_limiter;
mod stats;

pub use builder::WorkerBuilder;
pub use executor::{RunSchedule, Worker, WorkerExit};
pub use rate_limiter::RequestRateLimiter;
pub use stats::WorkerStats;
