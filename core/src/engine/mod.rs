//! Load engine: run lifecycle management
//!
//! The [`LoadEngine`] coordinates one run:
//! - Spawning one worker task per virtual user into a `JoinSet`
//! - Owning the shared cancellation token and the run deadline
//! - Waiting for the deadline, an explicit stop, or every worker finishing
//! - Joining workers, stopping the collector, closing the client
//!
//! # Example
//!
//! ```ignore
//! use tsunami_core::engine::EngineBuilder;
//!
//! let engine = EngineBuilder::new()
//!     .scenario(scenario)
//!     .config(config)
//!     .client(client)
//!     .build()?;
//!
//! let summary = engine.run_with_signal_handling().await?;
//! ```

mod aggregator;
mod builder;
mod executor;

pub use aggregator::{aggregate_worker_stats, AggregatedStats};
pub use builder::EngineBuilder;
pub use executor::{LoadEngine, StopHandle, GRACE_PERIOD};

#[cfg(test)]
mod tests;
