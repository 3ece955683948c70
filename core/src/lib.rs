//! loadpace-core: the load-generation engine
//!
//! This crate drives a [`Workload`] against a [`Db`] from a pool of workers,
//! including:
//!
//! - Run configuration and the per-worker parameters derived from it
//! - Target-throughput throttling and time-of-day shaped pacing
//! - The coordinator, its measurement loop and post-load analysis
//! - A built-in operation meter
//! - Error handling

#![warn(clippy::all)]

pub mod config;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod shutdown;
pub mod traits;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{parse_override, ConfigError, RunConfig};
pub use coordinator::{Coordinator, CoordinatorBuilder, RunSummary};
pub use error::*;
pub use metrics::{MeteredDb, OperationKind, OperationMeter, OutputFormat};
pub use shutdown::Shutdown;
pub use traits::*;
pub use worker::{
    NoiseCache, OperationMode, Pacing, PacingParams, RateThrottle, TimeDistribution, Worker,
    WorkerBuilder, WorkerExit, WorkerStats,
};
