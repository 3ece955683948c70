//! Worker module: one concurrent execution unit of a run
//!
//! Each Worker is a tokio task that repeatedly:
//!
//! 1. Asks the Workload for one (possibly batched) load or transaction call
//! 2. Logs a failed call unless the run is silenced, and carries on
//! 3. Applies the Distribution Pacer, if pacing is enabled
//! 4. Once warm-up has ended, counts the call and applies the Rate Throttle
//! 5. Stops if the run was cancelled, otherwise repeats until its quota is met
//!
//! # Example
//!
//! ```ignore
//! use loadpace_core::worker::{NoiseCache, WorkerBuilder};
//!
//! let worker = WorkerBuilder::new(0)
//!     .workload(workload)
//!     .db(db)
//!     .measurement(meter)
//!     .configure(&config, NoiseCache::shared())
//!     .build()?;
//!
//! let stats = worker.run(shutdown, Instant::now()).await;
//! println!("Issued: {}", stats.operations);
//! ```

mod builder;
mod executor;
mod noise;
mod pacer;
mod stats;
mod throttle;

pub use builder::WorkerBuilder;
pub use executor::{OperationMode, Worker};
pub use noise::{noise_bounds, sample_noise, NoiseCache};
pub use pacer::{
    normal_density, step_multiplier, DistributionPacer, Pacing, PacingParams, TimeDistribution,
    MAX_PACING_DELAY,
};
pub use stats::{WorkerExit, WorkerStats};
pub use throttle::RateThrottle;
