//! Coordinator for run lifecycle management
//!
//! The Coordinator owns a complete run:
//! - Spawning one worker task per configured thread
//! - Running the measurement loop (warm-up timer, then periodic output)
//! - Post-load table analysis when the store supports it
//! - The final rendezvous with the measurement loop
//!
//! # Example
//!
//! ```ignore
//! use loadpace_core::{CoordinatorBuilder, Shutdown};
//!
//! let coordinator = CoordinatorBuilder::new()
//!     .config(config)
//!     .workload(workload)
//!     .db(db)
//!     .measurement(meter)
//!     .build()?;
//!
//! let summary = coordinator.run(&Shutdown::new(), Instant::now()).await?;
//! ```

mod builder;
mod executor;
mod measure;
mod summary;

pub use builder::CoordinatorBuilder;
pub use executor::Coordinator;
pub use measure::MeasurementLoop;
pub use summary::RunSummary;
