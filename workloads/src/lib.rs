//! Workload generators for loadpace
//!
//! This crate provides implementations of the `Workload` trait:
//!
//! - `core`: key-value records with a configurable read/update/insert/scan mix

#![warn(clippy::all)]

mod core_workload;
mod error;

pub use core_workload::{CoreWorkload, CoreWorkloadConfig, KeyDistribution, Transaction};
pub use error::WorkloadError;

use std::sync::Arc;

use loadpace_core::{RunConfig, Workload};

/// Create a workload by name from the run configuration
pub fn create(name: &str, config: &RunConfig) -> Result<Arc<dyn Workload>, WorkloadError> {
    match name {
        "core" => Ok(Arc::new(CoreWorkload::from_run_config(config)?)),
        other => Err(WorkloadError::UnknownWorkload(other.to_string())),
    }
}
