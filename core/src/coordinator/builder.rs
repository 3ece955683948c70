//! Builder pattern for Coordinator construction

use std::sync::Arc;

use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::traits::{Db, Measurement, Workload};
use crate::worker::NoiseCache;

use super::executor::Coordinator;

/// Builder for creating a Coordinator with a validated configuration
///
/// # Example
///
/// ```ignore
/// let coordinator = CoordinatorBuilder::new()
///     .config(config)
///     .workload(workload)
///     .db(db)
///     .measurement(meter)
///     .build()?;
/// ```
pub struct CoordinatorBuilder {
    config: RunConfig,
    workload: Option<Arc<dyn Workload>>,
    db: Option<Arc<dyn Db>>,
    measurement: Option<Arc<dyn Measurement>>,
    noise: Option<Arc<NoiseCache>>,
}

impl CoordinatorBuilder {
    /// Create a new coordinator builder with default configuration
    pub fn new() -> Self {
        Self {
            config: RunConfig::default(),
            workload: None,
            db: None,
            measurement: None,
            noise: None,
        }
    }

    /// Set the full run configuration
    pub fn config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the number of workers
    pub fn thread_count(mut self, thread_count: usize) -> Self {
        self.config.thread_count = thread_count;
        self
    }

    /// Set the workload
    pub fn workload(mut self, workload: Arc<dyn Workload>) -> Self {
        self.workload = Some(workload);
        self
    }

    /// Set the data store
    pub fn db(mut self, db: Arc<dyn Db>) -> Self {
        self.db = Some(db);
        self
    }

    /// Set the measurement sink
    pub fn measurement(mut self, measurement: Arc<dyn Measurement>) -> Self {
        self.measurement = Some(measurement);
        self
    }

    /// Use a private noise cache instead of the process-wide one
    pub fn noise(mut self, noise: Arc<NoiseCache>) -> Self {
        self.noise = Some(noise);
        self
    }

    /// Build the coordinator
    ///
    /// # Errors
    ///
    /// Returns an error if a collaborator is not set or if configuration
    /// validation fails.
    pub fn build(self) -> Result<Coordinator> {
        let workload = self.workload.ok_or(Error::MissingConfig("workload"))?;
        let db = self.db.ok_or(Error::MissingConfig("db"))?;
        let measurement = self
            .measurement
            .ok_or(Error::MissingConfig("measurement"))?;

        self.config.validate()?;

        let noise = self.noise.unwrap_or_else(NoiseCache::shared);
        Ok(Coordinator::new(self.config, workload, db, measurement, noise))
    }
}

impl Default for CoordinatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
