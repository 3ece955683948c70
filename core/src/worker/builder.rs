//! Builder pattern for Worker construction

use std::sync::Arc;
use std::time::Duration;

use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::traits::{Db, Measurement, Workload};

use super::executor::{OperationMode, Worker};
use super::noise::NoiseCache;
use super::pacer::Pacing;
use super::throttle::RateThrottle;

/// Builder for creating Worker instances
///
/// # Example
/// ```ignore
/// let worker = WorkerBuilder::new(0)
///     .workload(workload)
///     .db(db)
///     .measurement(meter)
///     .configure(&config, NoiseCache::shared())
///     .build()?;
/// ```
pub struct WorkerBuilder {
    id: usize,
    thread_count: usize,
    workload: Option<Arc<dyn Workload>>,
    db: Option<Arc<dyn Db>>,
    measurement: Option<Arc<dyn Measurement>>,
    mode: OperationMode,
    batch_size: usize,
    operation_count: u64,
    tick: Option<Duration>,
    pacing: Pacing,
    silence: bool,
}

impl WorkerBuilder {
    /// Create a new builder with the given worker ID
    pub fn new(id: usize) -> Self {
        Self {
            id,
            thread_count: 1,
            workload: None,
            db: None,
            measurement: None,
            mode: OperationMode::Transaction,
            batch_size: 1,
            operation_count: 0,
            tick: None,
            pacing: Pacing::Disabled,
            silence: true,
        }
    }

    /// Take every run-level setting from `config`
    ///
    /// Sets the thread count, operation mode, batch size, per-worker quota,
    /// per-worker tick, pacing and silence flag.
    pub fn configure(self, config: &RunConfig, noise: Arc<NoiseCache>) -> Self {
        let mode = if config.do_transactions {
            OperationMode::Transaction
        } else {
            OperationMode::Load
        };
        self.thread_count(config.thread_count)
            .mode(mode)
            .batch_size(config.batch_size)
            .operation_count(config.per_worker_operation_count())
            .tick(config.per_worker_tick())
            .pacing(Pacing::from_config(config, noise))
            .silence(config.silence)
    }

    /// Set the number of workers in the run
    pub fn thread_count(mut self, thread_count: usize) -> Self {
        self.thread_count = thread_count;
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

    /// Set the operation mode
    pub fn mode(mut self, mode: OperationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the batch size; values above one enable batched operations
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set this worker's operation quota; 0 runs until cancelled
    pub fn operation_count(mut self, operation_count: u64) -> Self {
        self.operation_count = operation_count;
        self
    }

    /// Set the per-worker throttle tick
    pub fn tick(mut self, tick: Option<Duration>) -> Self {
        self.tick = tick;
        self
    }

    /// Set pacing
    pub fn pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Suppress per-operation error logging
    pub fn silence(mut self, silence: bool) -> Self {
        self.silence = silence;
        self
    }

    /// Build the Worker
    ///
    /// # Errors
    /// Returns an error if the workload, store or measurement is missing.
    pub fn build(self) -> Result<Worker> {
        let workload = self.workload.ok_or(Error::MissingConfig("workload"))?;
        let db = self.db.ok_or(Error::MissingConfig("db"))?;
        let measurement = self
            .measurement
            .ok_or(Error::MissingConfig("measurement"))?;

        Ok(Worker::new(
            self.id,
            self.thread_count,
            workload,
            db,
            measurement,
            self.mode,
            self.batch_size,
            self.operation_count,
            RateThrottle::new(self.tick),
            self.pacing,
            self.silence,
        ))
    }
}
