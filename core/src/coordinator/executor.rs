//! Coordinator execution logic

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::Instant;

use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::shutdown::Shutdown;
use crate::traits::{Db, Measurement, Workload};
use crate::worker::{NoiseCache, WorkerBuilder, WorkerStats};

use super::measure::MeasurementLoop;
use super::summary::RunSummary;

/// Coordinator owns one run from start to rendezvous
///
/// Spawns `threadcount` workers plus the measurement loop, waits for every
/// worker, runs the post-load analysis on load runs, then stops the
/// measurement loop and waits for it to exit.
pub struct Coordinator {
    /// Validated run configuration
    pub(crate) config: RunConfig,

    /// Workload (shared across workers)
    pub(crate) workload: Arc<dyn Workload>,

    /// Data store (shared across workers)
    pub(crate) db: Arc<dyn Db>,

    /// Measurement sink (shared across workers and the measurement loop)
    pub(crate) measurement: Arc<dyn Measurement>,

    /// Noise memo shared by every pacer
    pub(crate) noise: Arc<NoiseCache>,
}

impl Coordinator {
    /// Create a new coordinator
    ///
    /// Use `CoordinatorBuilder` for a validated construction.
    pub fn new(
        config: RunConfig,
        workload: Arc<dyn Workload>,
        db: Arc<dyn Db>,
        measurement: Arc<dyn Measurement>,
        noise: Arc<NoiseCache>,
    ) -> Self {
        Self {
            config,
            workload,
            db,
            measurement,
            noise,
        }
    }

    /// Get the run configuration
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run to completion or cancellation
    ///
    /// `load_start` is when the overall run began; pacing positions are
    /// measured from it. Returns only after every worker has finished and the
    /// measurement loop has exited.
    pub async fn run(&self, shutdown: &Shutdown, load_start: Instant) -> Result<RunSummary> {
        let start = Instant::now();
        let thread_count = self.config.thread_count;

        tracing::info!(
            threads = thread_count,
            transactions = self.config.do_transactions,
            operations_per_worker = self.config.per_worker_operation_count(),
            target = ?self.config.target,
            distribution = %self.config.time_distribution,
            pacing = self.config.normaldatain_time,
            "Starting run"
        );

        let workers = (0..thread_count)
            .map(|worker_id| {
                WorkerBuilder::new(worker_id)
                    .workload(Arc::clone(&self.workload))
                    .db(Arc::clone(&self.db))
                    .measurement(Arc::clone(&self.measurement))
                    .configure(&self.config, Arc::clone(&self.noise))
                    .build()
            })
            .collect::<Result<Vec<_>>>()?;

        let warm_up = self.config.do_transactions.then(|| self.config.warm_up());
        let measure = MeasurementLoop::spawn(
            Arc::clone(&self.measurement),
            warm_up,
            self.config.measurement_interval(),
            shutdown,
        );

        let handles: Vec<_> = workers
            .into_iter()
            .map(|worker| tokio::spawn(worker.run(shutdown.clone(), load_start)))
            .collect();

        let results = join_all(handles).await;
        let mut stats: Vec<WorkerStats> = Vec::with_capacity(results.len());
        let mut worker_failures = 0;
        for (idx, result) in results.into_iter().enumerate() {
            match result {
                Ok(s) => stats.push(s),
                Err(e) => {
                    worker_failures += 1;
                    tracing::error!(worker_id = idx, error = %e, "Worker task panicked");
                }
            }
        }

        let analyzed = if self.config.do_transactions {
            false
        } else {
            self.analyze().await
        };

        let measured_cleanly = measure.stop().await;

        if !measured_cleanly {
            return Err(Error::MeasurementFailed);
        }
        if stats.is_empty() && worker_failures > 0 {
            return Err(Error::WorkersFailed(worker_failures));
        }

        let mut summary = RunSummary::from_workers(&stats, start.elapsed());
        summary.analyzed = analyzed;
        tracing::info!(
            elapsed_secs = summary.elapsed.as_secs_f64(),
            operations = summary.operations,
            errors = summary.errors,
            ops_per_sec = summary.ops_per_sec,
            cancelled = summary.cancelled,
            pacing_failed = summary.pacing_failed,
            "Run completed"
        );

        Ok(summary)
    }

    /// Analyze the loaded table if the store supports it
    async fn analyze(&self) -> bool {
        let Some(analyze_db) = self.db.as_analyze() else {
            return false;
        };
        let table = &self.config.table_name;
        tracing::info!(table = %table, "Analyzing table");
        match analyze_db.analyze(table).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(table = %table, error = %e, "Table analysis failed");
                true
            }
        }
    }

    /// Run with Ctrl+C signal handling
    ///
    /// Ctrl+C cancels the run; the summary still covers what was done.
    pub async fn run_with_signal_handling(
        &self,
        shutdown: &Shutdown,
        load_start: Instant,
    ) -> Result<RunSummary> {
        let trigger = shutdown.clone();

        let signal_handle = tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
                    trigger.trigger();
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                }
            }
        });

        let result = self.run(shutdown, load_start).await;
        signal_handle.abort();
        result
    }

    /// Run with a timeout
    ///
    /// Cancels the run once `timeout` has elapsed.
    pub async fn run_with_timeout(
        &self,
        timeout: Duration,
        shutdown: &Shutdown,
        load_start: Instant,
    ) -> Result<RunSummary> {
        let trigger = shutdown.clone();

        let timeout_handle = tokio::spawn(async move {
            if trigger.sleep(timeout).await {
                tracing::info!(
                    timeout_secs = timeout.as_secs(),
                    "Maximum execution time reached, initiating shutdown..."
                );
                trigger.trigger();
            }
        });

        let result = self.run(shutdown, load_start).await;
        timeout_handle.abort();
        result
    }

    /// Run with Ctrl+C handling and the configured `maxexecutiontime`
    pub async fn run_until_done(&self, load_start: Instant) -> Result<RunSummary> {
        let shutdown = Shutdown::new();
        let limit = self.config.max_execution_time;
        if limit == 0 {
            return self.run_with_signal_handling(&shutdown, load_start).await;
        }

        let trigger = shutdown.clone();
        let signal_handle = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
                trigger.trigger();
            }
        });

        let result = self
            .run_with_timeout(Duration::from_secs(limit), &shutdown, load_start)
            .await;
        signal_handle.abort();
        result
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("threads", &self.config.thread_count)
            .field("workload", &self.workload.name())
            .field("db", &self.db.name())
            .finish()
    }
}
