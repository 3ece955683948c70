//! Worker execution loop

use std::sync::Arc;

use tokio::time::Instant;

use crate::shutdown::Shutdown;
use crate::traits::{Db, Measurement, OperationError, ThreadContext, Workload};

use super::pacer::Pacing;
use super::stats::{WorkerExit, WorkerStats};
use super::throttle::RateThrottle;

/// Kind of operation a worker issues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    /// Load phase: `do_insert` / `do_batch_insert`
    Load,
    /// Run phase: `do_transaction` / `do_batch_transaction`
    Transaction,
}

/// Worker executes operations in a loop: operate -> pace -> throttle -> repeat
///
/// Workers are tokio tasks spawned by the Coordinator. The workload, store
/// and measurement are shared across workers via Arc; everything else,
/// progress counters included, belongs to this worker alone.
pub struct Worker {
    /// Index of this worker, `0..thread_count`
    id: usize,

    /// Number of workers in the run
    thread_count: usize,

    /// Workload (shared across workers via Arc)
    workload: Arc<dyn Workload>,

    /// Data store (shared across workers via Arc)
    db: Arc<dyn Db>,

    /// Measurement sink, consulted for the warm-up state
    measurement: Arc<dyn Measurement>,

    /// Load or transaction operations
    mode: OperationMode,

    /// Operations per workload call
    batch_size: usize,

    /// Operations to perform, 0 for unbounded
    operation_count: u64,

    /// Target throughput throttle
    throttle: RateThrottle,

    /// Distribution pacing
    pacing: Pacing,

    /// Suppress per-operation error logging
    silence: bool,
}

impl Worker {
    /// Create a new worker
    ///
    /// Use `WorkerBuilder` for a more ergonomic construction.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: usize,
        thread_count: usize,
        workload: Arc<dyn Workload>,
        db: Arc<dyn Db>,
        measurement: Arc<dyn Measurement>,
        mode: OperationMode,
        batch_size: usize,
        operation_count: u64,
        throttle: RateThrottle,
        pacing: Pacing,
        silence: bool,
    ) -> Self {
        Self {
            id,
            thread_count,
            workload,
            db,
            measurement,
            mode,
            batch_size: batch_size.max(1),
            operation_count,
            throttle,
            pacing,
            silence,
        }
    }

    /// Run the worker to completion
    ///
    /// Initialises the workload and store for this thread, loops until the
    /// quota is reached, the run is cancelled or pacing fails, then cleans up.
    /// `load_start` is when the whole run began; pacing positions are
    /// measured from it.
    pub async fn run(self, shutdown: Shutdown, load_start: Instant) -> WorkerStats {
        let ctx = ThreadContext::new(self.id, self.thread_count, shutdown);

        self.workload.init_thread(&ctx);
        self.db.init_thread(&ctx);

        let stats = self.run_loop(&ctx, load_start).await;

        self.db.cleanup_thread(&ctx);
        self.workload.cleanup_thread(&ctx);

        tracing::debug!(
            worker_id = self.id,
            operations = stats.operations,
            measured = stats.measured,
            errors = stats.errors,
            exit = ?stats.exit,
            elapsed_ms = ?stats.elapsed().map(|d| d.as_millis()),
            "Worker finished"
        );

        stats
    }

    async fn run_loop(&self, ctx: &ThreadContext, load_start: Instant) -> WorkerStats {
        let mut stats = WorkerStats::new();

        // Spread slow workers out so they don't all hit the store at once
        if let Some(jitter) = self.throttle.initial_jitter() {
            if !ctx.shutdown.sleep(jitter).await {
                stats.stop(WorkerExit::Cancelled);
                return stats;
            }
        }

        stats.start();
        let start = Instant::now();

        tracing::debug!(
            worker_id = self.id,
            mode = ?self.mode,
            operation_count = self.operation_count,
            tick = ?self.throttle.tick(),
            "Worker started"
        );

        loop {
            if self.operation_count != 0 && stats.operations >= self.operation_count {
                stats.stop(WorkerExit::QuotaReached);
                break;
            }

            let (result, ops) = self.execute_one(ctx).await;
            stats.record(ops, result.is_ok());
            if let Err(e) = result {
                if !self.silence {
                    tracing::warn!(worker_id = self.id, error = %e, "Operation failed");
                }
            }

            if let Err(e) = self.pacing.apply(load_start, &ctx.shutdown).await {
                tracing::error!(
                    worker_id = self.id,
                    error = %e,
                    "Pacing failed, worker stopping"
                );
                stats.stop(WorkerExit::PacingFailed);
                break;
            }

            if self.measurement.is_warm_up_finished() {
                stats.record_measured(ops);
                self.throttle.wait(start, stats.measured, &ctx.shutdown).await;
            }

            if ctx.shutdown.is_triggered() {
                tracing::debug!(worker_id = self.id, "Worker received shutdown signal");
                stats.stop(WorkerExit::Cancelled);
                break;
            }
        }

        stats
    }

    /// Issue one workload call; returns its result and the operations it covered
    async fn execute_one(&self, ctx: &ThreadContext) -> (Result<(), OperationError>, u64) {
        let db = self.db.as_ref();
        let batched = self.batch_size > 1;

        let result = match (self.mode, batched) {
            (OperationMode::Transaction, true) => {
                self.workload
                    .do_batch_transaction(ctx, self.batch_size, db)
                    .await
            }
            (OperationMode::Transaction, false) => self.workload.do_transaction(ctx, db).await,
            (OperationMode::Load, true) => {
                self.workload
                    .do_batch_insert(ctx, self.batch_size, db)
                    .await
            }
            (OperationMode::Load, false) => self.workload.do_insert(ctx, db).await,
        };

        let ops = if batched { self.batch_size as u64 } else { 1 };
        (result, ops)
    }

    /// Get the worker ID
    pub fn id(&self) -> usize {
        self.id
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("workload", &self.workload.name())
            .field("db", &self.db.name())
            .field("mode", &self.mode)
            .field("batch_size", &self.batch_size)
            .field("operation_count", &self.operation_count)
            .field("throttle", &self.throttle)
            .field("pacing", &self.pacing)
            .finish()
    }
}
