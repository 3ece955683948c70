//! Worker statistics tracking

use std::time::{Duration, Instant};

/// Why a worker left its loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The per-worker operation quota was reached
    QuotaReached,
    /// The run was cancelled
    Cancelled,
    /// Pacing was enabled with an unrecognised shape
    PacingFailed,
}

/// Statistics tracked by each worker
///
/// `operations` drives loop termination; `measured` only counts operations
/// completed after warm-up and feeds the throttle.
#[derive(Debug, Default, Clone)]
pub struct WorkerStats {
    /// Operations issued, including failed ones and those during warm-up
    pub operations: u64,

    /// Operations issued after warm-up ended
    pub measured: u64,

    /// Operations whose workload call returned an error
    ///
    /// A failed batch counts every operation in it.
    pub errors: u64,

    /// Worker start time
    pub started_at: Option<Instant>,

    /// Worker end time
    pub ended_at: Option<Instant>,

    /// How the worker finished
    pub exit: Option<WorkerExit>,
}

impl WorkerStats {
    /// Create new empty stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking (records start time)
    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    /// Stop tracking (records end time and exit reason)
    pub fn stop(&mut self, exit: WorkerExit) {
        self.ended_at = Some(Instant::now());
        self.exit = Some(exit);
    }

    /// Record one workload call covering `ops` operations
    pub fn record(&mut self, ops: u64, ok: bool) {
        self.operations += ops;
        if !ok {
            self.errors += ops;
        }
    }

    /// Record operations that count towards the throttle schedule
    pub fn record_measured(&mut self, ops: u64) {
        self.measured += ops;
    }

    /// Get elapsed time since start
    pub fn elapsed(&self) -> Option<Duration> {
        self.started_at.map(|start| {
            self.ended_at
                .map(|end| end.duration_since(start))
                .unwrap_or_else(|| start.elapsed())
        })
    }

    /// Merge stats from another worker
    pub fn merge(&mut self, other: &WorkerStats) {
        self.operations += other.operations;
        self.measured += other.measured;
        self.errors += other.errors;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_stats_defaults() {
        let stats = WorkerStats::default();
        assert_eq!(stats.operations, 0);
        assert_eq!(stats.measured, 0);
        assert_eq!(stats.errors, 0);
        assert!(stats.started_at.is_none());
        assert!(stats.exit.is_none());
    }

    #[test]
    fn test_record_batches() {
        let mut stats = WorkerStats::new();
        stats.record(10, true);
        stats.record(10, false);
        stats.record_measured(10);

        assert_eq!(stats.operations, 20);
        assert_eq!(stats.errors, 10);
        assert_eq!(stats.measured, 10);
    }

    #[test]
    fn test_merge() {
        let mut a = WorkerStats::new();
        a.record(5, true);
        a.record_measured(3);

        let mut b = WorkerStats::new();
        b.record(7, false);
        b.record_measured(7);

        a.merge(&b);
        assert_eq!(a.operations, 12);
        assert_eq!(a.measured, 10);
        assert_eq!(a.errors, 7);
    }

    #[test]
    fn test_start_stop() {
        let mut stats = WorkerStats::new();
        assert!(stats.elapsed().is_none());

        stats.start();
        std::thread::sleep(Duration::from_millis(10));
        stats.stop(WorkerExit::QuotaReached);

        assert!(stats.elapsed().unwrap() >= Duration::from_millis(10));
        assert_eq!(stats.exit, Some(WorkerExit::QuotaReached));
    }
}
