//! Aggregation of worker results

use std::time::Duration;

use serde::Serialize;

use crate::worker::{WorkerExit, WorkerStats};

/// Outcome of a whole run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Workers that reported back
    pub workers: usize,

    /// Operations issued, including warm-up and failures
    pub operations: u64,

    /// Operations issued after warm-up
    pub measured: u64,

    /// Operations whose workload call failed
    pub errors: u64,

    /// Workers that stopped at their quota
    pub quota_reached: usize,

    /// Workers stopped by cancellation
    pub cancelled: usize,

    /// Workers stopped by a pacing failure
    pub pacing_failed: usize,

    /// Wall-clock time of the run
    #[serde(rename = "elapsed_secs", serialize_with = "as_secs")]
    pub elapsed: Duration,

    /// Overall operations per second
    pub ops_per_sec: f64,

    /// Whether the post-load analysis ran
    pub analyzed: bool,
}

impl RunSummary {
    /// Sum the stats of every worker
    pub fn from_workers(stats: &[WorkerStats], elapsed: Duration) -> Self {
        let mut summary = RunSummary {
            workers: stats.len(),
            elapsed,
            ..Default::default()
        };

        for s in stats {
            summary.operations += s.operations;
            summary.measured += s.measured;
            summary.errors += s.errors;
            match s.exit {
                Some(WorkerExit::QuotaReached) => summary.quota_reached += 1,
                Some(WorkerExit::Cancelled) => summary.cancelled += 1,
                Some(WorkerExit::PacingFailed) => summary.pacing_failed += 1,
                None => {}
            }
        }

        let secs = elapsed.as_secs_f64();
        if secs > 0.0 {
            summary.ops_per_sec = summary.operations as f64 / secs;
        }
        summary
    }

    /// Fraction of issued operations that failed
    pub fn error_rate(&self) -> f64 {
        if self.operations > 0 {
            self.errors as f64 / self.operations as f64
        } else {
            0.0
        }
    }
}

fn as_secs<S: serde::Serializer>(elapsed: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(elapsed.as_secs_f64())
}
