//! Drift-correcting throughput throttle

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

use crate::config::RunConfig;
use crate::shutdown::Shutdown;

/// Per-worker throttle enforcing this worker's share of the target throughput
///
/// The throttle schedules operation `n` at `start + n * tick` and waits for
/// that instant. A worker that has fallen behind schedule is never held back,
/// so sleep error does not accumulate across operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateThrottle {
    tick: Option<Duration>,
}

impl RateThrottle {
    /// Create a throttle from a per-worker tick; `None` disables throttling
    pub fn new(tick: Option<Duration>) -> Self {
        Self {
            tick: tick.filter(|tick| !tick.is_zero()),
        }
    }

    /// Create a throttle that never waits
    pub fn unlimited() -> Self {
        Self::new(None)
    }

    /// Create a throttle from the run's target throughput and thread count
    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(config.per_worker_tick())
    }

    /// Whether a target throughput is configured
    pub fn is_enabled(&self) -> bool {
        self.tick.is_some()
    }

    /// The per-worker spacing between operations
    pub fn tick(&self) -> Option<Duration> {
        self.tick
    }

    /// How long to wait at `now` before the next operation
    ///
    /// `ops_done` counts operations completed since warm-up ended. Returns
    /// zero when throttling is disabled or the worker is behind schedule.
    pub fn wait_duration(&self, start: Instant, ops_done: u64, now: Instant) -> Duration {
        let Some(tick) = self.tick else {
            return Duration::ZERO;
        };
        let tick_nanos = u64::try_from(tick.as_nanos()).unwrap_or(u64::MAX);
        let scheduled = Duration::from_nanos(tick_nanos.saturating_mul(ops_done));
        scheduled.saturating_sub(now.saturating_duration_since(start))
    }

    /// Wait until the next operation is due, or until cancelled
    pub async fn wait(&self, start: Instant, ops_done: u64, shutdown: &Shutdown) {
        let wait = self.wait_duration(start, ops_done, Instant::now());
        if !wait.is_zero() {
            shutdown.sleep(wait).await;
        }
    }

    /// Random delay before a worker's first operation
    ///
    /// Only slow workers (at most one operation per millisecond) are spread
    /// out, uniformly within one tick.
    pub fn initial_jitter(&self) -> Option<Duration> {
        let tick = self.tick.filter(|tick| *tick >= Duration::from_millis(1))?;
        let tick_nanos = u64::try_from(tick.as_nanos()).unwrap_or(u64::MAX);
        Some(Duration::from_nanos(
            rand::thread_rng().gen_range(0..tick_nanos),
        ))
    }
}

impl Default for RateThrottle {
    fn default() -> Self {
        Self::unlimited()
    }
}
