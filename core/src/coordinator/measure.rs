//! Background measurement loop

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::shutdown::Shutdown;
use crate::traits::Measurement;

/// Handle to a running measurement loop
///
/// [`MeasurementLoop::stop`] is the rendezvous: it returns only once the loop
/// task has exited, so no output can follow it.
#[derive(Debug)]
pub struct MeasurementLoop {
    stop: Shutdown,
    handle: JoinHandle<()>,
}

impl MeasurementLoop {
    /// Spawn the loop
    ///
    /// The loop waits out `warm_up` (if any), ends warm-up on `measurement`,
    /// then calls `output` every `interval`. A `run` cancellation aborts the
    /// warm-up wait without ending warm-up.
    pub fn spawn(
        measurement: Arc<dyn Measurement>,
        warm_up: Option<Duration>,
        interval: Duration,
        run: &Shutdown,
    ) -> Self {
        let stop = run.child();
        let handle = tokio::spawn(measure(measurement, warm_up, interval, stop.clone()));
        Self { stop, handle }
    }

    /// Stop the loop and wait for it to exit
    ///
    /// Returns `false` if the loop task panicked.
    pub async fn stop(self) -> bool {
        self.stop.trigger();
        match self.handle.await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "Measurement loop failed");
                false
            }
        }
    }
}

async fn measure(
    measurement: Arc<dyn Measurement>,
    warm_up: Option<Duration>,
    interval: Duration,
    stop: Shutdown,
) {
    if let Some(warm_up) = warm_up {
        tracing::debug!(warm_up_secs = warm_up.as_secs(), "Warming up");
        if !stop.sleep(warm_up).await {
            tracing::debug!("Measurement loop stopped during warm-up");
            return;
        }
    }

    measurement.enable_warm_up(false);
    tracing::debug!("Warm-up finished");

    // First output one full interval after warm-up ends
    let Some(first) = Instant::now().checked_add(interval) else {
        stop.cancelled().await;
        tracing::debug!("Measurement loop stopped");
        return;
    };
    let mut ticker = interval_at(first, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = ticker.tick() => measurement.output(),
        }
    }

    tracing::debug!("Measurement loop stopped");
}
