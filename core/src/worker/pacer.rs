//! Time-of-day shaped pacing
//!
//! After every operation the pacer adds a delay that depends on where the run
//! currently sits within a repeating period (whole minutes since the run
//! began, modulo the period length). Different shapes concentrate throughput
//! at different points of the period, simulating non-uniform arrival.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::shutdown::Shutdown;

use super::noise::NoiseCache;

/// Upper bound on any single pacing delay (30 seconds)
pub const MAX_PACING_DELAY: Duration = Duration::from_secs(30);

const MAX_PACING_NANOS: f64 = 3e10;

/// Selectable pacing shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeDistribution {
    /// No additional delay
    None,
    /// `delay / density`: fastest near the mean
    Normal,
    /// `delay * density`: slowest near the mean
    ReverseNormal,
    /// `normal` plus shared noise
    NoiseNormal,
    /// Staircase `delay * round(3 - 3 * position / period)`
    Step,
    /// `step` plus shared noise
    NoiseStep,
}

impl TimeDistribution {
    /// Name as accepted in configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeDistribution::None => "none",
            TimeDistribution::Normal => "normal",
            TimeDistribution::ReverseNormal => "reverse_normal",
            TimeDistribution::NoiseNormal => "noise_normal",
            TimeDistribution::Step => "step",
            TimeDistribution::NoiseStep => "noise_step",
        }
    }
}

impl FromStr for TimeDistribution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(TimeDistribution::None),
            "normal" => Ok(TimeDistribution::Normal),
            "reverse_normal" => Ok(TimeDistribution::ReverseNormal),
            "noise_normal" => Ok(TimeDistribution::NoiseNormal),
            "step" => Ok(TimeDistribution::Step),
            "noise_step" => Ok(TimeDistribution::NoiseStep),
            other => Err(Error::UnknownDistribution(other.to_string())),
        }
    }
}

impl fmt::Display for TimeDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacingParams {
    /// Mean of the normal shapes, minutes into the period
    pub mean: f64,
    /// Standard deviation of the normal shapes, minutes
    pub std_dev: f64,
    /// Base delay in nanoseconds
    pub delay: f64,
    /// Period length in minutes
    pub period: u64,
    /// Noise ratio in `[0, 1]`
    pub noise_ratio: f64,
}

/// Computes and applies the per-operation pacing delay
#[derive(Debug, Clone)]
pub struct DistributionPacer {
    shape: TimeDistribution,
    params: PacingParams,
    noise: Arc<NoiseCache>,
}

impl DistributionPacer {
    /// Create a pacer for `shape`
    pub fn new(shape: TimeDistribution, params: PacingParams, noise: Arc<NoiseCache>) -> Self {
        Self {
            shape,
            params,
            noise,
        }
    }

    /// The configured shape
    pub fn shape(&self) -> TimeDistribution {
        self.shape
    }

    /// Position within the period for a given time since the run began
    pub fn position(&self, elapsed: Duration) -> u64 {
        (elapsed.as_secs() / 60) % self.params.period.max(1)
    }

    /// Delay to apply at a given period position
    pub fn delay_at(&self, position: u64) -> Duration {
        let PacingParams {
            mean,
            std_dev,
            delay,
            period,
            noise_ratio,
        } = self.params;
        let x = position as f64;

        let nanos = match self.shape {
            TimeDistribution::None => 0.0,
            TimeDistribution::Normal => clamp_nanos(delay / normal_density(x, mean, std_dev)),
            TimeDistribution::ReverseNormal => {
                clamp_nanos(delay * normal_density(x, mean, std_dev))
            }
            TimeDistribution::NoiseNormal => {
                let base = clamp_nanos(delay / normal_density(x, mean, std_dev));
                base + base * self.noise.noise(position, noise_ratio)
            }
            TimeDistribution::Step => delay * step_multiplier(position, period),
            TimeDistribution::NoiseStep => {
                let base = delay * step_multiplier(position, period);
                base + base * self.noise.noise(position, noise_ratio)
            }
        };

        Duration::from_nanos(clamp_nanos(nanos) as u64)
    }

    /// Delay to apply `elapsed` after the run began
    pub fn delay(&self, elapsed: Duration) -> Duration {
        self.delay_at(self.position(elapsed))
    }

    /// Sleep for the current delay unless cancelled
    pub async fn pace(&self, load_start: Instant, shutdown: &Shutdown) {
        let delay = self.delay(load_start.elapsed());
        if !delay.is_zero() {
            shutdown.sleep(delay).await;
        }
    }
}

/// Pacing as configured for one worker
#[derive(Debug, Clone)]
pub enum Pacing {
    /// The pacer does not run
    Disabled,
    /// The pacer runs after every operation
    Enabled(DistributionPacer),
    /// Pacing was requested with an unrecognised shape name
    Invalid(String),
}

impl Pacing {
    /// Build pacing from a shape name
    pub fn from_name(name: &str, params: PacingParams, noise: Arc<NoiseCache>) -> Self {
        match name.parse::<TimeDistribution>() {
            Ok(shape) => Pacing::Enabled(DistributionPacer::new(shape, params, noise)),
            Err(_) => Pacing::Invalid(name.to_string()),
        }
    }

    /// Build pacing from the run configuration
    pub fn from_config(config: &RunConfig, noise: Arc<NoiseCache>) -> Self {
        if !config.normaldatain_time {
            return Pacing::Disabled;
        }
        Pacing::from_name(&config.time_distribution, config.pacing_params(), noise)
    }

    /// Apply pacing after an operation
    ///
    /// An unrecognised shape is an error, and the worker stops on it.
    pub async fn apply(&self, load_start: Instant, shutdown: &Shutdown) -> Result<()> {
        match self {
            Pacing::Disabled => Ok(()),
            Pacing::Enabled(pacer) => {
                pacer.pace(load_start, shutdown).await;
                Ok(())
            }
            Pacing::Invalid(name) => Err(Error::UnknownDistribution(name.clone())),
        }
    }
}

/// Normal probability density at `x`
pub fn normal_density(x: f64, mean: f64, std_dev: f64) -> f64 {
    let z = (x - mean) / std_dev;
    (-0.5 * z * z).exp() / ((2.0 * std::f64::consts::PI).sqrt() * std_dev)
}

/// Staircase multiplier in `{0, 1, 2, 3}`, falling as the position advances
pub fn step_multiplier(position: u64, period: u64) -> f64 {
    let period = period.max(1) as f64;
    (3.0 - 3.0 * position as f64 / period).round().clamp(0.0, 3.0)
}

fn clamp_nanos(nanos: f64) -> f64 {
    if nanos.is_nan() {
        0.0
    } else {
        nanos.clamp(0.0, MAX_PACING_NANOS)
    }
}
