//! Shared noise for the `noise_*` pacing shapes

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use rand::Rng;

/// Noise value memoised per period position and shared by all workers
///
/// The cache is deliberately unsynchronised: bucket and value are two relaxed
/// atomics, so a worker may briefly read the previous bucket's value while
/// another worker is replacing it. Noise is cosmetic jitter and throughput
/// guarantees never depend on it.
#[derive(Debug)]
pub struct NoiseCache {
    bucket: AtomicI64,
    value: AtomicU64,
}

static SHARED: OnceLock<Arc<NoiseCache>> = OnceLock::new();

impl NoiseCache {
    /// Create an empty cache
    pub const fn new() -> Self {
        Self {
            bucket: AtomicI64::new(-1),
            value: AtomicU64::new(0),
        }
    }

    /// The process-wide cache; it is never reset between runs
    pub fn shared() -> Arc<NoiseCache> {
        Arc::clone(SHARED.get_or_init(|| Arc::new(NoiseCache::new())))
    }

    /// Noise fraction for `bucket`, resampled only when the bucket changes
    ///
    /// A ratio of zero always yields zero and leaves the cache untouched.
    pub fn noise(&self, bucket: u64, ratio: f64) -> f64 {
        if ratio <= 0.0 {
            return 0.0;
        }

        let bucket = i64::try_from(bucket).unwrap_or(i64::MAX);
        if self.bucket.load(Ordering::Relaxed) == bucket {
            return f64::from_bits(self.value.load(Ordering::Relaxed));
        }

        let value = sample_noise(ratio, &mut rand::thread_rng());
        self.value.store(value.to_bits(), Ordering::Relaxed);
        self.bucket.store(bucket, Ordering::Relaxed);
        value
    }
}

impl Default for NoiseCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Interval noise is drawn from for a ratio `y`: `[-y/(1+y), y/(1-y)]`
///
/// `y = 1` would be unbounded above and is pinned to `[-1/2, 2]`.
pub fn noise_bounds(ratio: f64) -> (f64, f64) {
    let ratio = ratio.clamp(0.0, 1.0);
    if ratio >= 1.0 {
        (-0.5, 2.0)
    } else {
        (-ratio / (1.0 + ratio), ratio / (1.0 - ratio))
    }
}

/// Draw one noise fraction uniformly from [`noise_bounds`]
pub fn sample_noise<R: Rng>(ratio: f64, rng: &mut R) -> f64 {
    if ratio <= 0.0 {
        return 0.0;
    }
    let (low, high) = noise_bounds(ratio);
    rng.gen_range(low..=high)
}
