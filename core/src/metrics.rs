//! Operation metering
//!
//! [`OperationMeter`] is the built-in [`Measurement`]: lock-free counters per
//! operation kind, snapshotted by the coordinator's measurement loop. Stores
//! feed it through [`MeteredDb`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::traits::{AnalyzeDb, Db, Measurement, OperationError, Record, ThreadContext};

/// Kind of store operation being measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Single-record read
    Read,
    /// Ordered range read
    Scan,
    /// Field update of an existing record
    Update,
    /// New record
    Insert,
    /// Record removal
    Delete,
}

impl OperationKind {
    /// Every kind, in reporting order
    pub const ALL: [OperationKind; 5] = [
        OperationKind::Read,
        OperationKind::Scan,
        OperationKind::Update,
        OperationKind::Insert,
        OperationKind::Delete,
    ];

    /// Lowercase name used in snapshots
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Read => "read",
            OperationKind::Scan => "scan",
            OperationKind::Update => "update",
            OperationKind::Insert => "insert",
            OperationKind::Delete => "delete",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Where snapshots go
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// One structured `tracing` event per snapshot
    #[default]
    Log,
    /// One JSON object per line on stdout
    Json,
}

#[derive(Debug, Default)]
struct KindCounters {
    operations: AtomicU64,
    errors: AtomicU64,
    latency_us: AtomicU64,
}

#[derive(Debug)]
struct Interval {
    started: Instant,
    last_at: Instant,
    last_total: u64,
}

/// Counters for one operation kind in a snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct KindSnapshot {
    /// Operations recorded
    pub operations: u64,
    /// Recorded operations that failed
    pub errors: u64,
    /// Mean latency in microseconds, 0 with no operations
    pub avg_latency_us: f64,
}

/// Point-in-time view of the meter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterSnapshot {
    /// When the snapshot was taken
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Seconds since measuring began (end of warm-up, or meter creation)
    pub elapsed_secs: f64,
    /// Operations recorded across all kinds
    pub total_operations: u64,
    /// Failed operations across all kinds
    pub total_errors: u64,
    /// Operations since the previous snapshot
    pub interval_operations: u64,
    /// Throughput since the previous snapshot
    pub interval_ops_per_sec: f64,
    /// Throughput since measuring began
    pub overall_ops_per_sec: f64,
    /// Per-kind counters, keyed by [`OperationKind::as_str`]
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub operations: BTreeMap<String, KindSnapshot>,
}

/// Built-in [`Measurement`] backed by atomic counters
///
/// While warm-up is on, [`OperationMeter::record`] discards its input.
#[derive(Debug)]
pub struct OperationMeter {
    warm_up: AtomicBool,
    format: OutputFormat,
    counters: [KindCounters; 5],
    interval: Mutex<Interval>,
}

impl OperationMeter {
    /// Create a meter; `warm_up` is the initial warm-up state
    pub fn new(warm_up: bool, format: OutputFormat) -> Self {
        let now = Instant::now();
        Self {
            warm_up: AtomicBool::new(warm_up),
            format,
            counters: Default::default(),
            interval: Mutex::new(Interval {
                started: now,
                last_at: now,
                last_total: 0,
            }),
        }
    }

    /// Record one completed operation
    pub fn record(&self, kind: OperationKind, latency: Duration, ok: bool) {
        if self.warm_up.load(Ordering::Acquire) {
            return;
        }
        let counters = &self.counters[kind.index()];
        counters.operations.fetch_add(1, Ordering::Relaxed);
        counters
            .latency_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
        if !ok {
            counters.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Operations recorded so far, all kinds
    pub fn total_operations(&self) -> u64 {
        self.counters
            .iter()
            .map(|c| c.operations.load(Ordering::Relaxed))
            .sum()
    }

    /// Take a snapshot and advance the interval
    pub fn snapshot(&self) -> MeterSnapshot {
        let mut operations = BTreeMap::new();
        let mut total_operations = 0;
        let mut total_errors = 0;

        for kind in OperationKind::ALL {
            let counters = &self.counters[kind.index()];
            let ops = counters.operations.load(Ordering::Relaxed);
            if ops == 0 {
                continue;
            }
            let errors = counters.errors.load(Ordering::Relaxed);
            let latency = counters.latency_us.load(Ordering::Relaxed);
            total_operations += ops;
            total_errors += errors;
            operations.insert(
                kind.as_str().to_string(),
                KindSnapshot {
                    operations: ops,
                    errors,
                    avg_latency_us: latency as f64 / ops as f64,
                },
            );
        }

        let now = Instant::now();
        let mut interval = self.interval.lock().unwrap_or_else(|e| e.into_inner());
        let elapsed = now.duration_since(interval.started).as_secs_f64();
        let since_last = now.duration_since(interval.last_at).as_secs_f64();
        let interval_operations = total_operations.saturating_sub(interval.last_total);
        interval.last_at = now;
        interval.last_total = total_operations;

        MeterSnapshot {
            timestamp: chrono::Utc::now(),
            elapsed_secs: elapsed,
            total_operations,
            total_errors,
            interval_operations,
            interval_ops_per_sec: rate(interval_operations, since_last),
            overall_ops_per_sec: rate(total_operations, elapsed),
            operations,
        }
    }
}

impl Measurement for OperationMeter {
    fn enable_warm_up(&self, enabled: bool) {
        let was = self.warm_up.swap(enabled, Ordering::AcqRel);
        if was && !enabled {
            // Throughput is reported from the end of warm-up
            let now = Instant::now();
            let mut interval = self.interval.lock().unwrap_or_else(|e| e.into_inner());
            interval.started = now;
            interval.last_at = now;
            interval.last_total = self.total_operations();
        }
    }

    fn is_warm_up_finished(&self) -> bool {
        !self.warm_up.load(Ordering::Acquire)
    }

    fn output(&self) {
        let snapshot = self.snapshot();
        match self.format {
            OutputFormat::Log => {
                tracing::info!(
                    elapsed_secs = format!("{:.1}", snapshot.elapsed_secs),
                    total = snapshot.total_operations,
                    errors = snapshot.total_errors,
                    interval = snapshot.interval_operations,
                    ops_per_sec = format!("{:.1}", snapshot.interval_ops_per_sec),
                    "Measurement"
                );
                for (kind, stats) in &snapshot.operations {
                    tracing::info!(
                        kind = %kind,
                        operations = stats.operations,
                        errors = stats.errors,
                        avg_latency_us = format!("{:.1}", stats.avg_latency_us),
                        "Measurement by kind"
                    );
                }
            }
            OutputFormat::Json => match serde_json::to_string(&snapshot) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "Failed to serialize measurement"),
            },
        }
    }
}

fn rate(operations: u64, secs: f64) -> f64 {
    if secs > 0.0 {
        operations as f64 / secs
    } else {
        0.0
    }
}

// ============================================================================
// Metered store
// ============================================================================

/// A [`Db`] that times every operation into an [`OperationMeter`]
pub struct MeteredDb {
    inner: Arc<dyn Db>,
    meter: Arc<OperationMeter>,
}

impl MeteredDb {
    /// Wrap `inner`, recording into `meter`
    pub fn new(inner: Arc<dyn Db>, meter: Arc<OperationMeter>) -> Self {
        Self { inner, meter }
    }

    fn observe<T>(&self, kind: OperationKind, started: Instant, result: &Result<T, OperationError>) {
        self.meter.record(kind, started.elapsed(), result.is_ok());
    }
}

#[async_trait]
impl Db for MeteredDb {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn init_thread(&self, ctx: &ThreadContext) {
        self.inner.init_thread(ctx)
    }

    fn cleanup_thread(&self, ctx: &ThreadContext) {
        self.inner.cleanup_thread(ctx)
    }

    async fn read(
        &self,
        table: &str,
        key: &str,
        fields: Option<&[String]>,
    ) -> Result<Record, OperationError> {
        let started = Instant::now();
        let result = self.inner.read(table, key, fields).await;
        self.observe(OperationKind::Read, started, &result);
        result
    }

    async fn scan(
        &self,
        table: &str,
        start_key: &str,
        count: usize,
        fields: Option<&[String]>,
    ) -> Result<Vec<Record>, OperationError> {
        let started = Instant::now();
        let result = self.inner.scan(table, start_key, count, fields).await;
        self.observe(OperationKind::Scan, started, &result);
        result
    }

    async fn update(&self, table: &str, key: &str, values: Record) -> Result<(), OperationError> {
        let started = Instant::now();
        let result = self.inner.update(table, key, values).await;
        self.observe(OperationKind::Update, started, &result);
        result
    }

    async fn insert(&self, table: &str, key: &str, values: Record) -> Result<(), OperationError> {
        let started = Instant::now();
        let result = self.inner.insert(table, key, values).await;
        self.observe(OperationKind::Insert, started, &result);
        result
    }

    async fn delete(&self, table: &str, key: &str) -> Result<(), OperationError> {
        let started = Instant::now();
        let result = self.inner.delete(table, key).await;
        self.observe(OperationKind::Delete, started, &result);
        result
    }

    fn as_analyze(&self) -> Option<&dyn AnalyzeDb> {
        self.inner.as_analyze()
    }
}

impl std::fmt::Debug for MeteredDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeteredDb")
            .field("inner", &self.inner.name())
            .finish()
    }
}
