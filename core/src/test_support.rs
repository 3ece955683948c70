//! Mock collaborators shared by the worker and coordinator tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::traits::{
    AnalyzeDb, Db, Measurement, OperationError, Record, ThreadContext, Workload,
};

// ============================================================================
// Mock Db
// ============================================================================

#[derive(Default)]
pub(crate) struct MockDb {
    supports_analyze: bool,
    pub(crate) inits: AtomicUsize,
    pub(crate) cleanups: AtomicUsize,
    /// (table, cleanups seen at the time of the call)
    pub(crate) analyzed: Mutex<Vec<(String, usize)>>,
}

impl MockDb {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_analyze() -> Self {
        Self {
            supports_analyze: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Db for MockDb {
    fn name(&self) -> &str {
        "mock"
    }

    fn init_thread(&self, _ctx: &ThreadContext) {
        self.inits.fetch_add(1, Ordering::SeqCst);
    }

    fn cleanup_thread(&self, _ctx: &ThreadContext) {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
    }

    async fn read(
        &self,
        _table: &str,
        _key: &str,
        _fields: Option<&[String]>,
    ) -> Result<Record, OperationError> {
        Ok(Record::new())
    }

    async fn scan(
        &self,
        _table: &str,
        _start_key: &str,
        _count: usize,
        _fields: Option<&[String]>,
    ) -> Result<Vec<Record>, OperationError> {
        Ok(Vec::new())
    }

    async fn update(&self, _table: &str, _key: &str, _values: Record) -> Result<(), OperationError> {
        Ok(())
    }

    async fn insert(&self, _table: &str, _key: &str, _values: Record) -> Result<(), OperationError> {
        Ok(())
    }

    async fn delete(&self, _table: &str, _key: &str) -> Result<(), OperationError> {
        Ok(())
    }

    fn as_analyze(&self) -> Option<&dyn AnalyzeDb> {
        if self.supports_analyze {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl AnalyzeDb for MockDb {
    async fn analyze(&self, table: &str) -> Result<(), OperationError> {
        let cleanups = self.cleanups.load(Ordering::SeqCst);
        self.analyzed
            .lock()
            .unwrap()
            .push((table.to_string(), cleanups));
        Ok(())
    }
}

// ============================================================================
// Mock Workload
// ============================================================================

#[derive(Default)]
pub(crate) struct MockWorkload {
    delay: Option<Duration>,
    fail_every: Option<usize>,
    pub(crate) transactions: AtomicUsize,
    pub(crate) batch_transactions: AtomicUsize,
    pub(crate) inserts: AtomicUsize,
    pub(crate) batch_inserts: AtomicUsize,
    pub(crate) inits: AtomicUsize,
    pub(crate) cleanups: AtomicUsize,
    calls: AtomicUsize,
    /// Calls per worker, indexed by thread id
    pub(crate) per_thread: Mutex<Vec<usize>>,
}

impl MockWorkload {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn with_fail_every(mut self, n: usize) -> Self {
        self.fail_every = Some(n);
        self
    }

    pub(crate) fn calls_by(&self, thread_id: usize) -> usize {
        self.per_thread
            .lock()
            .unwrap()
            .get(thread_id)
            .copied()
            .unwrap_or(0)
    }

    async fn call(&self, ctx: &ThreadContext) -> Result<(), OperationError> {
        {
            let mut per_thread = self.per_thread.lock().unwrap();
            if per_thread.len() <= ctx.thread_id {
                per_thread.resize(ctx.thread_id + 1, 0);
            }
            per_thread[ctx.thread_id] += 1;
        }
        let count = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.fail_every {
            Some(n) if count % n == 0 => Err(OperationError::store("simulated failure")),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Workload for MockWorkload {
    fn name(&self) -> &str {
        "mock"
    }

    fn init_thread(&self, _ctx: &ThreadContext) {
        self.inits.fetch_add(1, Ordering::SeqCst);
    }

    fn cleanup_thread(&self, _ctx: &ThreadContext) {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
    }

    async fn do_insert(&self, ctx: &ThreadContext, _db: &dyn Db) -> Result<(), OperationError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.call(ctx).await
    }

    async fn do_batch_insert(
        &self,
        ctx: &ThreadContext,
        _batch_size: usize,
        _db: &dyn Db,
    ) -> Result<(), OperationError> {
        self.batch_inserts.fetch_add(1, Ordering::SeqCst);
        self.call(ctx).await
    }

    async fn do_transaction(
        &self,
        ctx: &ThreadContext,
        _db: &dyn Db,
    ) -> Result<(), OperationError> {
        self.transactions.fetch_add(1, Ordering::SeqCst);
        self.call(ctx).await
    }

    async fn do_batch_transaction(
        &self,
        ctx: &ThreadContext,
        _batch_size: usize,
        _db: &dyn Db,
    ) -> Result<(), OperationError> {
        self.batch_transactions.fetch_add(1, Ordering::SeqCst);
        self.call(ctx).await
    }
}

// ============================================================================
// Mock Measurement
// ============================================================================

pub(crate) struct MockMeasurement {
    warm_up: AtomicBool,
    pub(crate) warm_up_disabled: AtomicUsize,
    pub(crate) outputs: AtomicUsize,
}

impl MockMeasurement {
    pub(crate) fn new(warm_up: bool) -> Self {
        Self {
            warm_up: AtomicBool::new(warm_up),
            warm_up_disabled: AtomicUsize::new(0),
            outputs: AtomicUsize::new(0),
        }
    }
}

impl Measurement for MockMeasurement {
    fn enable_warm_up(&self, enabled: bool) {
        if !enabled {
            self.warm_up_disabled.fetch_add(1, Ordering::SeqCst);
        }
        self.warm_up.store(enabled, Ordering::SeqCst);
    }

    fn is_warm_up_finished(&self) -> bool {
        !self.warm_up.load(Ordering::SeqCst)
    }

    fn output(&self) {
        self.outputs.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) fn arcs(
    workload: MockWorkload,
    db: MockDb,
    measurement: MockMeasurement,
) -> (Arc<MockWorkload>, Arc<MockDb>, Arc<MockMeasurement>) {
    (Arc::new(workload), Arc::new(db), Arc::new(measurement))
}
