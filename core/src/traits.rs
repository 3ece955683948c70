//! Collaborator traits: workloads, data stores and measurement
//!
//! The engine only drives these; implementations live in their own crates
//! (`loadpace-workloads`, `loadpace-stores`) or in [`crate::metrics`].

use std::collections::HashMap;

use async_trait::async_trait;

use crate::shutdown::Shutdown;

/// Field name to value, as stored by a [`Db`]
pub type Record = HashMap<String, Vec<u8>>;

/// Per-worker context handed to collaborators
#[derive(Debug, Clone)]
pub struct ThreadContext {
    /// Index of the worker, `0..thread_count`
    pub thread_id: usize,
    /// Number of workers in the run
    pub thread_count: usize,
    /// Run-wide cancellation
    pub shutdown: Shutdown,
}

impl ThreadContext {
    /// Create a context for one worker
    pub fn new(thread_id: usize, thread_count: usize, shutdown: Shutdown) -> Self {
        Self {
            thread_id,
            thread_count,
            shutdown,
        }
    }
}

// ============================================================================
// Data store
// ============================================================================

/// Data store under test
#[async_trait]
pub trait Db: Send + Sync {
    /// Store identifier (e.g. "memory")
    fn name(&self) -> &str;

    /// Called on the worker before its first operation
    fn init_thread(&self, _ctx: &ThreadContext) {}

    /// Called on the worker after its last operation
    fn cleanup_thread(&self, _ctx: &ThreadContext) {}

    /// Read one record; `fields` of `None` means all fields
    async fn read(
        &self,
        table: &str,
        key: &str,
        fields: Option<&[String]>,
    ) -> Result<Record, OperationError>;

    /// Read up to `count` records in key order starting at `start_key`
    async fn scan(
        &self,
        table: &str,
        start_key: &str,
        count: usize,
        fields: Option<&[String]>,
    ) -> Result<Vec<Record>, OperationError>;

    /// Overwrite the given fields of an existing record
    async fn update(&self, table: &str, key: &str, values: Record) -> Result<(), OperationError>;

    /// Insert a new record
    async fn insert(&self, table: &str, key: &str, values: Record) -> Result<(), OperationError>;

    /// Remove a record
    async fn delete(&self, table: &str, key: &str) -> Result<(), OperationError>;

    /// Optional post-load analysis capability
    fn as_analyze(&self) -> Option<&dyn AnalyzeDb> {
        None
    }
}

/// Stores that can refresh their statistics after a bulk load
#[async_trait]
pub trait AnalyzeDb: Send + Sync {
    /// Analyze `table`
    async fn analyze(&self, table: &str) -> Result<(), OperationError>;
}

// ============================================================================
// Workload
// ============================================================================

/// Generator of operations against a [`Db`]
#[async_trait]
pub trait Workload: Send + Sync {
    /// Workload identifier (e.g. "core")
    fn name(&self) -> &str;

    /// Called on the worker before its first operation
    fn init_thread(&self, _ctx: &ThreadContext) {}

    /// Called on the worker after its last operation
    fn cleanup_thread(&self, _ctx: &ThreadContext) {}

    /// Insert one record (load phase)
    async fn do_insert(&self, ctx: &ThreadContext, db: &dyn Db) -> Result<(), OperationError>;

    /// Insert `batch_size` records (load phase)
    async fn do_batch_insert(
        &self,
        ctx: &ThreadContext,
        batch_size: usize,
        db: &dyn Db,
    ) -> Result<(), OperationError>;

    /// Perform one transaction (run phase)
    async fn do_transaction(&self, ctx: &ThreadContext, db: &dyn Db)
        -> Result<(), OperationError>;

    /// Perform `batch_size` transactions (run phase)
    async fn do_batch_transaction(
        &self,
        ctx: &ThreadContext,
        batch_size: usize,
        db: &dyn Db,
    ) -> Result<(), OperationError>;
}

// ============================================================================
// Measurement
// ============================================================================

/// Sink for measurements, owned outside the engine
pub trait Measurement: Send + Sync {
    /// Turn warm-up on or off; while on, measurements are discarded
    fn enable_warm_up(&self, enabled: bool);

    /// Whether the warm-up window has ended
    fn is_warm_up_finished(&self) -> bool;

    /// Emit a snapshot of what has been measured so far
    fn output(&self);
}

/// Errors returned by individual operations
///
/// These never stop a worker; they are logged unless the run is silenced.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    /// The record does not exist
    #[error("record {key:?} not found in table {table:?}")]
    NotFound {
        /// Table searched
        table: String,
        /// Key searched
        key: String,
    },

    /// The record already exists
    #[error("record {key:?} already exists in table {table:?}")]
    AlreadyExists {
        /// Table written
        table: String,
        /// Key written
        key: String,
    },

    /// The store rejected or failed the operation
    #[error("store error: {0}")]
    Store(String),

    /// The run was cancelled while the operation was in flight
    #[error("operation cancelled")]
    Cancelled,
}

impl OperationError {
    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }
}
