//! The core key-value workload
//!
//! Records are `fieldcount` fields of `fieldlength` random alphanumeric
//! bytes. Transactions mix reads, updates, inserts, scans and
//! read-modify-writes by the configured proportions.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use rand::distributions::{Alphanumeric, Distribution, WeightedIndex};
use rand::Rng;
use rand_distr::Zipf;

use loadpace_core::{Db, OperationError, Record, RunConfig, ThreadContext, Workload};

use crate::error::WorkloadError;

const DEFAULT_ZIPFIAN_CONSTANT: f64 = 0.99;

/// How transaction keys are picked among the records loaded so far
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDistribution {
    /// Every record equally likely
    Uniform,
    /// A few records are hot, scattered across the key space
    Zipfian,
    /// The most recently inserted records are hot
    Latest,
}

impl std::str::FromStr for KeyDistribution {
    type Err = WorkloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uniform" => Ok(KeyDistribution::Uniform),
            "zipfian" => Ok(KeyDistribution::Zipfian),
            "latest" => Ok(KeyDistribution::Latest),
            other => Err(WorkloadError::UnknownDistribution(other.to_string())),
        }
    }
}

/// One transaction kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transaction {
    Read,
    Update,
    Insert,
    Scan,
    ReadModifyWrite,
}

const TRANSACTIONS: [Transaction; 5] = [
    Transaction::Read,
    Transaction::Update,
    Transaction::Insert,
    Transaction::Scan,
    Transaction::ReadModifyWrite,
];

/// Properties of the core workload
#[derive(Debug, Clone, PartialEq)]
pub struct CoreWorkloadConfig {
    pub table: String,
    pub field_count: usize,
    pub field_length: usize,
    pub record_count: u64,
    pub insert_start: u64,
    pub read_proportion: f64,
    pub update_proportion: f64,
    pub insert_proportion: f64,
    pub scan_proportion: f64,
    pub read_modify_write_proportion: f64,
    pub max_scan_length: usize,
    pub request_distribution: KeyDistribution,
    pub zipfian_constant: f64,
    pub read_all_fields: bool,
    pub write_all_fields: bool,
    /// Hash key numbers so inserts do not arrive in key order
    pub hashed_keys: bool,
}

impl Default for CoreWorkloadConfig {
    fn default() -> Self {
        Self {
            table: "usertable".to_string(),
            field_count: 10,
            field_length: 100,
            record_count: 0,
            insert_start: 0,
            read_proportion: 0.95,
            update_proportion: 0.05,
            insert_proportion: 0.0,
            scan_proportion: 0.0,
            read_modify_write_proportion: 0.0,
            max_scan_length: 1000,
            request_distribution: KeyDistribution::Uniform,
            zipfian_constant: DEFAULT_ZIPFIAN_CONSTANT,
            read_all_fields: true,
            write_all_fields: false,
            hashed_keys: true,
        }
    }
}

impl CoreWorkloadConfig {
    /// Read workload properties out of a run configuration
    pub fn from_run_config(config: &RunConfig) -> Result<Self, WorkloadError> {
        let defaults = Self::default();
        let usize_prop = |key: &str, default: usize| {
            config.extra_u64(key).map_or(default, |v| v as usize)
        };
        let f64_prop = |key: &str, default: f64| config.extra_f64(key).unwrap_or(default);

        let request_distribution = match config.extra_str("requestdistribution") {
            Some(name) => name.parse()?,
            None => defaults.request_distribution,
        };
        let hashed_keys = match config.extra_str("insertorder") {
            None | Some("hashed") => true,
            Some("ordered") => false,
            Some(other) => {
                return Err(WorkloadError::InvalidProperty {
                    name: "insertorder",
                    value: other.to_string(),
                })
            }
        };

        let workload = Self {
            table: config
                .extra_str("table")
                .map_or_else(|| config.table_name.clone(), str::to_string),
            field_count: usize_prop("fieldcount", defaults.field_count),
            field_length: usize_prop("fieldlength", defaults.field_length),
            record_count: config.record_count.unwrap_or(defaults.record_count),
            insert_start: config.extra_u64("insertstart").unwrap_or(defaults.insert_start),
            read_proportion: f64_prop("readproportion", defaults.read_proportion),
            update_proportion: f64_prop("updateproportion", defaults.update_proportion),
            insert_proportion: f64_prop("insertproportion", defaults.insert_proportion),
            scan_proportion: f64_prop("scanproportion", defaults.scan_proportion),
            read_modify_write_proportion: f64_prop(
                "readmodifywriteproportion",
                defaults.read_modify_write_proportion,
            ),
            max_scan_length: usize_prop("maxscanlength", defaults.max_scan_length),
            request_distribution,
            zipfian_constant: f64_prop("zipfianconstant", defaults.zipfian_constant),
            read_all_fields: config
                .extra_bool("readallfields")
                .unwrap_or(defaults.read_all_fields),
            write_all_fields: config
                .extra_bool("writeallfields")
                .unwrap_or(defaults.write_all_fields),
            hashed_keys,
        };

        if workload.field_count == 0 {
            return Err(WorkloadError::InvalidProperty {
                name: "fieldcount",
                value: "0".to_string(),
            });
        }
        if workload.max_scan_length == 0 {
            return Err(WorkloadError::InvalidProperty {
                name: "maxscanlength",
                value: "0".to_string(),
            });
        }

        Ok(workload)
    }

    fn proportions(&self) -> [f64; 5] {
        [
            self.read_proportion,
            self.update_proportion,
            self.insert_proportion,
            self.scan_proportion,
            self.read_modify_write_proportion,
        ]
    }
}

/// The core workload
#[derive(Debug)]
pub struct CoreWorkload {
    config: CoreWorkloadConfig,
    field_names: Vec<String>,
    transactions: WeightedIndex<f64>,
    zipf: Option<Zipf<f64>>,
    /// Key number of the next insert
    next_key: AtomicU64,
}

impl CoreWorkload {
    /// Create the workload; `load` selects where insert keys start
    pub fn new(config: CoreWorkloadConfig, load: bool) -> Result<Self, WorkloadError> {
        let transactions =
            WeightedIndex::new(config.proportions()).map_err(|_| WorkloadError::NoOperations)?;

        let zipf = match config.request_distribution {
            KeyDistribution::Uniform => None,
            KeyDistribution::Zipfian | KeyDistribution::Latest => Some(
                Zipf::new(config.record_count.max(1), config.zipfian_constant).map_err(|_| {
                    WorkloadError::InvalidProperty {
                        name: "zipfianconstant",
                        value: config.zipfian_constant.to_string(),
                    }
                })?,
            ),
        };

        let first_key = if load {
            config.insert_start
        } else {
            config.record_count
        };
        let field_names = (0..config.field_count).map(|i| format!("field{i}")).collect();

        Ok(Self {
            config,
            field_names,
            transactions,
            zipf,
            next_key: AtomicU64::new(first_key),
        })
    }

    /// Build from a run configuration
    pub fn from_run_config(config: &RunConfig) -> Result<Self, WorkloadError> {
        Self::new(
            CoreWorkloadConfig::from_run_config(config)?,
            !config.do_transactions,
        )
    }

    pub fn config(&self) -> &CoreWorkloadConfig {
        &self.config
    }

    /// Key for a key number
    pub fn key(&self, keynum: u64) -> String {
        let keynum = if self.config.hashed_keys {
            fnv1a(keynum)
        } else {
            keynum
        };
        format!("user{keynum}")
    }

    /// Pick an existing key number for a transaction
    fn choose_keynum<R: Rng>(&self, rng: &mut R) -> u64 {
        let count = self.next_key.load(Ordering::Relaxed).max(1);
        match (self.config.request_distribution, &self.zipf) {
            (KeyDistribution::Zipfian, Some(zipf)) => {
                let rank = zipf.sample(rng) as u64 - 1;
                fnv1a(rank) % count
            }
            (KeyDistribution::Latest, Some(zipf)) => {
                let rank = zipf.sample(rng) as u64 - 1;
                count - 1 - rank % count
            }
            _ => rng.gen_range(0..count),
        }
    }

    fn choose_transaction<R: Rng>(&self, rng: &mut R) -> Transaction {
        TRANSACTIONS[self.transactions.sample(rng)]
    }

    fn random_value<R: Rng>(&self, rng: &mut R) -> Vec<u8> {
        (0..self.config.field_length)
            .map(|_| rng.sample(Alphanumeric))
            .collect()
    }

    fn random_field<R: Rng>(&self, rng: &mut R) -> String {
        self.field_names[rng.gen_range(0..self.field_names.len())].clone()
    }

    fn full_record<R: Rng>(&self, rng: &mut R) -> Record {
        self.field_names
            .iter()
            .map(|name| (name.clone(), self.random_value(rng)))
            .collect()
    }

    fn update_values<R: Rng>(&self, rng: &mut R) -> Record {
        if self.config.write_all_fields {
            self.full_record(rng)
        } else {
            Record::from([(self.random_field(rng), self.random_value(rng))])
        }
    }

    fn read_fields<R: Rng>(&self, rng: &mut R) -> Option<Vec<String>> {
        (!self.config.read_all_fields).then(|| vec![self.random_field(rng)])
    }

    async fn insert_next(&self, db: &dyn Db) -> Result<(), OperationError> {
        let keynum = self.next_key.fetch_add(1, Ordering::Relaxed);
        let values = self.full_record(&mut rand::thread_rng());
        db.insert(&self.config.table, &self.key(keynum), values).await
    }

    async fn transaction(&self, db: &dyn Db) -> Result<(), OperationError> {
        let table = &self.config.table;
        // ThreadRng is not Send: draw everything before the first await
        let (transaction, keynum, fields, values, scan_length) = {
            let mut rng = rand::thread_rng();
            let transaction = self.choose_transaction(&mut rng);
            let keynum = self.choose_keynum(&mut rng);
            let fields = self.read_fields(&mut rng);
            let values = self.update_values(&mut rng);
            let scan_length = rng.gen_range(1..=self.config.max_scan_length);
            (transaction, keynum, fields, values, scan_length)
        };
        let key = self.key(keynum);

        match transaction {
            Transaction::Read => db.read(table, &key, fields.as_deref()).await.map(|_| ()),
            Transaction::Update => db.update(table, &key, values).await,
            Transaction::Insert => self.insert_next(db).await,
            Transaction::Scan => db
                .scan(table, &key, scan_length, fields.as_deref())
                .await
                .map(|_| ()),
            Transaction::ReadModifyWrite => {
                db.read(table, &key, fields.as_deref()).await?;
                db.update(table, &key, values).await
            }
        }
    }
}

#[async_trait]
impl Workload for CoreWorkload {
    fn name(&self) -> &str {
        "core"
    }

    fn init_thread(&self, ctx: &ThreadContext) {
        tracing::trace!(
            thread_id = ctx.thread_id,
            table = %self.config.table,
            "Workload thread ready"
        );
    }

    async fn do_insert(&self, _ctx: &ThreadContext, db: &dyn Db) -> Result<(), OperationError> {
        self.insert_next(db).await
    }

    async fn do_batch_insert(
        &self,
        ctx: &ThreadContext,
        batch_size: usize,
        db: &dyn Db,
    ) -> Result<(), OperationError> {
        let mut first_error = None;
        for _ in 0..batch_size {
            if ctx.shutdown.is_triggered() {
                return Err(OperationError::Cancelled);
            }
            if let Err(e) = self.insert_next(db).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn do_transaction(
        &self,
        _ctx: &ThreadContext,
        db: &dyn Db,
    ) -> Result<(), OperationError> {
        self.transaction(db).await
    }

    async fn do_batch_transaction(
        &self,
        ctx: &ThreadContext,
        batch_size: usize,
        db: &dyn Db,
    ) -> Result<(), OperationError> {
        let mut first_error = None;
        for _ in 0..batch_size {
            if ctx.shutdown.is_triggered() {
                return Err(OperationError::Cancelled);
            }
            if let Err(e) = self.transaction(db).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// 64-bit FNV-1a over the little-endian bytes of `value`
fn fnv1a(value: u64) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    value
        .to_le_bytes()
        .iter()
        .fold(OFFSET, |hash, &byte| (hash ^ byte as u64).wrapping_mul(PRIME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadpace_core::Shutdown;
    use loadpace_stores::MemoryStore;

    fn run_config(pairs: &[(&str, &str)]) -> RunConfig {
        let overrides: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RunConfig::load(None, &overrides).unwrap()
    }

    fn ctx() -> ThreadContext {
        ThreadContext::new(0, 1, Shutdown::new())
    }

    #[test]
    fn test_config_defaults() {
        let config = CoreWorkloadConfig::from_run_config(&RunConfig::default()).unwrap();
        assert_eq!(config.table, "usertable");
        assert_eq!(config.field_count, 10);
        assert_eq!(config.request_distribution, KeyDistribution::Uniform);
        assert!(config.read_all_fields);
    }

    #[test]
    fn test_config_from_properties() {
        let config = CoreWorkloadConfig::from_run_config(&run_config(&[
            ("fieldcount", "3"),
            ("readproportion", "0.5"),
            ("scanproportion", "0.5"),
            ("updateproportion", "0"),
            ("requestdistribution", "zipfian"),
            ("readallfields", "false"),
            ("table", "orders"),
        ]))
        .unwrap();

        assert_eq!(config.field_count, 3);
        assert_eq!(config.scan_proportion, 0.5);
        assert_eq!(config.update_proportion, 0.0);
        assert_eq!(config.request_distribution, KeyDistribution::Zipfian);
        assert!(!config.read_all_fields);
        assert_eq!(config.table, "orders");
    }

    #[test]
    fn test_config_rejects_unknown_distribution() {
        let err = CoreWorkloadConfig::from_run_config(&run_config(&[(
            "requestdistribution",
            "hotspot",
        )]))
        .unwrap_err();
        assert!(matches!(err, WorkloadError::UnknownDistribution(_)));
    }

    #[test]
    fn test_all_zero_proportions() {
        let config = CoreWorkloadConfig {
            read_proportion: 0.0,
            update_proportion: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            CoreWorkload::new(config, false),
            Err(WorkloadError::NoOperations)
        ));
    }

    #[test]
    fn test_keys() {
        let ordered = CoreWorkload::new(
            CoreWorkloadConfig {
                hashed_keys: false,
                ..Default::default()
            },
            true,
        )
        .unwrap();
        assert_eq!(ordered.key(42), "user42");

        let hashed = CoreWorkload::new(CoreWorkloadConfig::default(), true).unwrap();
        assert_ne!(hashed.key(42), "user42");
        assert_eq!(hashed.key(42), hashed.key(42));
    }

    #[test]
    fn test_chosen_keys_stay_in_range() {
        for distribution in [
            KeyDistribution::Uniform,
            KeyDistribution::Zipfian,
            KeyDistribution::Latest,
        ] {
            let workload = CoreWorkload::new(
                CoreWorkloadConfig {
                    record_count: 100,
                    request_distribution: distribution,
                    ..Default::default()
                },
                false,
            )
            .unwrap();

            let mut rng = rand::thread_rng();
            for _ in 0..1000 {
                assert!(workload.choose_keynum(&mut rng) < 100);
            }
        }
    }

    #[test]
    fn test_latest_prefers_recent_keys() {
        let workload = CoreWorkload::new(
            CoreWorkloadConfig {
                record_count: 1000,
                request_distribution: KeyDistribution::Latest,
                ..Default::default()
            },
            false,
        )
        .unwrap();

        let mut rng = rand::thread_rng();
        let recent = (0..1000)
            .filter(|_| workload.choose_keynum(&mut rng) >= 900)
            .count();
        assert!(recent > 500, "recent {recent}");
    }

    #[tokio::test]
    async fn test_load_then_transactions() {
        let store = MemoryStore::new();
        let config = CoreWorkloadConfig {
            record_count: 50,
            field_count: 4,
            field_length: 8,
            read_proportion: 0.4,
            update_proportion: 0.2,
            scan_proportion: 0.2,
            read_modify_write_proportion: 0.2,
            max_scan_length: 5,
            ..Default::default()
        };

        let loader = CoreWorkload::new(config.clone(), true).unwrap();
        for _ in 0..50 {
            loader.do_insert(&ctx(), &store).await.unwrap();
        }
        assert_eq!(store.len("usertable").await, 50);

        let record = store.read("usertable", &loader.key(0), None).await.unwrap();
        assert_eq!(record.len(), 4);
        assert!(record.values().all(|v| v.len() == 8));

        // Every key a transaction picks was loaded, so none of them fail
        let runner = CoreWorkload::new(config, false).unwrap();
        for _ in 0..200 {
            runner.do_transaction(&ctx(), &store).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_batch_insert() {
        let store = MemoryStore::new();
        let workload = CoreWorkload::new(CoreWorkloadConfig::default(), true).unwrap();

        workload.do_batch_insert(&ctx(), 7, &store).await.unwrap();
        assert_eq!(store.len("usertable").await, 7);
    }

    #[tokio::test]
    async fn test_batch_stops_when_cancelled() {
        let store = MemoryStore::new();
        let workload = CoreWorkload::new(CoreWorkloadConfig::default(), true).unwrap();
        let ctx = ctx();
        ctx.shutdown.trigger();

        let err = workload.do_batch_insert(&ctx, 7, &store).await.unwrap_err();
        assert!(matches!(err, OperationError::Cancelled));
        assert_eq!(store.len("usertable").await, 0);
    }

    #[tokio::test]
    async fn test_run_phase_inserts_follow_loaded_keys() {
        let store = MemoryStore::new();
        let config = CoreWorkloadConfig {
            record_count: 10,
            hashed_keys: false,
            read_proportion: 0.0,
            update_proportion: 0.0,
            insert_proportion: 1.0,
            ..Default::default()
        };
        let runner = CoreWorkload::new(config, false).unwrap();
        runner.do_transaction(&ctx(), &store).await.unwrap();

        assert!(store.read("usertable", "user10", None).await.is_ok());
    }

    #[test]
    fn test_fnv1a_spreads_neighbours() {
        assert_ne!(fnv1a(1), fnv1a(2));
        assert_ne!(fnv1a(1), 1);
    }
}
