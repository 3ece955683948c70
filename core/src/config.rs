//! Run configuration and the per-worker parameters derived from it
//!
//! Field names follow the property names accepted on the command line and in
//! config files (`threadcount`, `operationcount`, `measurement.interval`, ...).
//! Keys the driver itself does not understand are kept in [`RunConfig::extra`]
//! and handed to the workload and store implementations.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::worker::{PacingParams, TimeDistribution};

/// Immutable description of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Number of concurrent workers
    #[serde(rename = "threadcount")]
    pub thread_count: usize,

    /// Total operations for a transaction run
    #[serde(rename = "operationcount", skip_serializing_if = "Option::is_none")]
    pub operation_count: Option<u64>,

    /// Total inserts for a load run; takes precedence over `recordcount`
    #[serde(rename = "insertcount", skip_serializing_if = "Option::is_none")]
    pub insert_count: Option<u64>,

    /// Number of records in the data set
    #[serde(rename = "recordcount", skip_serializing_if = "Option::is_none")]
    pub record_count: Option<u64>,

    /// Transaction run (`true`) or load run (`false`)
    pub do_transactions: bool,

    /// Operations per workload call; values above one enable batching
    #[serde(rename = "batchsize")]
    pub batch_size: usize,

    /// Aggregate target throughput in operations per second
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<u64>,

    /// Pacing shape name
    #[serde(rename = "timedistribution")]
    pub time_distribution: String,

    /// Mean of the `normal` shapes, in minutes within the period
    #[serde(rename = "expectedvalue")]
    pub expected_value: f64,

    /// Standard deviation of the `normal` shapes, in minutes
    #[serde(rename = "standarddeviation")]
    pub standard_deviation: f64,

    /// Base pacing delay in nanoseconds
    #[serde(rename = "timedelay")]
    pub time_delay: u64,

    /// Pacing period length in minutes
    #[serde(rename = "timeperiod")]
    pub time_period: u64,

    /// Noise ratio in `[0, 1]` for the `noise_*` shapes
    #[serde(rename = "noiseratio")]
    pub noise_ratio: f64,

    /// Warm-up window in seconds (transaction runs only)
    #[serde(rename = "warmuptime")]
    pub warm_up_time: u64,

    /// Seconds between measurement snapshots
    #[serde(rename = "measurement.interval")]
    pub measurement_interval: u64,

    /// Whether the distribution pacer runs at all
    pub normaldatain_time: bool,

    /// Suppress per-operation error logging
    pub silence: bool,

    /// Table used for post-load analysis
    #[serde(rename = "tablename")]
    pub table_name: String,

    /// Wall-clock limit for the whole run in seconds, 0 for none
    #[serde(rename = "maxexecutiontime")]
    pub max_execution_time: u64,

    /// Properties meant for the workload and store
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            thread_count: 1,
            operation_count: None,
            insert_count: None,
            record_count: None,
            do_transactions: true,
            batch_size: 1,
            target: None,
            time_distribution: "none".to_string(),
            expected_value: 12.0,
            standard_deviation: 4.0,
            time_delay: 1_000_000,
            time_period: 24,
            noise_ratio: 0.0,
            warm_up_time: 0,
            measurement_interval: 10,
            normaldatain_time: false,
            silence: true,
            table_name: "usertable".to_string(),
            max_execution_time: 0,
            extra: BTreeMap::new(),
        }
    }
}

impl RunConfig {
    /// Load a config from an optional YAML file, then apply `key=value` overrides
    ///
    /// Override values are read as YAML scalars, so `target=100` is a number and
    /// `silence=false` a boolean; anything else stays a string.
    pub fn load(path: Option<&Path>, overrides: &[(String, String)]) -> Result<Self, ConfigError> {
        let mut mapping = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path).map_err(|source| {
                    ConfigError::Read {
                        path: path.to_path_buf(),
                        source,
                    }
                })?;
                match serde_yaml::from_str::<Value>(&contents)? {
                    Value::Mapping(mapping) => mapping,
                    Value::Null => Mapping::new(),
                    _ => return Err(ConfigError::NotAMapping(path.to_path_buf())),
                }
            }
            None => Mapping::new(),
        };

        for (key, raw) in overrides {
            mapping.insert(Value::String(key.clone()), override_value(raw));
        }

        Ok(serde_yaml::from_value(Value::Mapping(mapping))?)
    }

    /// Total operations across all workers, picked by run type
    pub fn total_operation_count(&self) -> u64 {
        if self.do_transactions {
            self.operation_count.unwrap_or(0)
        } else {
            self.insert_count.or(self.record_count).unwrap_or(0)
        }
    }

    /// Operations each worker performs
    ///
    /// Truncates: up to `thread_count - 1` operations of the total are never issued.
    pub fn per_worker_operation_count(&self) -> u64 {
        self.total_operation_count() / self.thread_count.max(1) as u64
    }

    /// Target throughput of one worker in operations per millisecond
    pub fn per_worker_ops_per_ms(&self) -> Option<f64> {
        self.target.filter(|&t| t > 0).map(|target| {
            let per_thread = target as f64 / self.thread_count.max(1) as f64;
            per_thread / 1000.0
        })
    }

    /// Minimum spacing between two operations of one worker, if throttled
    pub fn per_worker_tick(&self) -> Option<Duration> {
        self.per_worker_ops_per_ms()
            .map(|ops_per_ms| Duration::from_nanos((1_000_000.0 / ops_per_ms) as u64))
    }

    /// Warm-up window; load runs never warm up
    pub fn warm_up(&self) -> Duration {
        if self.do_transactions {
            Duration::from_secs(self.warm_up_time)
        } else {
            Duration::ZERO
        }
    }

    /// Spacing of measurement snapshots
    pub fn measurement_interval(&self) -> Duration {
        Duration::from_secs(self.measurement_interval)
    }

    /// Parameters of the distribution pacer
    pub fn pacing_params(&self) -> PacingParams {
        PacingParams {
            mean: self.expected_value,
            std_dev: self.standard_deviation,
            delay: self.time_delay as f64,
            period: self.time_period,
            noise_ratio: self.noise_ratio,
        }
    }

    /// Read a string property from [`RunConfig::extra`]
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }

    /// Read a float property from [`RunConfig::extra`]
    pub fn extra_f64(&self, key: &str) -> Option<f64> {
        self.extra.get(key).and_then(Value::as_f64)
    }

    /// Read an integer property from [`RunConfig::extra`]
    pub fn extra_u64(&self, key: &str) -> Option<u64> {
        self.extra.get(key).and_then(Value::as_u64)
    }

    /// Read a boolean property from [`RunConfig::extra`]
    pub fn extra_bool(&self, key: &str) -> Option<bool> {
        self.extra.get(key).and_then(Value::as_bool)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thread_count == 0 {
            return Err(ConfigError::ZeroThreads);
        }

        let total = self.total_operation_count();
        if total < self.thread_count as u64 {
            return Err(ConfigError::TooFewOperations {
                total,
                thread_count: self.thread_count,
            });
        }

        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }

        if !(0.0..=1.0).contains(&self.noise_ratio) {
            return Err(ConfigError::NoiseRatio(self.noise_ratio));
        }

        if self.measurement_interval == 0 {
            return Err(ConfigError::ZeroInterval);
        }

        if self.normaldatain_time {
            self.time_distribution
                .parse::<TimeDistribution>()
                .map_err(|_| ConfigError::UnknownDistribution(self.time_distribution.clone()))?;

            if self.time_period == 0 {
                return Err(ConfigError::ZeroPeriod);
            }
            if self.standard_deviation <= 0.0 {
                return Err(ConfigError::StandardDeviation(self.standard_deviation));
            }
        }

        Ok(())
    }
}

/// Split a `key=value` override
pub fn parse_override(raw: &str) -> Result<(String, String), ConfigError> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(ConfigError::InvalidOverride(raw.to_string())),
    }
}

fn override_value(raw: &str) -> Value {
    match serde_yaml::from_str::<Value>(raw) {
        Ok(value @ (Value::Bool(_) | Value::Number(_) | Value::String(_))) => value,
        _ => Value::String(raw.to_string()),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No workers requested
    #[error("threadcount must be at least 1")]
    ZeroThreads,

    /// Every worker needs at least one operation
    #[error(
        "total operation count (operationcount/insertcount/recordcount) {total} must not be smaller than threadcount {thread_count}"
    )]
    TooFewOperations {
        /// Configured total
        total: u64,
        /// Configured worker count
        thread_count: usize,
    },

    /// Batches must hold at least one operation
    #[error("batchsize must be at least 1")]
    ZeroBatchSize,

    /// Noise ratio outside `[0, 1]`
    #[error("noiseratio must be within [0, 1], got {0}")]
    NoiseRatio(f64),

    /// Pacing needs a period of at least one minute
    #[error("timeperiod must be at least 1 minute")]
    ZeroPeriod,

    /// The normal shapes need a positive standard deviation
    #[error("standarddeviation must be positive, got {0}")]
    StandardDeviation(f64),

    /// Snapshots need a non-zero interval
    #[error("measurement.interval must be at least 1 second")]
    ZeroInterval,

    /// Pacing enabled with an unrecognised shape
    #[error(
        "unknown timedistribution {0:?}, expected one of none, normal, reverse_normal, noise_normal, step, noise_step"
    )]
    UnknownDistribution(String),

    /// Malformed `-p` argument
    #[error("invalid property override {0:?}, expected key=value")]
    InvalidOverride(String),

    /// Config file root is not a mapping
    #[error("config file {0} must contain a mapping of properties")]
    NotAMapping(PathBuf),

    /// Config file could not be read
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Config could not be parsed
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn transactions(threads: usize, ops: u64) -> RunConfig {
        RunConfig {
            thread_count: threads,
            operation_count: Some(ops),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = RunConfig::default();
        assert_eq!(config.thread_count, 1);
        assert_eq!(config.batch_size, 1);
        assert!(config.do_transactions);
        assert!(config.silence);
        assert_eq!(config.time_distribution, "none");
        assert_eq!(config.measurement_interval(), Duration::from_secs(10));
        assert!(config.per_worker_tick().is_none());
    }

    #[test]
    fn test_per_worker_quota_truncates() {
        for threads in 1..=16usize {
            for total in threads as u64..200 {
                let config = transactions(threads, total);
                let quota = config.per_worker_operation_count();
                assert_eq!(quota * threads as u64, threads as u64 * (total / threads as u64));
                assert!(quota * threads as u64 <= total);
            }
        }

        // 10 operations over 3 workers leaves one operation unissued
        assert_eq!(transactions(3, 10).per_worker_operation_count(), 3);
    }

    #[test]
    fn test_too_few_operations_is_fatal() {
        let err = transactions(4, 3).validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::TooFewOperations {
                total: 3,
                thread_count: 4
            }
        ));
        assert!(transactions(4, 4).validate().is_ok());
    }

    #[test]
    fn test_load_run_operation_count_selection() {
        let mut config = RunConfig {
            do_transactions: false,
            operation_count: Some(5),
            record_count: Some(100),
            ..Default::default()
        };
        assert_eq!(config.total_operation_count(), 100);

        config.insert_count = Some(40);
        assert_eq!(config.total_operation_count(), 40);

        config.do_transactions = true;
        assert_eq!(config.total_operation_count(), 5);
    }

    #[test]
    fn test_per_worker_tick() {
        // 4000 ops/s over 4 workers is 1 op/ms per worker
        let config = RunConfig {
            thread_count: 4,
            target: Some(4000),
            ..Default::default()
        };
        assert_eq!(config.per_worker_ops_per_ms(), Some(1.0));
        assert_eq!(config.per_worker_tick(), Some(Duration::from_millis(1)));

        let config = RunConfig {
            thread_count: 2,
            target: Some(10),
            ..Default::default()
        };
        assert_eq!(config.per_worker_tick(), Some(Duration::from_millis(200)));

        let config = RunConfig {
            target: Some(0),
            ..Default::default()
        };
        assert!(config.per_worker_tick().is_none());
    }

    #[test]
    fn test_warm_up_only_for_transactions() {
        let mut config = RunConfig {
            warm_up_time: 30,
            ..Default::default()
        };
        assert_eq!(config.warm_up(), Duration::from_secs(30));
        config.do_transactions = false;
        assert_eq!(config.warm_up(), Duration::ZERO);
    }

    #[test]
    fn test_unknown_distribution_rejected_when_pacing() {
        let mut config = transactions(1, 10);
        config.time_distribution = "bogus".to_string();
        assert!(config.validate().is_ok());

        config.normaldatain_time = true;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownDistribution(name)) if name == "bogus"
        ));

        config.time_distribution = "noise_step".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_noise_ratio() {
        let mut config = transactions(1, 10);
        config.noise_ratio = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::NoiseRatio(_))));
    }

    #[test]
    fn test_pacing_requires_period() {
        let mut config = transactions(1, 10);
        config.normaldatain_time = true;
        config.time_distribution = "step".to_string();
        config.time_period = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroPeriod)));
    }

    #[test]
    fn test_parse_override() {
        assert_eq!(
            parse_override("threadcount=8").unwrap(),
            ("threadcount".to_string(), "8".to_string())
        );
        assert_eq!(
            parse_override(" tablename = orders ").unwrap(),
            ("tablename".to_string(), "orders".to_string())
        );
        assert!(parse_override("novalue").is_err());
        assert!(parse_override("=5").is_err());
    }

    #[test]
    fn test_load_file_and_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "threadcount: 4\noperationcount: 1000\nmeasurement.interval: 2\nreadproportion: 0.95\ntimedistribution: step"
        )
        .unwrap();

        let overrides = vec![
            ("threadcount".to_string(), "8".to_string()),
            ("silence".to_string(), "false".to_string()),
            ("tablename".to_string(), "orders".to_string()),
        ];
        let config = RunConfig::load(Some(file.path()), &overrides).unwrap();

        assert_eq!(config.thread_count, 8);
        assert_eq!(config.operation_count, Some(1000));
        assert_eq!(config.measurement_interval, 2);
        assert_eq!(config.time_distribution, "step");
        assert!(!config.silence);
        assert_eq!(config.table_name, "orders");
        assert_eq!(config.extra_f64("readproportion"), Some(0.95));
    }

    #[test]
    fn test_load_without_file() {
        let overrides = vec![("recordcount".to_string(), "50".to_string())];
        let config = RunConfig::load(None, &overrides).unwrap();
        assert_eq!(config.record_count, Some(50));
        assert_eq!(config.thread_count, 1);
    }

    #[test]
    fn test_load_missing_file() {
        let err = RunConfig::load(Some(Path::new("/nonexistent/loadpace.yaml")), &[]).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
