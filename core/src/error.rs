//! Error types for loadpace-core

use thiserror::Error;

use crate::config::ConfigError;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error, detected before any worker starts
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A required collaborator or setting was not provided to a builder
    #[error("missing required setting: {0}")]
    MissingConfig(&'static str),

    /// Distribution pacing was enabled with a shape name nobody recognises
    #[error("unknown time distribution: {0:?}")]
    UnknownDistribution(String),

    /// The background measurement loop panicked
    #[error("measurement loop failed")]
    MeasurementFailed,

    /// Every worker task of a run panicked
    #[error("all {0} workers failed to complete")]
    WorkersFailed(usize),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
