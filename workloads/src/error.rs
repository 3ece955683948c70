//! Workload construction errors

/// Errors raised while building a workload from its properties
#[derive(Debug, thiserror::Error)]
pub enum WorkloadError {
    /// No workload answers to this name
    #[error("unknown workload: {0:?}")]
    UnknownWorkload(String),

    /// `requestdistribution` names no known key distribution
    #[error("unknown requestdistribution {0:?}, expected one of uniform, zipfian, latest")]
    UnknownDistribution(String),

    /// A property has an unusable value
    #[error("invalid value {value:?} for property {name}")]
    InvalidProperty {
        /// Property name
        name: &'static str,
        /// Offending value
        value: String,
    },

    /// Every transaction proportion is zero
    #[error("at least one transaction proportion must be positive")]
    NoOperations,
}
