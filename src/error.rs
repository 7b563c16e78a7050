//! Error types for daily metric aggregation

use thiserror::Error;

use crate::types::MetricType;

/// Failure reported by the health platform for a single query
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("Platform rejected the request: {0}")]
    Rejected(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Platform unreachable: {0}")]
    Unreachable(String),
}

/// Errors raised while bringing up the health platform
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitError {
    #[error("Health platform is not available on this device")]
    Unavailable,

    #[error("Health provider app must be updated")]
    UpdateRequired,

    #[error("Health platform initialization failed: {0}")]
    Failed(String),
}

/// Errors that abort a daily summary fetch
///
/// A fetch either publishes a complete summary or fails with one of these;
/// values from queries that already succeeded are discarded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Query for {metric} failed: {source}")]
    QueryFailed {
        metric: MetricType,
        #[source]
        source: SourceError,
    },

    #[error("Failed to read granted permissions: {0}")]
    PermissionOracleFailed(#[source] SourceError),

    #[error("Fetch timed out after {0} ms")]
    TimedOut(u64),

    #[error("Invalid time range: {0}")]
    InvalidTimeRange(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<ConfigError> for FetchError {
    fn from(e: ConfigError) -> Self {
        FetchError::InvalidConfig(e.to_string())
    }
}

impl FetchError {
    /// Underlying platform message, if any
    pub fn message(&self) -> String {
        match self {
            FetchError::QueryFailed { source, .. } | FetchError::PermissionOracleFailed(source) => {
                source.to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Invalid aggregator configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("No metrics are tracked")]
    NoTrackedMetrics,

    #[error("Metric tracked more than once: {0}")]
    DuplicateMetric(MetricType),

    #[error("Timeout must be greater than zero")]
    ZeroTimeout,
}
