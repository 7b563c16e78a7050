//! Aggregator configuration
//!
//! A single parameterized configuration replaces per-screen variations in which
//! metrics are tracked and how heart rate is reduced.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::MetricType;

/// How heart rate records are collapsed into one value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeartRateMode {
    /// Rounded mean of each record's first sample
    #[default]
    Mean,
    /// First sample of the most recent record
    Latest,
}

/// How per-metric queries are issued
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// Issue all queries at once and await them together
    #[default]
    Concurrent,
    /// Issue queries one after another in tracked order
    Sequential,
}

/// Configuration for [`crate::aggregator::DailyMetricsAggregator`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Metrics to query, in order
    pub tracked_metrics: Vec<MetricType>,
    pub heart_rate_mode: HeartRateMode,
    pub query_mode: QueryMode,
    /// Optional limit on the whole fetch (milliseconds); see [`Self::timeout`]
    pub timeout_ms: Option<u64>,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            tracked_metrics: MetricType::ALL.to_vec(),
            heart_rate_mode: HeartRateMode::Mean,
            query_mode: QueryMode::Concurrent,
            timeout_ms: None,
        }
    }
}

impl AggregatorConfig {
    /// Track only the given metrics
    pub fn with_metrics(metrics: impl IntoIterator<Item = MetricType>) -> Self {
        Self {
            tracked_metrics: metrics.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn heart_rate_mode(mut self, mode: HeartRateMode) -> Self {
        self.heart_rate_mode = mode;
        self
    }

    pub fn query_mode(mut self, mode: QueryMode) -> Self {
        self.query_mode = mode;
        self
    }

    /// Limit the whole fetch to `timeout`.
    ///
    /// Fetches with a timeout must run inside a tokio runtime with the time
    /// driver enabled (`enable_time`); `tokio::time::timeout` panics otherwise.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Load and validate configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tracked_metrics.is_empty() {
            return Err(ConfigError::NoTrackedMetrics);
        }

        for (i, metric) in self.tracked_metrics.iter().enumerate() {
            if self.tracked_metrics[..i].contains(metric) {
                return Err(ConfigError::DuplicateMetric(*metric));
            }
        }

        if self.timeout_ms == Some(0) {
            return Err(ConfigError::ZeroTimeout);
        }

        Ok(())
    }

    pub fn tracks(&self, metric: MetricType) -> bool {
        self.tracked_metrics.contains(&metric)
    }
}
