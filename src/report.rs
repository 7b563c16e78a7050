//! Snapshot summaries
//!
//! Stateless entry point shared by the CLI and FFI: summarise an exported
//! [`PlatformSnapshot`] for the day containing a given instant.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::aggregator::DailyMetricsAggregator;
use crate::config::AggregatorConfig;
use crate::error::FetchError;
use crate::memory::{InMemoryPlatform, PlatformSnapshot};
use crate::types::{DailySummary, FetchOutcome, MetricType, TimeRange};

/// Outcome of summarising a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SummaryReport {
    Summary {
        date: String,
        range: TimeRange,
        summary: DailySummary,
        /// Tracked metrics without a read grant
        missing_permissions: Vec<MetricType>,
    },
    PermissionRequired,
}

/// Summarise `snapshot` for the local day containing `now`.
pub async fn summarize_snapshot(
    snapshot: PlatformSnapshot,
    config: AggregatorConfig,
    now: DateTime<FixedOffset>,
) -> Result<SummaryReport, FetchError> {
    let platform = Arc::new(InMemoryPlatform::new(snapshot));
    let aggregator = DailyMetricsAggregator::with_config(platform.handle(), config)?;

    match aggregator.fetch_daily_summary_at(now).await? {
        FetchOutcome::PermissionRequired => Ok(SummaryReport::PermissionRequired),
        FetchOutcome::Summary(summary) => Ok(SummaryReport::Summary {
            date: now.format("%Y-%m-%d").to_string(),
            range: crate::range::start_of_day_until(&now)?,
            summary,
            missing_permissions: aggregator.missing_permissions().await?,
        }),
    }
}
