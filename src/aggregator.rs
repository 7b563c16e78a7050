//! Daily metrics aggregation
//!
//! Orchestrates one fetch: read the granted permissions, query every tracked
//! metric that has a read grant over `[local midnight, now)`, reduce each
//! result, and assemble a [`DailySummary`].
//!
//! A fetch is all-or-nothing. If any query fails the whole fetch fails and no
//! summary is produced, even when other queries already returned.

use chrono::{DateTime, Local, TimeZone};
use futures_util::future::try_join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{AggregatorConfig, QueryMode};
use crate::error::{ConfigError, FetchError};
use crate::platform::PlatformHandle;
use crate::range::start_of_day_until;
use crate::reducer::MetricReducer;
use crate::types::{has_read_grant, DailySummary, FetchOutcome, MetricType, MetricValue, TimeRange};

/// Aggregates a platform's records into daily summaries
#[derive(Debug, Clone)]
pub struct DailyMetricsAggregator {
    platform: PlatformHandle,
    config: AggregatorConfig,
}

impl DailyMetricsAggregator {
    /// Create an aggregator tracking every metric
    pub fn new(platform: PlatformHandle) -> Self {
        Self {
            platform,
            config: AggregatorConfig::default(),
        }
    }

    /// Create an aggregator with a custom configuration.
    ///
    /// Rejects an empty or duplicated tracked set, so every granted metric is
    /// queried exactly once.
    pub fn with_config(
        platform: PlatformHandle,
        config: AggregatorConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { platform, config })
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn platform(&self) -> &PlatformHandle {
        &self.platform
    }

    /// Fetch today's summary using the local wall clock.
    ///
    /// Returns [`FetchOutcome::PermissionRequired`] without querying anything
    /// when no permission at all has been granted.
    pub async fn fetch_daily_summary(&self) -> Result<FetchOutcome, FetchError> {
        self.fetch_daily_summary_at(Local::now()).await
    }

    /// Fetch the summary for the local day containing `now`, up to `now`.
    pub async fn fetch_daily_summary_at<Tz: TimeZone>(
        &self,
        now: DateTime<Tz>,
    ) -> Result<FetchOutcome, FetchError> {
        let range = start_of_day_until(&now);
        let fetch = self.fetch_range(range);

        match self.config.timeout_duration() {
            Some(limit) => tokio::time::timeout(limit, fetch).await.map_err(|_| {
                warn!(timeout_ms = limit.as_millis() as u64, "daily summary fetch timed out");
                FetchError::TimedOut(limit.as_millis() as u64)
            })?,
            None => fetch.await,
        }
    }

    /// Tracked metrics that lack a read grant
    pub async fn missing_permissions(&self) -> Result<Vec<MetricType>, FetchError> {
        let grants = self
            .platform
            .permissions()
            .granted_permissions()
            .await
            .map_err(FetchError::PermissionOracleFailed)?;

        Ok(self
            .config
            .tracked_metrics
            .iter()
            .copied()
            .filter(|m| !has_read_grant(&grants, *m))
            .collect())
    }

    async fn fetch_range(
        &self,
        range: Result<TimeRange, FetchError>,
    ) -> Result<FetchOutcome, FetchError> {
        let fetch_id = Uuid::new_v4();

        let grants = self
            .platform
            .permissions()
            .granted_permissions()
            .await
            .map_err(FetchError::PermissionOracleFailed)?;

        if grants.is_empty() {
            info!(%fetch_id, "no health permissions granted");
            return Ok(FetchOutcome::PermissionRequired);
        }

        let range = range?;

        let (granted, skipped): (Vec<MetricType>, Vec<MetricType>) = self
            .config
            .tracked_metrics
            .iter()
            .copied()
            .partition(|m| has_read_grant(&grants, *m));

        if !skipped.is_empty() {
            debug!(%fetch_id, ?skipped, "skipping metrics without read permission");
        }

        let values = match self.config.query_mode {
            QueryMode::Concurrent => {
                try_join_all(granted.iter().map(|m| self.query_metric(*m, range))).await?
            }
            QueryMode::Sequential => {
                let mut values = Vec::with_capacity(granted.len());
                for metric in &granted {
                    values.push(self.query_metric(*metric, range).await?);
                }
                values
            }
        };

        let mut summary = DailySummary::default();
        for value in values.into_iter().flatten() {
            summary.set(value);
        }

        info!(
            %fetch_id,
            queried = granted.len(),
            present = summary.present_metrics().len(),
            "daily summary fetched"
        );
        Ok(FetchOutcome::Summary(summary))
    }

    async fn query_metric(
        &self,
        metric: MetricType,
        range: TimeRange,
    ) -> Result<Option<MetricValue>, FetchError> {
        let records = self
            .platform
            .records()
            .read_records(metric, range)
            .await
            .map_err(|source| {
                warn!(%metric, error = %source, "health record query failed");
                FetchError::QueryFailed { metric, source }
            })?;

        let stray = records.iter().filter(|r| !r.matches(metric)).count();
        if stray > 0 {
            warn!(%metric, stray, "ignoring records of another kind");
        }

        let value = MetricReducer::reduce(metric, &records, self.config.heart_rate_mode);
        debug!(%metric, records = records.len(), ?value, "reduced metric");
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeartRateMode;
    use crate::error::SourceError;
    use crate::memory::InMemoryPlatform;
    use crate::platform::{HealthRecordSource, NoopLauncher, PermissionOracle};
    use crate::types::{HeartRateSample, PermissionGrant, RawRecord};
    use async_trait::async_trait;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 18, 0, 0).unwrap()
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, h, m, 0).unwrap()
    }

    fn all_read_grants() -> Vec<PermissionGrant> {
        MetricType::ALL.into_iter().map(PermissionGrant::read).collect()
    }

    fn populated_platform() -> Arc<InMemoryPlatform> {
        let platform = Arc::new(InMemoryPlatform::default());
        platform.set_grants(all_read_grants());

        for count in [120, 380, 500] {
            platform.add_record(
                MetricType::Steps,
                RawRecord::Steps {
                    count,
                    start_time: at(9, 0),
                    end_time: at(9, 30),
                },
            );
        }
        for bpm in [60, 80] {
            platform.add_record(
                MetricType::HeartRate,
                RawRecord::HeartRate {
                    samples: vec![HeartRateSample {
                        time: at(10, 0),
                        beats_per_minute: bpm,
                    }],
                    start_time: at(10, 0),
                    end_time: at(10, 1),
                },
            );
        }
        for kcal in [150.2, 99.9] {
            platform.add_record(
                MetricType::ActiveCalories,
                RawRecord::Energy {
                    kilocalories: kcal,
                    start_time: at(11, 0),
                    end_time: at(12, 0),
                },
            );
        }
        platform.add_record(
            MetricType::Sleep,
            RawRecord::SleepSession {
                start_time: Utc.with_ymd_and_hms(2024, 3, 9, 23, 0, 0).unwrap(),
                end_time: at(6, 30),
            },
        );

        platform
    }

    #[tokio::test]
    async fn test_full_summary() {
        let platform = populated_platform();
        let aggregator = DailyMetricsAggregator::new(platform.handle());

        let outcome = aggregator.fetch_daily_summary_at(now()).await.unwrap();

        assert_eq!(
            outcome,
            FetchOutcome::Summary(DailySummary {
                steps: Some(1000),
                heart_rate_bpm: Some(70),
                active_calories_kcal: Some(250),
                total_calories_kcal: None,
                sleep_hours: Some(7.5),
            })
        );
        assert_eq!(platform.queries().len(), 5);
    }

    #[tokio::test]
    async fn test_no_grants_requires_permission_without_queries() {
        let platform = populated_platform();
        platform.set_grants(Vec::new());
        let aggregator = DailyMetricsAggregator::new(platform.handle());

        let outcome = aggregator.fetch_daily_summary_at(now()).await.unwrap();

        assert_eq!(outcome, FetchOutcome::PermissionRequired);
        assert!(platform.queries().is_empty());
    }

    #[tokio::test]
    async fn test_ungranted_metrics_not_queried() {
        let platform = populated_platform();
        platform.set_grants(vec![
            PermissionGrant::read(MetricType::Steps),
            PermissionGrant::write(MetricType::HeartRate),
        ]);
        let aggregator = DailyMetricsAggregator::new(platform.handle());

        let outcome = aggregator.fetch_daily_summary_at(now()).await.unwrap();
        let summary = outcome.summary().unwrap();

        assert_eq!(summary.steps, Some(1000));
        assert_eq!(summary.heart_rate_bpm, None);
        assert_eq!(summary.sleep_hours, None);
        assert_eq!(platform.queries(), vec![MetricType::Steps]);
    }

    #[tokio::test]
    async fn test_untracked_metrics_not_queried() {
        let platform = populated_platform();
        let config = AggregatorConfig::with_metrics([MetricType::HeartRate, MetricType::Sleep])
            .heart_rate_mode(HeartRateMode::Latest);
        let aggregator = DailyMetricsAggregator::with_config(platform.handle(), config).unwrap();

        let outcome = aggregator.fetch_daily_summary_at(now()).await.unwrap();
        let summary = outcome.summary().unwrap();

        assert_eq!(summary.heart_rate_bpm, Some(80));
        assert_eq!(summary.sleep_hours, Some(7.5));
        assert_eq!(summary.steps, None);
        assert_eq!(
            platform.queries(),
            vec![MetricType::HeartRate, MetricType::Sleep]
        );
    }

    #[tokio::test]
    async fn test_failure_discards_partial_results() {
        for mode in [QueryMode::Concurrent, QueryMode::Sequential] {
            let platform = populated_platform();
            platform.fail_metric(MetricType::Sleep, "provider crashed");
            let aggregator = DailyMetricsAggregator::with_config(
                platform.handle(),
                AggregatorConfig::default().query_mode(mode),
            )
            .unwrap();

            let err = aggregator.fetch_daily_summary_at(now()).await.unwrap_err();

            assert_eq!(
                err,
                FetchError::QueryFailed {
                    metric: MetricType::Sleep,
                    source: SourceError::Rejected("provider crashed".to_string()),
                }
            );
            assert_eq!(err.message(), "Platform rejected the request: provider crashed");
        }
    }

    #[tokio::test]
    async fn test_repeated_fetch_is_stable() {
        let platform = populated_platform();
        let aggregator = DailyMetricsAggregator::new(platform.handle());

        let first = aggregator.fetch_daily_summary().await.unwrap();
        let second = aggregator.fetch_daily_summary().await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_missing_permissions() {
        let platform = populated_platform();
        platform.set_grants(vec![PermissionGrant::read(MetricType::Steps)]);
        let aggregator = DailyMetricsAggregator::with_config(
            platform.handle(),
            AggregatorConfig::with_metrics([MetricType::Steps, MetricType::HeartRate]),
        )
        .unwrap();

        assert_eq!(
            aggregator.missing_permissions().await.unwrap(),
            vec![MetricType::HeartRate]
        );
    }

    #[test]
    fn test_invalid_tracked_set_rejected() {
        let platform = populated_platform();

        let duplicated = DailyMetricsAggregator::with_config(
            platform.handle(),
            AggregatorConfig::with_metrics([MetricType::Steps, MetricType::Steps]),
        );
        assert!(matches!(
            duplicated,
            Err(ConfigError::DuplicateMetric(MetricType::Steps))
        ));

        let empty = DailyMetricsAggregator::with_config(
            platform.handle(),
            AggregatorConfig::with_metrics(Vec::new()),
        );
        assert!(matches!(empty, Err(ConfigError::NoTrackedMetrics)));
        assert!(platform.queries().is_empty());
    }

    struct StalledSource;

    #[async_trait]
    impl PermissionOracle for StalledSource {
        async fn granted_permissions(&self) -> Result<Vec<PermissionGrant>, SourceError> {
            Ok(vec![PermissionGrant::read(MetricType::Steps)])
        }
    }

    #[async_trait]
    impl HealthRecordSource for StalledSource {
        async fn read_records(
            &self,
            _metric: MetricType,
            _range: TimeRange,
        ) -> Result<Vec<RawRecord>, SourceError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_aborts_fetch() {
        let source = Arc::new(StalledSource);
        let handle = PlatformHandle::from_parts(source.clone(), source, Arc::new(NoopLauncher));
        let aggregator = DailyMetricsAggregator::with_config(
            handle,
            AggregatorConfig::default().timeout(Duration::from_secs(5)),
        )
        .unwrap();

        let err = aggregator.fetch_daily_summary_at(now()).await.unwrap_err();
        assert_eq!(err, FetchError::TimedOut(5000));
    }
}
