//! End-to-end checks of the daily summary contract through the public API.

use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use daily_metrics::types::HeartRateSample;
use daily_metrics::{
    AggregatorConfig, DailyMetricsAggregator, DailySummary, DashboardController, FetchError,
    FetchOutcome, InMemoryPlatform, InitError, MetricType, PermissionGrant, PlatformHandle,
    PlatformSnapshot, QueryMode, RawRecord, RefreshOutcome, Remediation, SdkStatus, SourceError,
};
use pretty_assertions::assert_eq;

fn tz() -> FixedOffset {
    FixedOffset::east_opt(5 * 3600 + 1800).unwrap()
}

/// 2024-06-01 21:00 at +05:30
fn evening() -> DateTime<FixedOffset> {
    tz().with_ymd_and_hms(2024, 6, 1, 21, 0, 0).unwrap()
}

fn local(d: u32, h: u32, m: u32) -> DateTime<Utc> {
    tz().with_ymd_and_hms(2024, 6, d, h, m, 0)
        .unwrap()
        .with_timezone(&Utc)
}

fn day_platform() -> Arc<InMemoryPlatform> {
    let platform = Arc::new(InMemoryPlatform::default());
    platform.set_grants(MetricType::ALL.into_iter().map(PermissionGrant::read).collect());

    for (count, hour) in [(120, 8), (380, 12), (500, 18)] {
        platform.add_record(
            MetricType::Steps,
            RawRecord::Steps {
                count,
                start_time: local(1, hour, 0),
                end_time: local(1, hour, 20),
            },
        );
    }
    // Yesterday's steps are outside the day range
    platform.add_record(
        MetricType::Steps,
        RawRecord::Steps {
            count: 9999,
            start_time: local(1, 0, 0) - Duration::hours(4),
            end_time: local(1, 0, 0) - Duration::hours(3),
        },
    );
    for (bpm, hour) in [(60, 9), (80, 15)] {
        platform.add_record(
            MetricType::HeartRate,
            RawRecord::HeartRate {
                samples: vec![
                    HeartRateSample {
                        time: local(1, hour, 0),
                        beats_per_minute: bpm,
                    },
                    HeartRateSample {
                        time: local(1, hour, 1),
                        beats_per_minute: 150,
                    },
                ],
                start_time: local(1, hour, 0),
                end_time: local(1, hour, 2),
            },
        );
    }
    for kcal in [150.2, 99.9] {
        platform.add_record(
            MetricType::TotalCalories,
            RawRecord::Energy {
                kilocalories: kcal,
                start_time: local(1, 10, 0),
                end_time: local(1, 11, 0),
            },
        );
    }
    platform.add_record(
        MetricType::Sleep,
        RawRecord::SleepSession {
            start_time: local(1, 0, 0) - Duration::hours(1),
            end_time: local(1, 6, 30),
        },
    );

    platform
}

#[tokio::test]
async fn summary_combines_every_granted_metric() {
    let platform = day_platform();
    let aggregator = DailyMetricsAggregator::new(platform.handle());

    let outcome = aggregator.fetch_daily_summary_at(evening()).await.unwrap();

    assert_eq!(
        outcome,
        FetchOutcome::Summary(DailySummary {
            steps: Some(1000),
            heart_rate_bpm: Some(70),
            active_calories_kcal: None,
            total_calories_kcal: Some(250),
            sleep_hours: Some(7.5),
        })
    );
}

#[tokio::test]
async fn empty_grants_issue_no_queries() {
    let platform = day_platform();
    platform.set_grants(Vec::new());
    let aggregator = DailyMetricsAggregator::new(platform.handle());

    for mode in [QueryMode::Concurrent, QueryMode::Sequential] {
        let aggregator = DailyMetricsAggregator::with_config(
            aggregator.platform().clone(),
            AggregatorConfig::default().query_mode(mode),
        )
        .unwrap();
        assert_eq!(
            aggregator.fetch_daily_summary_at(evening()).await.unwrap(),
            FetchOutcome::PermissionRequired
        );
    }
    assert!(platform.queries().is_empty());
}

#[tokio::test]
async fn any_failed_query_fails_the_whole_fetch() {
    let platform = day_platform();
    platform.fail_metric(MetricType::Steps, "quota exceeded");
    let aggregator = DailyMetricsAggregator::with_config(
        platform.handle(),
        AggregatorConfig::default().query_mode(QueryMode::Sequential),
    )
    .unwrap();

    let err = aggregator.fetch_daily_summary_at(evening()).await.unwrap_err();

    assert_eq!(
        err,
        FetchError::QueryFailed {
            metric: MetricType::Steps,
            source: SourceError::Rejected("quota exceeded".to_string()),
        }
    );
}

#[tokio::test]
async fn repeated_fetches_are_equal() {
    let platform = day_platform();
    let aggregator = DailyMetricsAggregator::new(platform.handle());

    let first = aggregator.fetch_daily_summary_at(evening()).await.unwrap();
    let second = aggregator.fetch_daily_summary_at(evening()).await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn initialization_gates_the_handle() {
    let platform = Arc::new(InMemoryPlatform::new(PlatformSnapshot {
        sdk_status: SdkStatus::ProviderUpdateRequired,
        ..PlatformSnapshot::default()
    }));

    let result = PlatformHandle::initialize(
        platform.as_ref(),
        platform.clone(),
        platform.clone(),
        platform.clone(),
    )
    .await;

    assert_eq!(result.unwrap_err(), InitError::UpdateRequired);
}

#[tokio::test]
async fn dashboard_routes_missing_permission_to_provider_app() {
    let platform = Arc::new(InMemoryPlatform::default());
    let handle = PlatformHandle::initialize(
        platform.as_ref(),
        platform.clone(),
        platform.clone(),
        platform.clone(),
    )
    .await
    .unwrap();
    let dashboard = DashboardController::new(DailyMetricsAggregator::new(handle));

    let outcome = dashboard.refresh().await;
    assert_eq!(outcome, RefreshOutcome::PermissionRequired);
    assert_eq!(dashboard.remediate(&outcome), Remediation::OpenProviderApp);
    assert_eq!(platform.launch_count(), 1);

    // User grants access in the provider app and comes back
    platform.set_grants(vec![PermissionGrant::read(MetricType::Steps)]);
    let outcome = dashboard.on_foreground().await;
    assert!(matches!(outcome, RefreshOutcome::Updated(_)));
    assert!(!dashboard.state().permission_required);
}
