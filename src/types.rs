//! Core types for daily metric aggregation
//!
//! This module defines the data that flows between the health platform and the
//! aggregator: metric types, permission grants, time ranges, raw provider
//! records, and the resulting daily summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category of health data tracked by the aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MetricType {
    Steps,
    HeartRate,
    #[serde(rename = "ActiveCaloriesBurned")]
    ActiveCalories,
    #[serde(rename = "TotalCaloriesBurned")]
    TotalCalories,
    #[serde(rename = "SleepSession")]
    Sleep,
}

impl MetricType {
    /// Every metric type, in display order
    pub const ALL: [MetricType; 5] = [
        MetricType::Steps,
        MetricType::HeartRate,
        MetricType::ActiveCalories,
        MetricType::TotalCalories,
        MetricType::Sleep,
    ];

    /// Record type name used by the health provider
    pub fn record_name(&self) -> &'static str {
        match self {
            MetricType::Steps => "Steps",
            MetricType::HeartRate => "HeartRate",
            MetricType::ActiveCalories => "ActiveCaloriesBurned",
            MetricType::TotalCalories => "TotalCaloriesBurned",
            MetricType::Sleep => "SleepSession",
        }
    }

    /// Display unit of the summarised value
    pub fn unit(&self) -> &'static str {
        match self {
            MetricType::Steps => "steps",
            MetricType::HeartRate => "bpm",
            MetricType::ActiveCalories | MetricType::TotalCalories => "kcal",
            MetricType::Sleep => "h",
        }
    }
}

impl std::fmt::Display for MetricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.record_name())
    }
}

/// Access mode of a permission grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    Read,
    Write,
}

/// A permission reported by the platform's permission oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionGrant {
    #[serde(rename = "record_type")]
    pub metric: MetricType,
    #[serde(rename = "access_type")]
    pub access: AccessMode,
}

impl PermissionGrant {
    pub fn read(metric: MetricType) -> Self {
        Self {
            metric,
            access: AccessMode::Read,
        }
    }

    pub fn write(metric: MetricType) -> Self {
        Self {
            metric,
            access: AccessMode::Write,
        }
    }
}

/// Returns true when `grants` contains a read grant for exactly `metric`.
pub fn has_read_grant(grants: &[PermissionGrant], metric: MetricType) -> bool {
    grants.contains(&PermissionGrant::read(metric))
}

/// Half-open interval `[start, end)` of absolute instants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// One beats-per-minute reading inside a heart rate record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartRateSample {
    pub time: DateTime<Utc>,
    pub beats_per_minute: u32,
}

/// A record produced by the health provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawRecord {
    Steps {
        count: u64,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    },
    HeartRate {
        samples: Vec<HeartRateSample>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    },
    /// Energy expenditure; active or total depending on the queried metric
    Energy {
        kilocalories: f64,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    },
    SleepSession {
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    },
}

impl RawRecord {
    pub fn start_time(&self) -> DateTime<Utc> {
        match self {
            RawRecord::Steps { start_time, .. }
            | RawRecord::HeartRate { start_time, .. }
            | RawRecord::Energy { start_time, .. }
            | RawRecord::SleepSession { start_time, .. } => *start_time,
        }
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        match self {
            RawRecord::Steps { end_time, .. }
            | RawRecord::HeartRate { end_time, .. }
            | RawRecord::Energy { end_time, .. }
            | RawRecord::SleepSession { end_time, .. } => *end_time,
        }
    }

    /// Whether this record kind can answer a query for `metric`
    pub fn matches(&self, metric: MetricType) -> bool {
        matches!(
            (self, metric),
            (RawRecord::Steps { .. }, MetricType::Steps)
                | (RawRecord::HeartRate { .. }, MetricType::HeartRate)
                | (RawRecord::Energy { .. }, MetricType::ActiveCalories)
                | (RawRecord::Energy { .. }, MetricType::TotalCalories)
                | (RawRecord::SleepSession { .. }, MetricType::Sleep)
        )
    }
}

/// Aggregated values for one calendar day
///
/// A field is `None` when the metric was not tracked, its read permission was
/// not granted, or the provider had no usable records for it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    /// Total step count
    pub steps: Option<u64>,
    /// Rounded heart rate (bpm)
    pub heart_rate_bpm: Option<u32>,
    /// Rounded active energy (kcal)
    pub active_calories_kcal: Option<u64>,
    /// Rounded total energy (kcal)
    pub total_calories_kcal: Option<u64>,
    /// Total sleep (hours, one decimal, strictly positive)
    pub sleep_hours: Option<f64>,
}

impl DailySummary {
    /// Value for `metric` as a plain number
    pub fn get(&self, metric: MetricType) -> Option<f64> {
        match metric {
            MetricType::Steps => self.steps.map(|v| v as f64),
            MetricType::HeartRate => self.heart_rate_bpm.map(f64::from),
            MetricType::ActiveCalories => self.active_calories_kcal.map(|v| v as f64),
            MetricType::TotalCalories => self.total_calories_kcal.map(|v| v as f64),
            MetricType::Sleep => self.sleep_hours,
        }
    }

    pub(crate) fn set(&mut self, value: MetricValue) {
        match value {
            MetricValue::Steps(v) => self.steps = Some(v),
            MetricValue::HeartRate(v) => self.heart_rate_bpm = Some(v),
            MetricValue::ActiveCalories(v) => self.active_calories_kcal = Some(v),
            MetricValue::TotalCalories(v) => self.total_calories_kcal = Some(v),
            MetricValue::SleepHours(v) => self.sleep_hours = Some(v),
        }
    }

    /// Metrics that carry a value
    pub fn present_metrics(&self) -> Vec<MetricType> {
        MetricType::ALL
            .into_iter()
            .filter(|m| self.get(*m).is_some())
            .collect()
    }
}

/// A reduced value for a single metric
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Steps(u64),
    HeartRate(u32),
    ActiveCalories(u64),
    TotalCalories(u64),
    SleepHours(f64),
}

impl MetricValue {
    pub fn metric(&self) -> MetricType {
        match self {
            MetricValue::Steps(_) => MetricType::Steps,
            MetricValue::HeartRate(_) => MetricType::HeartRate,
            MetricValue::ActiveCalories(_) => MetricType::ActiveCalories,
            MetricValue::TotalCalories(_) => MetricType::TotalCalories,
            MetricValue::SleepHours(_) => MetricType::Sleep,
        }
    }
}

/// Result of a fetch that did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// All granted, tracked metrics were queried and reduced
    Summary(DailySummary),
    /// No grants at all; the user must grant access in the provider app
    PermissionRequired,
}

impl FetchOutcome {
    pub fn summary(&self) -> Option<&DailySummary> {
        match self {
            FetchOutcome::Summary(summary) => Some(summary),
            FetchOutcome::PermissionRequired => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, h, m, 0).unwrap()
    }

    #[test]
    fn test_grant_membership_is_exact() {
        let grants = vec![
            PermissionGrant::read(MetricType::TotalCalories),
            PermissionGrant::write(MetricType::Steps),
        ];

        assert!(has_read_grant(&grants, MetricType::TotalCalories));
        assert!(!has_read_grant(&grants, MetricType::ActiveCalories));
        assert!(!has_read_grant(&grants, MetricType::Steps));
    }

    #[test]
    fn test_grant_serde_uses_provider_names() {
        let json = r#"{"record_type":"ActiveCaloriesBurned","access_type":"read"}"#;
        let grant: PermissionGrant = serde_json::from_str(json).unwrap();
        assert_eq!(grant, PermissionGrant::read(MetricType::ActiveCalories));
        assert_eq!(serde_json::to_string(&grant).unwrap(), json);
    }

    #[test]
    fn test_time_range_is_half_open() {
        let range = TimeRange::new(at(0, 0), at(12, 0));
        assert!(range.contains(at(0, 0)));
        assert!(range.contains(at(11, 59)));
        assert!(!range.contains(at(12, 0)));
        assert!(!range.is_empty());
        assert!(TimeRange::new(at(12, 0), at(12, 0)).is_empty());
    }

    #[test]
    fn test_record_matches_metric() {
        let energy = RawRecord::Energy {
            kilocalories: 10.0,
            start_time: at(1, 0),
            end_time: at(2, 0),
        };
        assert!(energy.matches(MetricType::ActiveCalories));
        assert!(energy.matches(MetricType::TotalCalories));
        assert!(!energy.matches(MetricType::Steps));
        assert_eq!(energy.start_time(), at(1, 0));
    }

    #[test]
    fn test_raw_record_json_shape() {
        let json = r#"{"kind":"steps","count":120,"start_time":"2024-03-10T08:00:00Z","end_time":"2024-03-10T08:30:00Z"}"#;
        let record: RawRecord = serde_json::from_str(json).unwrap();
        assert!(matches!(record, RawRecord::Steps { count: 120, .. }));

        let json = r#"{"kind":"heart_rate","samples":[{"time":"2024-03-10T08:00:00Z","beats_per_minute":64}],"start_time":"2024-03-10T08:00:00Z","end_time":"2024-03-10T08:01:00Z"}"#;
        let record: RawRecord = serde_json::from_str(json).unwrap();
        assert_eq!(serde_json::to_string(&record).unwrap(), json);
    }

    #[test]
    fn test_summary_accessors() {
        let mut summary = DailySummary::default();
        summary.set(MetricValue::Steps(1000));
        summary.set(MetricValue::SleepHours(7.5));

        assert_eq!(summary.get(MetricType::Steps), Some(1000.0));
        assert_eq!(summary.get(MetricType::Sleep), Some(7.5));
        assert_eq!(summary.get(MetricType::HeartRate), None);
        assert_eq!(
            summary.present_metrics(),
            vec![MetricType::Steps, MetricType::Sleep]
        );
    }
}
