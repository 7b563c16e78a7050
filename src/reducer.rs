//! Per-metric reduction
//!
//! Collapses the raw records returned for one metric into a single value:
//! - Steps: sum of counts
//! - Heart rate: rounded mean (or latest) of each record's first sample
//! - Calories: rounded kilocalorie sum
//! - Sleep: total session hours, one decimal
//!
//! No records yields no value. Records of a kind that does not answer the
//! metric are skipped.

use crate::config::HeartRateMode;
use crate::types::{MetricType, MetricValue, RawRecord};

/// Reducer for turning a metric's records into a summary value
pub struct MetricReducer;

impl MetricReducer {
    /// Reduce `records` returned for `metric`
    pub fn reduce(
        metric: MetricType,
        records: &[RawRecord],
        heart_rate_mode: HeartRateMode,
    ) -> Option<MetricValue> {
        match metric {
            MetricType::Steps => sum_steps(records).map(MetricValue::Steps),
            MetricType::HeartRate => {
                reduce_heart_rate(records, heart_rate_mode).map(MetricValue::HeartRate)
            }
            MetricType::ActiveCalories => sum_kilocalories(records).map(MetricValue::ActiveCalories),
            MetricType::TotalCalories => sum_kilocalories(records).map(MetricValue::TotalCalories),
            MetricType::Sleep => total_sleep_hours(records).map(MetricValue::SleepHours),
        }
    }
}

/// Sum of step counts
fn sum_steps(records: &[RawRecord]) -> Option<u64> {
    let counts: Vec<u64> = records
        .iter()
        .filter_map(|r| match r {
            RawRecord::Steps { count, .. } => Some(*count),
            _ => None,
        })
        .collect();

    if counts.is_empty() {
        return None;
    }

    Some(counts.iter().fold(0u64, |acc, c| acc.saturating_add(*c)))
}

/// First-sample bpm of each heart rate record, in record order
fn first_sample_bpms(records: &[RawRecord]) -> Vec<u32> {
    records
        .iter()
        .filter_map(|r| match r {
            RawRecord::HeartRate { samples, .. } => samples.first().map(|s| s.beats_per_minute),
            _ => None,
        })
        .collect()
}

fn reduce_heart_rate(records: &[RawRecord], mode: HeartRateMode) -> Option<u32> {
    let bpms = first_sample_bpms(records);

    match mode {
        HeartRateMode::Mean => {
            if bpms.is_empty() {
                return None;
            }
            let total: f64 = bpms.iter().map(|b| f64::from(*b)).sum();
            Some((total / bpms.len() as f64).round() as u32)
        }
        HeartRateMode::Latest => bpms.last().copied(),
    }
}

/// Rounded sum of kilocalories, floored at zero
fn sum_kilocalories(records: &[RawRecord]) -> Option<u64> {
    let values: Vec<f64> = records
        .iter()
        .filter_map(|r| match r {
            RawRecord::Energy { kilocalories, .. } if kilocalories.is_finite() => Some(*kilocalories),
            _ => None,
        })
        .collect();

    if values.is_empty() {
        return None;
    }

    let total: f64 = values.iter().sum();
    Some(total.max(0.0).round() as u64)
}

/// Total sleep session time in hours, rounded to one decimal
///
/// Sessions with an end before their start count as zero. A total that rounds
/// to zero is reported as no value.
fn total_sleep_hours(records: &[RawRecord]) -> Option<f64> {
    let total_seconds: i64 = records
        .iter()
        .filter_map(|r| match r {
            RawRecord::SleepSession {
                start_time,
                end_time,
            } => Some((*end_time - *start_time).num_seconds().max(0)),
            _ => None,
        })
        .sum();

    let hours = (total_seconds as f64 / 3600.0 * 10.0).round() / 10.0;
    if hours > 0.0 {
        Some(hours)
    } else {
        None
    }
}
