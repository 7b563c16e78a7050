//! In-memory health platform
//!
//! Serves grants and records from a [`PlatformSnapshot`] instead of a device
//! SDK. Used by the CLI and FFI surfaces to summarise exported data, and by
//! tests to script grants, records, and query failures.
//!
//! All state sits behind `std::sync` locks; a poisoned lock surfaces as a
//! [`SourceError::Unreachable`] from the query methods.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SourceError;
use crate::platform::{
    HealthRecordSource, PermissionOracle, PlatformHandle, PlatformInitializer, ProviderLauncher,
    SdkStatus,
};
use crate::types::{MetricType, PermissionGrant, RawRecord, TimeRange};

/// Exported state of a health platform
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformSnapshot {
    pub sdk_status: SdkStatus,
    pub grants: Vec<PermissionGrant>,
    pub records: BTreeMap<MetricType, Vec<RawRecord>>,
    /// Metrics whose query fails, with the platform message
    pub failures: BTreeMap<MetricType, String>,
}

/// Problem found while validating a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotIssue {
    pub metric: MetricType,
    pub index: usize,
    pub message: String,
}

impl PlatformSnapshot {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Check that records are filed under a metric they can answer and that
    /// their intervals are well formed.
    pub fn validate(&self) -> Vec<SnapshotIssue> {
        let mut issues = Vec::new();

        for (metric, records) in &self.records {
            for (index, record) in records.iter().enumerate() {
                if !record.matches(*metric) {
                    issues.push(SnapshotIssue {
                        metric: *metric,
                        index,
                        message: format!("record kind does not answer {metric}"),
                    });
                }
                if record.end_time() < record.start_time() {
                    issues.push(SnapshotIssue {
                        metric: *metric,
                        index,
                        message: "record ends before it starts".to_string(),
                    });
                }
                if let RawRecord::Energy { kilocalories, .. } = record {
                    if !kilocalories.is_finite() || *kilocalories < 0.0 {
                        issues.push(SnapshotIssue {
                            metric: *metric,
                            index,
                            message: format!("invalid energy value {kilocalories}"),
                        });
                    }
                }
            }
        }

        issues
    }
}

fn overlaps(record: &RawRecord, range: &TimeRange) -> bool {
    let (start, end) = (record.start_time(), record.end_time());
    if start >= end {
        return range.contains(start);
    }
    start < range.end && end > range.start
}

/// Snapshot-backed implementation of every platform collaborator
#[derive(Debug, Default)]
pub struct InMemoryPlatform {
    snapshot: RwLock<PlatformSnapshot>,
    queries: Mutex<Vec<MetricType>>,
    launches: AtomicUsize,
}

impl InMemoryPlatform {
    pub fn new(snapshot: PlatformSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(snapshot),
            queries: Mutex::new(Vec::new()),
            launches: AtomicUsize::new(0),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(PlatformSnapshot::from_json(json)?))
    }

    /// Handle whose collaborators all point at this platform
    pub fn handle(self: &Arc<Self>) -> PlatformHandle {
        PlatformHandle::from_parts(self.clone(), self.clone(), self.clone())
    }

    pub fn set_grants(&self, grants: Vec<PermissionGrant>) {
        self.write(|s| s.grants = grants);
    }

    pub fn add_record(&self, metric: MetricType, record: RawRecord) {
        self.write(|s| s.records.entry(metric).or_default().push(record));
    }

    /// Make queries for `metric` fail with `message`
    pub fn fail_metric(&self, metric: MetricType, message: impl Into<String>) {
        let message = message.into();
        self.write(|s| {
            s.failures.insert(metric, message);
        });
    }

    pub fn clear_failures(&self) {
        self.write(|s| s.failures.clear());
    }

    /// Metrics queried so far, in call order
    pub fn queries(&self) -> Vec<MetricType> {
        self.queries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn reset_queries(&self) {
        self.queries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    /// Number of times the provider app was opened
    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> PlatformSnapshot {
        self.snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn write(&self, update: impl FnOnce(&mut PlatformSnapshot)) {
        let mut guard = self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        update(&mut guard);
    }
}

#[async_trait]
impl PermissionOracle for InMemoryPlatform {
    async fn granted_permissions(&self) -> Result<Vec<PermissionGrant>, SourceError> {
        let snapshot = self
            .snapshot
            .read()
            .map_err(|_| SourceError::Unreachable("snapshot lock poisoned".to_string()))?;
        Ok(snapshot.grants.clone())
    }
}

#[async_trait]
impl HealthRecordSource for InMemoryPlatform {
    async fn read_records(
        &self,
        metric: MetricType,
        range: TimeRange,
    ) -> Result<Vec<RawRecord>, SourceError> {
        self.queries
            .lock()
            .map_err(|_| SourceError::Unreachable("query log lock poisoned".to_string()))?
            .push(metric);

        let snapshot = self
            .snapshot
            .read()
            .map_err(|_| SourceError::Unreachable("snapshot lock poisoned".to_string()))?;

        if let Some(message) = snapshot.failures.get(&metric) {
            return Err(SourceError::Rejected(message.clone()));
        }

        let records: Vec<RawRecord> = snapshot
            .records
            .get(&metric)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| overlaps(r, &range))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        debug!(%metric, records = records.len(), "served in-memory records");
        Ok(records)
    }
}

#[async_trait]
impl PlatformInitializer for InMemoryPlatform {
    async fn sdk_status(&self) -> Result<SdkStatus, SourceError> {
        Ok(self.snapshot().sdk_status)
    }

    async fn initialize(&self) -> Result<bool, SourceError> {
        Ok(self.snapshot().sdk_status == SdkStatus::Available)
    }
}

impl ProviderLauncher for InMemoryPlatform {
    fn open_provider_app(&self) {
        self.launches.fetch_add(1, Ordering::SeqCst);
    }
}
