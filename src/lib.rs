//! Daily Metrics - daily health summaries over a platform health-data provider
//!
//! Reads step count, heart rate, calorie, and sleep records through an external
//! health platform and reduces them into one value per metric for the current
//! day: permission check → day range → per-metric query → reduction → summary.
//!
//! ## Modules
//!
//! - **Aggregator**: all-or-nothing daily summary fetch over a [`PlatformHandle`]
//! - **Platform**: collaborator traits (permissions, records, initializer, launcher)
//! - **Dashboard**: single-flight refresh state for a host screen
//! - **Memory / Report**: snapshot-backed platform for CLI, FFI, and tests

pub mod aggregator;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod memory;
pub mod platform;
pub mod range;
pub mod reducer;
pub mod report;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use aggregator::DailyMetricsAggregator;
pub use config::{AggregatorConfig, HeartRateMode, QueryMode};
pub use dashboard::{DashboardController, RefreshOutcome, Remediation};
pub use error::{ConfigError, FetchError, InitError, SourceError};
pub use memory::{InMemoryPlatform, PlatformSnapshot};
pub use platform::{
    HealthRecordSource, NoopLauncher, PermissionOracle, PlatformHandle, PlatformInitializer,
    ProviderLauncher, SdkStatus,
};
pub use report::{summarize_snapshot, SummaryReport};
pub use types::{DailySummary, FetchOutcome, MetricType, PermissionGrant, RawRecord, TimeRange};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI and FFI
pub const PRODUCER_NAME: &str = "daily-metrics";
