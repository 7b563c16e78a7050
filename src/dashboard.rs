//! Host-side dashboard state
//!
//! Wraps the aggregator for a screen that refreshes on a button press or when
//! the app returns to the foreground. Only one fetch runs at a time; a refresh
//! requested while another is in flight is reported as [`RefreshOutcome::Busy`]
//! and issues no queries.
//!
//! When the aggregator is configured with a timeout, `refresh` must be polled
//! on a tokio runtime with the time driver enabled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::aggregator::DailyMetricsAggregator;
use crate::error::FetchError;
use crate::types::{DailySummary, FetchOutcome};

/// What the screen currently shows
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardState {
    /// Last successfully fetched summary
    pub summary: Option<DailySummary>,
    pub last_refreshed: Option<DateTime<Utc>>,
    pub permission_required: bool,
    pub last_error: Option<String>,
}

/// Result of one refresh request
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Updated(DailySummary),
    PermissionRequired,
    Failed(FetchError),
    /// Another refresh was already running
    Busy,
}

/// Action the screen should offer after a refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remediation {
    /// Send the user to the provider app to grant access
    OpenProviderApp,
    Retry,
    Nothing,
}

impl RefreshOutcome {
    pub fn remediation(&self) -> Remediation {
        match self {
            RefreshOutcome::PermissionRequired => Remediation::OpenProviderApp,
            RefreshOutcome::Failed(_) => Remediation::Retry,
            RefreshOutcome::Updated(_) | RefreshOutcome::Busy => Remediation::Nothing,
        }
    }
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Single-flight controller around [`DailyMetricsAggregator`]
pub struct DashboardController {
    aggregator: DailyMetricsAggregator,
    in_flight: AtomicBool,
    state: RwLock<DashboardState>,
}

impl DashboardController {
    pub fn new(aggregator: DailyMetricsAggregator) -> Self {
        Self {
            aggregator,
            in_flight: AtomicBool::new(false),
            state: RwLock::new(DashboardState::default()),
        }
    }

    pub fn aggregator(&self) -> &DailyMetricsAggregator {
        &self.aggregator
    }

    pub fn state(&self) -> DashboardState {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Fetch and publish today's summary.
    ///
    /// A failed fetch keeps the previously published summary. The state never
    /// reports a permission prompt and an error at the same time; whichever
    /// the latest fetch produced replaces the other.
    pub async fn refresh(&self) -> RefreshOutcome {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            debug!("refresh skipped, fetch already in flight");
            return RefreshOutcome::Busy;
        }
        let _guard = InFlight(&self.in_flight);

        let result = self.aggregator.fetch_daily_summary().await;

        let mut state = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match result {
            Ok(FetchOutcome::Summary(summary)) => {
                state.summary = Some(summary.clone());
                state.last_refreshed = Some(Utc::now());
                state.permission_required = false;
                state.last_error = None;
                RefreshOutcome::Updated(summary)
            }
            Ok(FetchOutcome::PermissionRequired) => {
                state.permission_required = true;
                state.last_error = None;
                RefreshOutcome::PermissionRequired
            }
            Err(err) => {
                warn!(error = %err, "dashboard refresh failed");
                state.permission_required = false;
                state.last_error = Some(err.message());
                RefreshOutcome::Failed(err)
            }
        }
    }

    /// Refresh after the app returns to the foreground, e.g. from the
    /// provider's permission screen.
    pub async fn on_foreground(&self) -> RefreshOutcome {
        self.refresh().await
    }

    /// Carry out the remediation for `outcome` and return it
    pub fn remediate(&self, outcome: &RefreshOutcome) -> Remediation {
        let remediation = outcome.remediation();
        if remediation == Remediation::OpenProviderApp {
            self.aggregator.platform().open_provider_app();
        }
        remediation
    }
}
