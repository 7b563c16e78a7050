//! Health platform collaborators
//!
//! The aggregator never talks to a concrete health SDK. It reaches the platform
//! through these traits, bundled into an explicit [`PlatformHandle`] that is
//! created once per session after initialization succeeds.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{InitError, SourceError};
use crate::types::{MetricType, PermissionGrant, RawRecord, TimeRange};

/// Reports the permissions currently granted to the app
#[async_trait]
pub trait PermissionOracle: Send + Sync {
    async fn granted_permissions(&self) -> Result<Vec<PermissionGrant>, SourceError>;
}

/// Read-only query interface over the user's health records
#[async_trait]
pub trait HealthRecordSource: Send + Sync {
    /// Records of `metric` within `range`
    async fn read_records(
        &self,
        metric: MetricType,
        range: TimeRange,
    ) -> Result<Vec<RawRecord>, SourceError>;
}

/// Availability of the health platform on this device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SdkStatus {
    #[default]
    Available,
    Unavailable,
    ProviderUpdateRequired,
}

/// Brings the health platform up for this process
#[async_trait]
pub trait PlatformInitializer: Send + Sync {
    async fn sdk_status(&self) -> Result<SdkStatus, SourceError>;

    /// Returns false when the platform declined to initialize
    async fn initialize(&self) -> Result<bool, SourceError>;
}

/// Opens the health provider's app; a no-op when it is not installed
pub trait ProviderLauncher: Send + Sync {
    fn open_provider_app(&self);
}

impl<F> ProviderLauncher for F
where
    F: Fn() + Send + Sync,
{
    fn open_provider_app(&self) {
        self()
    }
}

/// Launcher for hosts without a provider app
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLauncher;

impl ProviderLauncher for NoopLauncher {
    fn open_provider_app(&self) {}
}

/// Handle to an initialized health platform
#[derive(Clone)]
pub struct PlatformHandle {
    permissions: Arc<dyn PermissionOracle>,
    records: Arc<dyn HealthRecordSource>,
    launcher: Arc<dyn ProviderLauncher>,
}

impl PlatformHandle {
    /// Check availability, initialize the platform, and return a handle.
    pub async fn initialize(
        initializer: &dyn PlatformInitializer,
        permissions: Arc<dyn PermissionOracle>,
        records: Arc<dyn HealthRecordSource>,
        launcher: Arc<dyn ProviderLauncher>,
    ) -> Result<Self, InitError> {
        let status = initializer
            .sdk_status()
            .await
            .map_err(|e| InitError::Failed(e.to_string()))?;

        match status {
            SdkStatus::Available => {}
            SdkStatus::Unavailable => {
                warn!("health platform unavailable");
                return Err(InitError::Unavailable);
            }
            SdkStatus::ProviderUpdateRequired => {
                warn!("health provider requires an update");
                return Err(InitError::UpdateRequired);
            }
        }

        let initialized = initializer
            .initialize()
            .await
            .map_err(|e| InitError::Failed(e.to_string()))?;
        if !initialized {
            return Err(InitError::Failed("platform declined to initialize".to_string()));
        }

        info!("health platform initialized");
        Ok(Self::from_parts(permissions, records, launcher))
    }

    /// Build a handle around collaborators that are already initialized
    pub fn from_parts(
        permissions: Arc<dyn PermissionOracle>,
        records: Arc<dyn HealthRecordSource>,
        launcher: Arc<dyn ProviderLauncher>,
    ) -> Self {
        Self {
            permissions,
            records,
            launcher,
        }
    }

    pub fn permissions(&self) -> &dyn PermissionOracle {
        self.permissions.as_ref()
    }

    pub fn records(&self) -> &dyn HealthRecordSource {
        self.records.as_ref()
    }

    pub fn open_provider_app(&self) {
        self.launcher.open_provider_app();
    }
}

impl fmt::Debug for PlatformHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformHandle").finish_non_exhaustive()
    }
}
