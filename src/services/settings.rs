//! Settings collaborator for the stock-management toggle.
//!
//! The toggle is owned by an external settings service. Coordinator calls
//! take an explicit `StockPolicy` snapshot so the flag is read once per
//! request and never re-checked mid-transaction.

use async_trait::async_trait;
use tracing::warn;

use crate::config::AppConfig;
use crate::errors::ServiceError;

/// External collaborator answering "is stock management enabled?".
#[async_trait]
pub trait SettingsService: Send + Sync {
    async fn is_stock_management_enabled(&self) -> Result<bool, ServiceError>;
}

/// Per-request snapshot of the stock-management toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockPolicy {
    Enabled,
    Disabled,
}

impl StockPolicy {
    /// Reads the toggle once. A failing collaborator defaults to `Enabled`:
    /// skipping stock checks silently is worse than checking unnecessarily.
    pub async fn snapshot(settings: &dyn SettingsService) -> Self {
        match settings.is_stock_management_enabled().await {
            Ok(true) => StockPolicy::Enabled,
            Ok(false) => StockPolicy::Disabled,
            Err(e) => {
                warn!(
                    error = %e,
                    "Settings collaborator unavailable; defaulting to stock management enabled"
                );
                StockPolicy::Enabled
            }
        }
    }

    pub fn is_enabled(self) -> bool {
        matches!(self, StockPolicy::Enabled)
    }
}

/// Fixed-value settings source, backed by configuration. Also the test
/// double for exercising both toggle states deterministically.
#[derive(Debug, Clone)]
pub struct StaticSettings {
    enabled: bool,
}

impl StaticSettings {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            enabled: config.stock_management_enabled,
        }
    }
}

#[async_trait]
impl SettingsService for StaticSettings {
    async fn is_stock_management_enabled(&self) -> Result<bool, ServiceError> {
        Ok(self.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSettings;

    #[async_trait]
    impl SettingsService for FailingSettings {
        async fn is_stock_management_enabled(&self) -> Result<bool, ServiceError> {
            Err(ServiceError::InternalError("settings store down".into()))
        }
    }

    #[tokio::test]
    async fn snapshot_reflects_collaborator() {
        assert_eq!(
            StockPolicy::snapshot(&StaticSettings::new(true)).await,
            StockPolicy::Enabled
        );
        assert_eq!(
            StockPolicy::snapshot(&StaticSettings::new(false)).await,
            StockPolicy::Disabled
        );
    }

    #[tokio::test]
    async fn snapshot_fails_safe_toward_enabled() {
        assert_eq!(
            StockPolicy::snapshot(&FailingSettings).await,
            StockPolicy::Enabled
        );
    }

    #[tokio::test]
    async fn from_config_uses_configured_default() {
        let cfg = AppConfig::new("sqlite::memory:");
        let policy = StockPolicy::snapshot(&StaticSettings::from_config(&cfg)).await;
        assert!(policy.is_enabled());
    }
}
