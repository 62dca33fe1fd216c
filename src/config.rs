use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use validator::Validate;

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_min_connections() -> u32 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_true() -> bool {
    true
}

/// Application configuration, loaded from an optional config file with
/// `APP_*` environment variable overrides.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1, message = "Database URL is required"))]
    pub database_url: String,

    /// Maximum number of pooled connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// Minimum number of pooled connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Create missing tables on startup (embedded/dev databases only)
    #[serde(default)]
    pub auto_migrate: bool,

    /// Default for the stock-management toggle when the settings
    /// collaborator is not consulted. Defaults to enabled: skipping stock
    /// checks silently is the failure mode to avoid.
    #[serde(default = "default_true")]
    pub stock_management_enabled: bool,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl AppConfig {
    /// Creates a configuration programmatically; used by tests.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            stock_management_enabled: true,
            environment: "test".to_string(),
        }
    }

    /// Loads configuration from `config/default.*` (if present) layered
    /// with `APP_`-prefixed environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(Environment::with_prefix("APP"))
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;
        app_config
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        Ok(app_config)
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_applies_defaults() {
        let cfg = AppConfig::new("sqlite::memory:");
        assert_eq!(cfg.database_url(), "sqlite::memory:");
        assert_eq!(cfg.db_max_connections, 10);
        assert!(cfg.stock_management_enabled);
        assert!(!cfg.is_production());
    }

    #[test]
    fn empty_database_url_fails_validation() {
        let cfg = AppConfig::new("");
        assert!(cfg.validate().is_err());
    }
}
