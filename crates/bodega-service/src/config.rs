//! # Application Configuration
//!
//! Settings shared by every service of a Bodega POS installation.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                            │
//! │     BODEGA_DATABASE_PATH=/var/lib/bodega/pos.db                         │
//! │     BODEGA_UTC_OFFSET_MINUTES=-360                                      │
//! │                                                                         │
//! │  2. TOML Config File                                                    │
//! │     ~/.config/bodega-pos/bodega.toml (Linux)                            │
//! │     ~/Library/Application Support/com.bodega.pos/bodega.toml (macOS)    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # bodega.toml
//! [store]
//! name = "Abarrotes La Esquina"
//! currency_symbol = "$"
//! utc_offset_minutes = -360
//!
//! [database]
//! path = "/var/lib/bodega/pos.db"
//!
//! [inventory]
//! bulk_prefix = "BODEGA"   # "" disables pooling
//!
//! [notifications]
//! timeout_ms = 2000
//! ```

use std::path::PathBuf;
use std::time::Duration;

use bodega_core::calendar::offset_from_minutes;
use bodega_core::stock::PoolPolicy;
use bodega_core::DEFAULT_BULK_PREFIX;
use bodega_db::DbConfig;
use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// =============================================================================
// Sections
// =============================================================================

/// Store identity and business calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default = "default_store_name")]
    pub name: String,

    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,

    /// Fixed UTC offset of the business day, in minutes (UTC-6 is -360).
    #[serde(default = "default_utc_offset")]
    pub utc_offset_minutes: i32,
}

fn default_store_name() -> String {
    "Bodega POS".to_string()
}

fn default_currency_symbol() -> String {
    "$".to_string()
}

fn default_utc_offset() -> i32 {
    -360
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            name: default_store_name(),
            currency_symbol: default_currency_symbol(),
            utc_offset_minutes: default_utc_offset(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("bodega.db")
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
        }
    }
}

/// Stock pooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventorySettings {
    /// Locations starting with this prefix back every store location's
    /// sales. Empty disables pooling.
    #[serde(default = "default_bulk_prefix")]
    pub bulk_prefix: String,
}

fn default_bulk_prefix() -> String {
    DEFAULT_BULK_PREFIX.to_string()
}

impl Default for InventorySettings {
    fn default() -> Self {
        InventorySettings {
            bulk_prefix: default_bulk_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    /// Upper bound for one publish call.
    #[serde(default = "default_notify_timeout")]
    pub timeout_ms: u64,
}

fn default_notify_timeout() -> u64 {
    2_000
}

impl Default for NotificationSettings {
    fn default() -> Self {
        NotificationSettings {
            timeout_ms: default_notify_timeout(),
        }
    }
}

// =============================================================================
// AppConfig
// =============================================================================

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub inventory: InventorySettings,

    #[serde(default)]
    pub notifications: NotificationSettings,
}

impl AppConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (bodega.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = Self::from_toml(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        offset_from_minutes(self.store.utc_offset_minutes)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if self.notifications.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "notifications.timeout_ms must be greater than 0".into(),
            ));
        }

        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database.path must not be empty".into()));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies `BODEGA_*` overrides read through `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("BODEGA_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(prefix) = lookup("BODEGA_BULK_PREFIX") {
            debug!(prefix = %prefix, "Overriding bulk prefix from environment");
            self.inventory.bulk_prefix = prefix;
        }

        if let Some(offset) = lookup("BODEGA_UTC_OFFSET_MINUTES") {
            match offset.parse::<i32>() {
                Ok(minutes) => self.store.utc_offset_minutes = minutes,
                Err(_) => warn!(value = %offset, "Ignoring non-numeric BODEGA_UTC_OFFSET_MINUTES"),
            }
        }

        if let Some(timeout) = lookup("BODEGA_NOTIFY_TIMEOUT_MS") {
            match timeout.parse::<u64>() {
                Ok(ms) => self.notifications.timeout_ms = ms,
                Err(_) => warn!(value = %timeout, "Ignoring non-numeric BODEGA_NOTIFY_TIMEOUT_MS"),
            }
        }

        if let Some(name) = lookup("BODEGA_STORE_NAME") {
            self.store.name = name;
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "bodega", "pos")
            .map(|dirs| dirs.config_dir().join("bodega.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn pool_policy(&self) -> PoolPolicy {
        PoolPolicy::with_bulk_prefix(self.inventory.bulk_prefix.clone())
    }

    /// Offset of the business calendar. Falls back to UTC if the configured
    /// value is out of range (rejected by `validate` on load).
    pub fn business_offset(&self) -> FixedOffset {
        offset_from_minutes(self.store.utc_offset_minutes).unwrap_or_else(|_| Utc.fix())
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notifications.timeout_ms)
    }

    /// `:memory:` selects a private in-memory database.
    pub fn db_config(&self) -> DbConfig {
        let config = DbConfig::new(self.database.path.clone());
        if config.is_in_memory() {
            DbConfig::in_memory()
        } else {
            config
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.store.utc_offset_minutes, -360);
        assert_eq!(config.store.currency_symbol, "$");
        assert_eq!(config.inventory.bulk_prefix, "BODEGA");
        assert_eq!(config.notify_timeout(), Duration::from_secs(2));
        assert!(config.validate().is_ok());
        assert!(config.pool_policy().is_bulk("BODEGA-1"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [store]
            name = "La Esquina"

            [inventory]
            bulk_prefix = ""
            "#,
        )
        .unwrap();
        assert_eq!(config.store.name, "La Esquina");
        assert_eq!(config.store.utc_offset_minutes, -360);
        assert!(!config.pool_policy().is_bulk("BODEGA-1"));
        assert_eq!(config.database.path, PathBuf::from("bodega.db"));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("BODEGA_DATABASE_PATH", "/tmp/pos.db"),
            ("BODEGA_BULK_PREFIX", "ALM"),
            ("BODEGA_UTC_OFFSET_MINUTES", "-300"),
            ("BODEGA_NOTIFY_TIMEOUT_MS", "abc"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.database.path, PathBuf::from("/tmp/pos.db"));
        assert!(config.pool_policy().is_bulk("ALM-2"));
        assert_eq!(config.business_offset().local_minus_utc(), -300 * 60);
        assert_eq!(config.notifications.timeout_ms, 2_000);
    }

    #[test]
    fn test_validation() {
        let mut config = AppConfig::default();
        config.store.utc_offset_minutes = 24 * 60;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.notifications.timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_serialization() {
        let toml_str = toml::to_string_pretty(&AppConfig::default()).unwrap();
        assert!(toml_str.contains("[store]"));
        assert!(toml_str.contains("[inventory]"));
    }
}
