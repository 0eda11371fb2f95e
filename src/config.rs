//! Configuration management for foxess-cloud
//!
//! This module handles loading, validation, and management of the
//! configuration from YAML files with support for environment variable
//! overrides of the credential and device serial.

use crate::error::{FoxessError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

mod defaults;

pub use defaults::{
    DEFAULT_BASE_URL, DEFAULT_LANG, DEFAULT_MIN_INTERVAL_MS, DEFAULT_REALTIME_INTERVAL_MINUTES,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_TIMEZONE, DEFAULT_USER_AGENT,
    MAX_REALTIME_INTERVAL_MINUTES, MIN_REALTIME_INTERVAL_MINUTES,
};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Vendor API connection settings
    pub api: ApiConfig,

    /// The inverter this instance manages
    pub device: DeviceConfig,

    /// Refresh schedules for the coordinators
    pub refresh: RefreshConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// FoxESS Cloud API connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// OpenAPI key from the FoxESS Cloud user profile
    pub api_key: String,

    /// Base URL of the cloud API
    pub base_url: String,

    /// Value of the `Lang` header
    pub lang: String,

    /// Value of the `Timezone` header (IANA zone name)
    pub timezone: String,

    /// Value of the `User-Agent` header
    pub user_agent: String,

    /// Minimum gap between two requests from one client, in milliseconds
    pub min_interval_ms: u64,

    /// Log full request payloads and errno/message pairs at debug level
    pub debug: bool,
}

/// Device selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Inverter serial number
    pub serial: String,

    /// Optional display name, defaults to the serial number
    pub name: Option<String>,
}

/// Refresh intervals
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Real-time snapshot interval in minutes, clamped to [1, 60]
    pub realtime_interval_minutes: u32,

    /// Device detail interval in hours
    pub detail_interval_hours: u32,

    /// Scheduler interval in minutes
    pub scheduler_interval_minutes: u32,

    /// Real-time endpoint version (v0 or v1)
    pub realtime_api_version: String,

    /// Variables to request from the real-time endpoint; all when unset
    pub realtime_variables: Option<Vec<String>>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Directory (or file path whose parent is used) for rotated log files
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl RefreshConfig {
    /// Real-time interval with the configured minutes clamped to the supported range
    pub fn realtime_interval(&self) -> Duration {
        let minutes = self
            .realtime_interval_minutes
            .clamp(MIN_REALTIME_INTERVAL_MINUTES, MAX_REALTIME_INTERVAL_MINUTES);
        Duration::from_secs(u64::from(minutes) * 60)
    }

    pub fn detail_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.detail_interval_hours.max(1)) * 3600)
    }

    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.scheduler_interval_minutes.max(1)) * 60)
    }
}

impl ApiConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from the first default location that exists
    pub fn load() -> Result<Self> {
        let default_paths = [
            "foxess_cloud.yaml",
            "/data/foxess_cloud.yaml",
            "/etc/foxess-cloud/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        // Fall back to defaults plus whatever the environment provides
        let mut config = Config::default();
        config.apply_env_overrides();
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// `FOXESS_API_KEY` and `FOXESS_DEVICE_SN` take precedence over the file
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("FOXESS_API_KEY")
            && !key.trim().is_empty()
        {
            self.api.api_key = key.trim().to_string();
        }
        if let Ok(sn) = std::env::var("FOXESS_DEVICE_SN")
            && !sn.trim().is_empty()
        {
            self.device.serial = sn.trim().to_string();
        }
    }

    /// Display name for the configured device
    pub fn device_name(&self) -> &str {
        self.device
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.device.serial)
    }

    /// Validate the configuration, including the device selection
    pub fn validate(&self) -> Result<()> {
        self.validate_connection()?;

        if self.device.serial.trim().is_empty() {
            return Err(FoxessError::validation(
                "device.serial",
                "Device serial number cannot be empty",
            ));
        }

        Ok(())
    }

    /// Validate everything except the device selection
    ///
    /// Commands that take a serial on the command line only need this part.
    pub fn validate_connection(&self) -> Result<()> {
        if self.api.api_key.trim().is_empty() {
            return Err(FoxessError::validation(
                "api.api_key",
                "API key cannot be empty",
            ));
        }

        if !(self.api.base_url.starts_with("https://") || self.api.base_url.starts_with("http://"))
        {
            return Err(FoxessError::validation(
                "api.base_url",
                "Must be an http(s) URL",
            ));
        }

        if self.api.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(FoxessError::validation(
                "api.timezone",
                "Unknown IANA timezone",
            ));
        }

        if !matches!(self.refresh.realtime_api_version.as_str(), "v0" | "v1") {
            return Err(FoxessError::validation(
                "refresh.realtime_api_version",
                "Must be 'v0' or 'v1'",
            ));
        }

        crate::logging::parse_log_level(&self.logging.level)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.api.api_key = "key".to_string();
        config.device.serial = "SN1".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api.base_url, "https://www.foxesscloud.com");
        assert_eq!(config.api.min_interval_ms, 2000);
        assert_eq!(config.refresh.realtime_interval_minutes, 5);
        assert_eq!(config.refresh.realtime_api_version, "v1");
    }

    #[test]
    fn test_config_validation() {
        let mut config = valid_config();
        assert!(config.validate().is_ok());

        config.api.api_key = "  ".to_string();
        assert!(config.validate().is_err());

        config = valid_config();
        config.device.serial = String::new();
        assert!(config.validate().is_err());

        config = valid_config();
        config.api.timezone = "Mars/Olympus".to_string();
        assert!(config.validate().is_err());

        config = valid_config();
        config.refresh.realtime_api_version = "v2".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_realtime_interval_is_clamped() {
        let mut refresh = RefreshConfig::default();
        refresh.realtime_interval_minutes = 0;
        assert_eq!(refresh.realtime_interval(), Duration::from_secs(60));
        refresh.realtime_interval_minutes = 600;
        assert_eq!(refresh.realtime_interval(), Duration::from_secs(3600));
        refresh.realtime_interval_minutes = 7;
        assert_eq!(refresh.realtime_interval(), Duration::from_secs(420));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "api:\n  api_key: abc\ndevice:\n  serial: SN9\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.api.api_key, "abc");
        assert_eq!(config.api.lang, "en");
        assert_eq!(config.device_name(), "SN9");
        assert_eq!(config.refresh.detail_interval_hours, 12);
    }
}
