use super::*;

pub const DEFAULT_BASE_URL: &str = "https://www.foxesscloud.com";
pub const DEFAULT_LANG: &str = "en";
pub const DEFAULT_TIMEZONE: &str = "Europe/London";
pub const DEFAULT_USER_AGENT: &str = concat!("foxess-cloud/", env!("APP_VERSION"));

pub const DEFAULT_MIN_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

pub const DEFAULT_REALTIME_INTERVAL_MINUTES: u32 = 5;
pub const MIN_REALTIME_INTERVAL_MINUTES: u32 = 1;
pub const MAX_REALTIME_INTERVAL_MINUTES: u32 = 60;

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            lang: DEFAULT_LANG.to_string(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            min_interval_ms: DEFAULT_MIN_INTERVAL_MS,
            debug: false,
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            realtime_interval_minutes: DEFAULT_REALTIME_INTERVAL_MINUTES,
            detail_interval_hours: 12,
            scheduler_interval_minutes: 60,
            realtime_api_version: "v1".to_string(),
            realtime_variables: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/tmp/foxess-cloud".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}
