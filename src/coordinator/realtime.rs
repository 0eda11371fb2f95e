//! Real-time snapshot polling for one device

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::{Published, RealTimeApi};
use crate::api::{RealTimeApiVersion, RealTimeSnapshot};
use crate::config::{
    DEFAULT_REALTIME_INTERVAL_MINUTES, MAX_REALTIME_INTERVAL_MINUTES, MIN_REALTIME_INTERVAL_MINUTES,
    RefreshConfig,
};
use crate::error::{FoxessError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};

/// Clamp a user-provided interval to the supported minute range
pub fn clamp_interval_minutes(minutes: u32) -> u32 {
    minutes.clamp(MIN_REALTIME_INTERVAL_MINUTES, MAX_REALTIME_INTERVAL_MINUTES)
}

pub struct RealTimeCoordinator<C: ?Sized> {
    api: Arc<C>,
    device_sn: String,
    variables: Vec<String>,
    api_version: RealTimeApiVersion,
    interval: Duration,
    published: Published<RealTimeSnapshot>,
    logger: StructuredLogger,
}

impl<C: RealTimeApi + ?Sized> RealTimeCoordinator<C> {
    /// Poll all variables with the v1 endpoint at the default interval
    pub fn new(api: Arc<C>, device_sn: impl Into<String>) -> Self {
        let device_sn = device_sn.into();
        let logger =
            get_logger_with_context(LogContext::new("realtime").with_device_sn(&device_sn));
        Self {
            api,
            device_sn,
            variables: Vec::new(),
            api_version: RealTimeApiVersion::default(),
            interval: Duration::from_secs(u64::from(DEFAULT_REALTIME_INTERVAL_MINUTES) * 60),
            published: Published::new(),
            logger,
        }
    }

    /// Build from the `refresh` configuration section
    pub fn from_config(
        api: Arc<C>,
        device_sn: impl Into<String>,
        refresh: &RefreshConfig,
    ) -> Result<Self> {
        let api_version = refresh.realtime_api_version.parse()?;
        Ok(Self::new(api, device_sn)
            .with_interval(refresh.realtime_interval())
            .with_api_version(api_version)
            .with_variables(refresh.realtime_variables.clone().unwrap_or_default()))
    }

    /// Restrict the query to these variables; empty requests everything
    pub fn with_variables(mut self, variables: Vec<String>) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_api_version(mut self, api_version: RealTimeApiVersion) -> Self {
        self.api_version = api_version;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the interval in minutes, clamped to [1, 60]
    pub fn with_interval_minutes(self, minutes: u32) -> Self {
        let minutes = clamp_interval_minutes(minutes);
        self.with_interval(Duration::from_secs(u64::from(minutes) * 60))
    }

    pub fn device_sn(&self) -> &str {
        &self.device_sn
    }

    pub fn update_interval(&self) -> Duration {
        self.interval
    }

    pub async fn refresh(&self) -> Result<Arc<RealTimeSnapshot>> {
        match self
            .api
            .fetch_real_time_snapshot(&self.device_sn, &self.variables, self.api_version)
            .await
        {
            Ok(snapshot) => {
                self.logger.debug(&format!(
                    "Real-time snapshot with {} variable(s)",
                    snapshot.variables.len()
                ));
                Ok(self.published.publish(snapshot))
            }
            Err(err) => {
                self.logger
                    .warn(&format!("Real-time refresh failed: {}", err));
                Err(FoxessError::refresh_failed("real-time data", err))
            }
        }
    }

    pub fn data(&self) -> Option<Arc<RealTimeSnapshot>> {
        self.published.latest()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<RealTimeSnapshot>>> {
        self.published.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRealTime {
        requests: Mutex<Vec<(String, Vec<String>, RealTimeApiVersion)>>,
    }

    #[async_trait::async_trait]
    impl RealTimeApi for RecordingRealTime {
        async fn fetch_real_time_snapshot(
            &self,
            sn: &str,
            variables: &[String],
            api_version: RealTimeApiVersion,
        ) -> Result<RealTimeSnapshot> {
            self.requests
                .lock()
                .unwrap()
                .push((sn.to_string(), variables.to_vec(), api_version));
            Ok(RealTimeSnapshot::empty(sn))
        }
    }

    #[test]
    fn interval_is_clamped() {
        assert_eq!(clamp_interval_minutes(0), 1);
        assert_eq!(clamp_interval_minutes(5), 5);
        assert_eq!(clamp_interval_minutes(90), 60);

        let coordinator = RealTimeCoordinator::new(Arc::new(RecordingRealTime::default()), "SN1")
            .with_interval_minutes(120);
        assert_eq!(coordinator.update_interval(), Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn refresh_uses_configured_query() {
        let api = Arc::new(RecordingRealTime::default());
        let refresh = RefreshConfig {
            realtime_api_version: "v0".to_string(),
            realtime_variables: Some(vec!["pvPower".to_string(), "SoC".to_string()]),
            ..RefreshConfig::default()
        };
        let coordinator = RealTimeCoordinator::from_config(api.clone(), "SN1", &refresh).unwrap();
        assert_eq!(coordinator.update_interval(), Duration::from_secs(300));

        let mut rx = coordinator.subscribe();
        let snapshot = coordinator.refresh().await.unwrap();
        assert_eq!(snapshot.device_sn, "SN1");
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_some());

        let requests = api.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].1, vec!["pvPower", "SoC"]);
        assert_eq!(requests[0].2, RealTimeApiVersion::V0);
    }

    #[test]
    fn unknown_api_version_is_rejected() {
        let refresh = RefreshConfig {
            realtime_api_version: "v3".to_string(),
            ..RefreshConfig::default()
        };
        let result = RealTimeCoordinator::from_config(
            Arc::new(RecordingRealTime::default()),
            "SN1",
            &refresh,
        );
        assert!(result.is_err());
    }
}
