//! Semi-static device detail, refreshed twice a day by default

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::{DeviceApi, Published};
use crate::api::InverterDetail;
use crate::error::{FoxessError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};

pub struct DeviceDetailCoordinator<C: ?Sized> {
    api: Arc<C>,
    device_sn: String,
    interval: Duration,
    published: Published<InverterDetail>,
    logger: StructuredLogger,
}

impl<C: DeviceApi + ?Sized> DeviceDetailCoordinator<C> {
    pub fn new(api: Arc<C>, device_sn: impl Into<String>, interval: Duration) -> Self {
        let device_sn = device_sn.into();
        let logger =
            get_logger_with_context(LogContext::new("detail").with_device_sn(&device_sn));
        Self {
            api,
            device_sn,
            interval,
            published: Published::new(),
            logger,
        }
    }

    pub fn device_sn(&self) -> &str {
        &self.device_sn
    }

    pub fn update_interval(&self) -> Duration {
        self.interval
    }

    /// Fetch the detail and publish it
    pub async fn refresh(&self) -> Result<Arc<InverterDetail>> {
        match self.api.fetch_device_detail(&self.device_sn).await {
            Ok(detail) => {
                self.logger.debug("Device detail refreshed");
                Ok(self.published.publish(detail))
            }
            Err(err) => {
                self.logger
                    .warn(&format!("Device detail refresh failed: {}", err));
                Err(FoxessError::refresh_failed("device detail", err))
            }
        }
    }

    /// Last successfully fetched detail
    pub fn data(&self) -> Option<Arc<InverterDetail>> {
        self.published.latest()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<InverterDetail>>> {
        self.published.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyDetail {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl DeviceApi for FlakyDetail {
        async fn fetch_device_detail(&self, sn: &str) -> Result<InverterDetail> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(serde_json::from_value(json!({"deviceSN": sn, "capacity": 5.0}))?)
            } else {
                Err(FoxessError::auth("key revoked"))
            }
        }
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_detail() {
        let api = Arc::new(FlakyDetail {
            calls: AtomicUsize::new(0),
        });
        let coordinator =
            DeviceDetailCoordinator::new(api, "SN1", Duration::from_secs(12 * 3600));
        assert!(coordinator.data().is_none());

        let detail = coordinator.refresh().await.unwrap();
        assert_eq!(detail.capacity, Some(5.0));

        let err = coordinator.refresh().await.unwrap_err();
        assert!(err.is_auth());
        assert!(matches!(err, FoxessError::RefreshFailed { .. }));
        assert_eq!(coordinator.data().unwrap().device_sn, "SN1");
    }
}
