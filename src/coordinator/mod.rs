//! Refresh coordinators
//!
//! Each coordinator owns one read model for one device, refreshes it on
//! demand, and publishes the latest value through a `watch` channel. The
//! host drives `refresh()` on the coordinator's `update_interval()`. A
//! failed refresh keeps the previously published value.

pub mod detail;
pub mod realtime;
pub mod scheduler;

pub use detail::DeviceDetailCoordinator;
pub use realtime::RealTimeCoordinator;
pub use scheduler::{ScheduleGroupPatch, SchedulerCoordinator, SchedulerStaging};

use std::sync::Arc;
use tokio::sync::watch;

use crate::api::{
    FoxessClient, InverterDetail, RealTimeApiVersion, RealTimeSnapshot, SchedulerInfo,
    SchedulerSetRequest,
};
use crate::error::Result;

/// Source of device detail
#[async_trait::async_trait]
pub trait DeviceApi: Send + Sync {
    async fn fetch_device_detail(&self, sn: &str) -> Result<InverterDetail>;
}

/// Source of real-time snapshots
#[async_trait::async_trait]
pub trait RealTimeApi: Send + Sync {
    async fn fetch_real_time_snapshot(
        &self,
        sn: &str,
        variables: &[String],
        api_version: RealTimeApiVersion,
    ) -> Result<RealTimeSnapshot>;
}

/// Scheduler read and write access
#[async_trait::async_trait]
pub trait SchedulerApi: Send + Sync {
    async fn fetch_scheduler(&self, sn: &str) -> Result<SchedulerInfo>;
    async fn submit_scheduler(&self, request: &SchedulerSetRequest) -> Result<()>;
}

#[async_trait::async_trait]
impl DeviceApi for FoxessClient {
    async fn fetch_device_detail(&self, sn: &str) -> Result<InverterDetail> {
        self.get_device_detail(sn).await
    }
}

#[async_trait::async_trait]
impl RealTimeApi for FoxessClient {
    async fn fetch_real_time_snapshot(
        &self,
        sn: &str,
        variables: &[String],
        api_version: RealTimeApiVersion,
    ) -> Result<RealTimeSnapshot> {
        self.get_real_time_snapshot(sn, variables, api_version).await
    }
}

#[async_trait::async_trait]
impl SchedulerApi for FoxessClient {
    async fn fetch_scheduler(&self, sn: &str) -> Result<SchedulerInfo> {
        self.get_scheduler(sn).await
    }

    async fn submit_scheduler(&self, request: &SchedulerSetRequest) -> Result<()> {
        self.set_scheduler(request).await
    }
}

/// Whether a scheduler coordinator should be created for the device
///
/// Without detail, or without a capability map, the scheduler is assumed to
/// be available.
pub fn has_scheduler(detail: Option<&InverterDetail>) -> bool {
    detail.is_none_or(InverterDetail::supports_scheduler)
}

/// Latest-value channel shared by the coordinators
pub(crate) struct Published<T> {
    tx: watch::Sender<Option<Arc<T>>>,
}

impl<T> Published<T> {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub(crate) fn publish(&self, value: T) -> Arc<T> {
        let value = Arc::new(value);
        self.tx.send_replace(Some(value.clone()));
        value
    }

    pub(crate) fn latest(&self) -> Option<Arc<T>> {
        self.tx.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Option<Arc<T>>> {
        self.tx.subscribe()
    }
}
