//! Scheduler staging and reconciliation
//!
//! Only the first time segment is edited locally. Fetched server state
//! replaces the staged group unless there are unsubmitted edits; a submit
//! sends the staged group as the whole schedule, clearing any others.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};

use super::{Published, SchedulerApi};
use crate::api::types::{check_hour, check_minute};
use crate::api::{ScheduleGroup, SchedulerInfo, SchedulerSetRequest};
use crate::error::{FoxessError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::projection::check_scheduler_number;

/// Partial update of the staged group; unset fields are left untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleGroupPatch {
    pub enable: Option<u8>,
    pub start_hour: Option<u8>,
    pub start_minute: Option<u8>,
    pub end_hour: Option<u8>,
    pub end_minute: Option<u8>,
    pub work_mode: Option<String>,
    pub min_soc_on_grid: Option<i64>,
    pub fd_soc: Option<i64>,
    pub fd_pwr: Option<f64>,
    pub max_soc: Option<i64>,
}

impl ScheduleGroupPatch {
    pub fn start(mut self, hour: u8, minute: u8) -> Self {
        self.start_hour = Some(hour);
        self.start_minute = Some(minute);
        self
    }

    pub fn end(mut self, hour: u8, minute: u8) -> Self {
        self.end_hour = Some(hour);
        self.end_minute = Some(minute);
        self
    }

    pub fn work_mode(mut self, mode: impl Into<String>) -> Self {
        self.work_mode = Some(mode.into());
        self
    }

    /// Apply onto a copy of `group`
    ///
    /// A start or end time must be given as an hour and minute pair.
    pub fn apply(&self, group: &ScheduleGroup) -> Result<ScheduleGroup> {
        let start = time_pair("start", self.start_hour, self.start_minute)?;
        let end = time_pair("end", self.end_hour, self.end_minute)?;

        let mut updated = group.clone();
        if let Some(enable) = self.enable {
            updated.enable = enable;
        }
        if let Some((hour, minute)) = start {
            updated.start_hour = hour;
            updated.start_minute = minute;
        }
        if let Some((hour, minute)) = end {
            updated.end_hour = hour;
            updated.end_minute = minute;
        }
        if let Some(mode) = &self.work_mode {
            updated.work_mode = mode.clone();
        }
        if let Some(v) = self.min_soc_on_grid {
            check_scheduler_number("min_soc_on_grid", v as f64)?;
            updated.min_soc_on_grid = v;
        }
        if let Some(v) = self.fd_soc {
            check_scheduler_number("fd_soc", v as f64)?;
            updated.fd_soc = v;
        }
        if let Some(v) = self.fd_pwr {
            check_scheduler_number("fd_pwr", v)?;
            updated.fd_pwr = v;
        }
        if let Some(v) = self.max_soc {
            check_scheduler_number("max_soc", v as f64)?;
            updated.max_soc = v;
        }
        Ok(updated)
    }
}

fn time_pair(prefix: &str, hour: Option<u8>, minute: Option<u8>) -> Result<Option<(u8, u8)>> {
    let hour_field = format!("{}_hour", prefix);
    let minute_field = format!("{}_minute", prefix);
    match (hour, minute) {
        (None, None) => Ok(None),
        (Some(hour), Some(minute)) => {
            check_hour(&hour_field, hour)?;
            check_minute(&minute_field, minute)?;
            Ok(Some((hour, minute)))
        }
        _ => Err(FoxessError::validation(
            hour_field.clone(),
            format!("{} and {} must be provided together", hour_field, minute_field),
        )),
    }
}

/// Staged group, dirty flag and last fetched server state
#[derive(Debug, Clone, Default)]
pub struct SchedulerStaging {
    staged: ScheduleGroup,
    dirty: bool,
    last_fetched: Option<SchedulerInfo>,
}

impl SchedulerStaging {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take in freshly fetched server state and return the new view
    pub fn apply_fetched(&mut self, info: SchedulerInfo) -> SchedulerInfo {
        if !self.dirty {
            self.staged = info.first_group().cloned().unwrap_or_default();
        }
        self.last_fetched = Some(info);
        self.view()
    }

    /// Apply a local edit; on error the staging is unchanged
    pub fn update_group(&mut self, patch: &ScheduleGroupPatch) -> Result<SchedulerInfo> {
        let updated = patch.apply(&self.staged)?;
        self.staged = updated;
        self.dirty = true;
        Ok(self.view())
    }

    /// Drop local edits in favour of the last fetched group, or the default
    pub fn restore(&mut self) -> SchedulerInfo {
        self.staged = self
            .last_fetched
            .as_ref()
            .and_then(SchedulerInfo::first_group)
            .cloned()
            .unwrap_or_default();
        self.dirty = false;
        self.view()
    }

    pub fn mark_submitted(&mut self) {
        self.dirty = false;
    }

    /// The staged group under the last fetched master enable flag
    pub fn view(&self) -> SchedulerInfo {
        SchedulerInfo {
            enable: self.last_fetched.as_ref().map_or(1, |info| info.enable),
            groups: vec![self.staged.clone()],
        }
    }

    /// Request that replaces the server schedule with the staged group
    pub fn submit_request(&self, device_sn: &str) -> SchedulerSetRequest {
        SchedulerSetRequest::single(device_sn, self.staged.clone())
    }

    pub fn staged(&self) -> &ScheduleGroup {
        &self.staged
    }

    pub fn last_fetched(&self) -> Option<&SchedulerInfo> {
        self.last_fetched.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

/// Scheduler coordinator holding the staging behind an async mutex
pub struct SchedulerCoordinator<C: ?Sized> {
    api: Arc<C>,
    device_sn: String,
    interval: Duration,
    staging: Mutex<SchedulerStaging>,
    published: Published<SchedulerInfo>,
    logger: StructuredLogger,
}

impl<C: SchedulerApi + ?Sized> SchedulerCoordinator<C> {
    pub fn new(api: Arc<C>, device_sn: impl Into<String>, interval: Duration) -> Self {
        let device_sn = device_sn.into();
        let logger =
            get_logger_with_context(LogContext::new("scheduler").with_device_sn(&device_sn));
        Self {
            api,
            device_sn,
            interval,
            staging: Mutex::new(SchedulerStaging::new()),
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

    /// Fetch server state, reconcile it with the staging and publish the view
    pub async fn refresh(&self) -> Result<Arc<SchedulerInfo>> {
        let info = match self.api.fetch_scheduler(&self.device_sn).await {
            Ok(info) => info,
            Err(err) => {
                self.logger.warn(&format!("Scheduler refresh failed: {}", err));
                return Err(FoxessError::refresh_failed("scheduler", err));
            }
        };
        let view = self.staging.lock().await.apply_fetched(info);
        Ok(self.published.publish(view))
    }

    /// Edit the staged group and push the new view to observers
    pub async fn update_group(&self, patch: &ScheduleGroupPatch) -> Result<Arc<SchedulerInfo>> {
        let view = self.staging.lock().await.update_group(patch)?;
        self.logger
            .debug(&format!("Staged scheduler group: {:?}", view.groups.first()));
        Ok(self.published.publish(view))
    }

    /// Send the staged group as the entire schedule, then refetch
    ///
    /// The dirty flag is cleared only when the write succeeds. A failing
    /// refetch afterwards is logged and leaves the published view as is.
    pub async fn submit(&self) -> Result<()> {
        {
            let mut staging = self.staging.lock().await;
            let request = staging.submit_request(&self.device_sn);
            self.logger.info(&format!(
                "Submitting scheduler group {:02}:{:02}-{:02}:{:02} {}",
                request.groups[0].start_hour,
                request.groups[0].start_minute,
                request.groups[0].end_hour,
                request.groups[0].end_minute,
                request.groups[0].work_mode
            ));
            self.api.submit_scheduler(&request).await?;
            staging.mark_submitted();
        }

        if let Err(err) = self.refresh().await {
            self.logger
                .warn(&format!("Scheduler refetch after submit failed: {}", err));
        }
        Ok(())
    }

    /// Discard local edits and push the restored view
    pub async fn restore(&self) -> Arc<SchedulerInfo> {
        let view = self.staging.lock().await.restore();
        self.published.publish(view)
    }

    pub async fn is_dirty(&self) -> bool {
        self.staging.lock().await.is_dirty()
    }

    /// Raw server state from the last successful fetch
    pub async fn last_fetched(&self) -> Option<SchedulerInfo> {
        self.staging.lock().await.last_fetched().cloned()
    }

    /// Current view: staged group plus server master flag
    pub fn data(&self) -> Option<Arc<SchedulerInfo>> {
        self.published.latest()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<SchedulerInfo>>> {
        self.published.subscribe()
    }
}
