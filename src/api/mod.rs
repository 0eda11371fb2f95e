//! FoxESS Cloud OpenAPI access
//!
//! Split into the signed HTTP client, request signing and throttling, the
//! setting-key table, and the wire types.

pub mod client;
pub mod settings;
pub mod signer;
pub mod types;

pub use client::{FoxessClient, check_envelope, parse_result};
pub use settings::{allowed_keys, canonical_setting_key};
pub use signer::{Throttle, sign, timestamp_ms};
pub use types::{
    BatteryInfo, BatterySoc, DEFAULT_REPORT_VARIABLES, DeviceListPage, Generation, Inverter,
    InverterDetail, ProductionPoint, RealTimeApiVersion, RealTimeData, RealTimeSnapshot,
    RealTimeVariable, ReportDimension, ReportQuery, ScalarValue, ScheduleGroup, SchedulerInfo,
    SchedulerSetRequest, SettingItem, SettingWriteResult, WORK_MODES,
};
