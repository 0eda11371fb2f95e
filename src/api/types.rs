//! Wire types for the FoxESS Cloud OpenAPI
//!
//! Field names follow the vendor's camelCase; unknown fields are ignored.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::error::{FoxessError, Result};

/// Inverter work modes accepted by the `WorkMode` setting
pub const WORK_MODES: [&str; 4] = ["SelfUse", "Feedin", "Backup", "PeakShaving"];

/// Variables requested by a production report when none are given
pub const DEFAULT_REPORT_VARIABLES: [&str; 6] = [
    "generation",
    "feedin",
    "gridConsumption",
    "chargeEnergyToTal",
    "dischargeEnergyToTal",
    "PVEnergyTotal",
];

/// A value the API reports as either a number or a string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl ScalarValue {
    /// Numeric view; numeric strings are parsed
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Int(v) => Some(*v as f64),
            ScalarValue::Float(v) => Some(*v),
            ScalarValue::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Interpret command-line style input: integer, then float, then text
    pub fn coerce(raw: &str) -> Self {
        if raw.contains('.') {
            if let Ok(v) = raw.parse::<f64>() {
                return ScalarValue::Float(v);
            }
        } else if let Ok(v) = raw.parse::<i64>() {
            return ScalarValue::Int(v);
        }
        ScalarValue::Text(raw.to_string())
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Int(v) => write!(f, "{}", v),
            ScalarValue::Float(v) => write!(f, "{}", v),
            ScalarValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        ScalarValue::Int(v)
    }
}

impl From<f64> for ScalarValue {
    fn from(v: f64) -> Self {
        ScalarValue::Float(v)
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        ScalarValue::Text(v.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(v: String) -> Self {
        ScalarValue::Text(v)
    }
}

/// Inverter as returned by the device list endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inverter {
    #[serde(rename = "deviceSN")]
    pub device_sn: String,
    #[serde(rename = "moduleSN")]
    pub module_sn: String,
    #[serde(rename = "stationID")]
    pub station_id: String,
    #[serde(rename = "stationName")]
    pub station_name: String,
    #[serde(default)]
    pub status: Option<i64>,
    #[serde(rename = "hasBattery", default)]
    pub has_battery: Option<bool>,
    #[serde(rename = "deviceType", default)]
    pub device_type: Option<String>,
    #[serde(rename = "productType", default)]
    pub product_type: Option<String>,
}

/// One page of the device list
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceListPage {
    #[serde(rename = "currentPage", default)]
    pub current_page: Option<u32>,
    #[serde(rename = "pageSize", default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub total: Option<u32>,
    #[serde(default)]
    pub data: Vec<Inverter>,
}

/// Battery attached to an inverter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryInfo {
    #[serde(rename = "batterySN")]
    pub battery_sn: String,
    #[serde(rename = "type", default)]
    pub battery_type: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Usable capacity in Wh
    #[serde(default)]
    pub capacity: Option<f64>,
}

/// Detailed inverter information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InverterDetail {
    #[serde(rename = "deviceSN")]
    pub device_sn: String,
    #[serde(rename = "moduleSN", default)]
    pub module_sn: Option<String>,
    #[serde(rename = "stationID", default)]
    pub station_id: Option<String>,
    #[serde(rename = "stationName", default)]
    pub station_name: Option<String>,
    #[serde(default)]
    pub status: Option<i64>,
    #[serde(rename = "hasBattery", default)]
    pub has_battery: Option<bool>,
    #[serde(rename = "deviceType", default)]
    pub device_type: Option<String>,
    #[serde(rename = "productType", default)]
    pub product_type: Option<String>,
    #[serde(default)]
    pub installer: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    /// Nameplate capacity in kW
    #[serde(default)]
    pub capacity: Option<f64>,
    #[serde(rename = "lastUpdateTime", default)]
    pub last_update_time: Option<String>,
    #[serde(rename = "connectStatus", default)]
    pub connect_status: Option<String>,
    #[serde(rename = "afciVersion", default)]
    pub afci_version: Option<String>,
    #[serde(rename = "managerVersion", default)]
    pub manager_version: Option<String>,
    #[serde(rename = "masterVersion", default)]
    pub master_version: Option<String>,
    #[serde(rename = "slaveVersion", default)]
    pub slave_version: Option<String>,
    #[serde(rename = "hardwareVersion", default)]
    pub hardware_version: Option<String>,
    /// Capability flags such as `scheduler`
    #[serde(default)]
    pub function: Option<HashMap<String, serde_json::Value>>,
    #[serde(rename = "batteryList", default)]
    pub battery_list: Option<Vec<BatteryInfo>>,
}

impl InverterDetail {
    /// Whether the device advertises the scheduler; devices without a
    /// capability map are assumed to support it
    pub fn supports_scheduler(&self) -> bool {
        match &self.function {
            None => true,
            Some(map) => map.get("scheduler").is_some_and(|v| match v {
                serde_json::Value::Bool(b) => *b,
                serde_json::Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
                _ => false,
            }),
        }
    }

    /// Sum of attached battery capacities in kWh
    pub fn battery_capacity_kwh(&self) -> Option<f64> {
        let batteries = self.battery_list.as_ref()?;
        let capacities: Vec<f64> = batteries.iter().filter_map(|b| b.capacity).collect();
        if capacities.is_empty() {
            return None;
        }
        Some(capacities.iter().sum::<f64>() / 1000.0)
    }
}

/// Battery SOC limits
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatterySoc {
    #[serde(rename = "minSoc")]
    pub min_soc: i64,
    #[serde(rename = "minSocOnGrid")]
    pub min_soc_on_grid: i64,
}

/// Generation totals in kWh
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub today: f64,
    pub month: f64,
    pub cumulative: f64,
}

/// Device setting value and metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingItem {
    #[serde(rename = "enumList", default)]
    pub enum_list: Option<Vec<String>>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub precision: Option<f64>,
    #[serde(default)]
    pub value: Option<ScalarValue>,
}

/// Result of a setting write; the API may answer with a null result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingWriteResult {
    #[serde(default)]
    pub value: Option<ScalarValue>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub precision: Option<f64>,
}

/// Production report aggregation level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportDimension {
    Year,
    Month,
    Day,
}

impl ReportDimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportDimension::Year => "year",
            ReportDimension::Month => "month",
            ReportDimension::Day => "day",
        }
    }
}

impl FromStr for ReportDimension {
    type Err = FoxessError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "year" => Ok(ReportDimension::Year),
            "month" => Ok(ReportDimension::Month),
            "day" => Ok(ReportDimension::Day),
            _ => Err(FoxessError::api("dimension must be one of: year, month, day")),
        }
    }
}

/// Production report query
#[derive(Debug, Clone, PartialEq)]
pub struct ReportQuery {
    pub sn: String,
    pub dimension: ReportDimension,
    pub year: i32,
    pub month: Option<u32>,
    pub day: Option<u32>,
    /// Defaults to [`DEFAULT_REPORT_VARIABLES`] when empty
    pub variables: Vec<String>,
}

impl ReportQuery {
    pub fn new(sn: impl Into<String>, dimension: ReportDimension, year: i32) -> Self {
        Self {
            sn: sn.into(),
            dimension,
            year,
            month: None,
            day: None,
            variables: Vec::new(),
        }
    }

    pub fn with_month(mut self, month: u32) -> Self {
        self.month = Some(month);
        self
    }

    pub fn with_day(mut self, day: u32) -> Self {
        self.day = Some(day);
        self
    }

    pub fn with_variables(mut self, variables: Vec<String>) -> Self {
        self.variables = variables;
        self
    }
}

/// One series of a production report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionPoint {
    pub variable: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub values: Vec<f64>,
    #[serde(default)]
    pub time: Option<Vec<String>>,
}

/// Real-time endpoint version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RealTimeApiVersion {
    /// `/op/v0/device/real/query`, exactly one serial
    V0,
    /// `/op/v1/device/real/query`, any number of serials
    #[default]
    V1,
}

impl RealTimeApiVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            RealTimeApiVersion::V0 => "v0",
            RealTimeApiVersion::V1 => "v1",
        }
    }
}

impl FromStr for RealTimeApiVersion {
    type Err = FoxessError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "v0" => Ok(RealTimeApiVersion::V0),
            "v1" => Ok(RealTimeApiVersion::V1),
            _ => Err(FoxessError::api("api_version must be 'v0' or 'v1'")),
        }
    }
}

/// A single real-time variable reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealTimeVariable {
    pub variable: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value: Option<ScalarValue>,
}

/// Real-time readings for one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealTimeData {
    #[serde(rename = "deviceSN")]
    pub device_sn: String,
    #[serde(default)]
    pub datas: Vec<RealTimeVariable>,
    #[serde(default)]
    pub time: Option<String>,
}

/// Point-in-time mapping from variable name to reading for one device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RealTimeSnapshot {
    pub device_sn: String,
    /// Server timestamp, e.g. `2025-12-03 15:54:06 AEDT+1100`
    pub time: Option<String>,
    pub variables: BTreeMap<String, RealTimeVariable>,
}

impl RealTimeSnapshot {
    pub fn empty(device_sn: impl Into<String>) -> Self {
        Self {
            device_sn: device_sn.into(),
            time: None,
            variables: BTreeMap::new(),
        }
    }

    pub fn from_realtime(data: RealTimeData) -> Self {
        let variables = data
            .datas
            .into_iter()
            .map(|item| (item.variable.clone(), item))
            .collect();
        Self {
            device_sn: data.device_sn,
            time: data.time,
            variables,
        }
    }

    pub fn get(&self, variable: &str) -> Option<&RealTimeVariable> {
        self.variables.get(variable)
    }

    pub fn value(&self, variable: &str) -> Option<&ScalarValue> {
        self.get(variable).and_then(|v| v.value.as_ref())
    }

    pub fn value_f64(&self, variable: &str) -> Option<f64> {
        self.value(variable).and_then(ScalarValue::as_f64)
    }

    /// Parse the server timestamp; the zone abbreviation is ignored in
    /// favour of the numeric offset glued to it
    pub fn timestamp(&self) -> Option<DateTime<FixedOffset>> {
        let raw = self.time.as_deref()?.trim();
        let (local, zone) = raw.rsplit_once(' ')?;
        let offset_start = zone.find(['+', '-'])?;
        let offset = zone.get(offset_start..)?;
        DateTime::parse_from_str(&format!("{} {}", local, offset), "%Y-%m-%d %H:%M:%S %z").ok()
    }
}

/// One scheduler time segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleGroup {
    pub enable: u8,
    #[serde(rename = "startHour")]
    pub start_hour: u8,
    #[serde(rename = "startMinute")]
    pub start_minute: u8,
    #[serde(rename = "endHour")]
    pub end_hour: u8,
    #[serde(rename = "endMinute")]
    pub end_minute: u8,
    #[serde(rename = "workMode")]
    pub work_mode: String,
    #[serde(rename = "minSocOnGrid")]
    pub min_soc_on_grid: i64,
    #[serde(rename = "fdSoc")]
    pub fd_soc: i64,
    #[serde(rename = "fdPwr")]
    pub fd_pwr: f64,
    #[serde(rename = "maxSoc")]
    pub max_soc: i64,
}

/// Used whenever no server data exists yet
impl Default for ScheduleGroup {
    fn default() -> Self {
        Self {
            enable: 0,
            start_hour: 0,
            start_minute: 0,
            end_hour: 0,
            end_minute: 0,
            work_mode: "SelfUse".to_string(),
            min_soc_on_grid: 20,
            fd_soc: 20,
            fd_pwr: 10000.0,
            max_soc: 100,
        }
    }
}

impl ScheduleGroup {
    pub fn is_enabled(&self) -> bool {
        self.enable != 0
    }

    /// Check the hour/minute ranges
    pub fn validate(&self) -> Result<()> {
        check_hour("start_hour", self.start_hour)?;
        check_minute("start_minute", self.start_minute)?;
        check_hour("end_hour", self.end_hour)?;
        check_minute("end_minute", self.end_minute)?;
        Ok(())
    }
}

pub(crate) fn check_hour(field: &str, hour: u8) -> Result<()> {
    if hour > 23 {
        return Err(FoxessError::validation(
            field.to_string(),
            format!("hour {} is outside 0-23", hour),
        ));
    }
    Ok(())
}

pub(crate) fn check_minute(field: &str, minute: u8) -> Result<()> {
    if minute > 59 {
        return Err(FoxessError::validation(
            field.to_string(),
            format!("minute {} is outside 0-59", minute),
        ));
    }
    Ok(())
}

/// Server-side scheduler state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerInfo {
    pub enable: u8,
    pub groups: Vec<ScheduleGroup>,
}

impl SchedulerInfo {
    pub fn is_enabled(&self) -> bool {
        self.enable != 0
    }

    pub fn first_group(&self) -> Option<&ScheduleGroup> {
        self.groups.first()
    }
}

/// Body of the scheduler enable call; replaces the whole group list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerSetRequest {
    #[serde(rename = "deviceSN")]
    pub device_sn: String,
    pub groups: Vec<ScheduleGroup>,
}

impl SchedulerSetRequest {
    pub fn single(device_sn: impl Into<String>, group: ScheduleGroup) -> Self {
        Self {
            device_sn: device_sn.into(),
            groups: vec![group],
        }
    }

    /// A request that clears every group on the device
    pub fn clear(device_sn: impl Into<String>) -> Self {
        Self {
            device_sn: device_sn.into(),
            groups: Vec::new(),
        }
    }
}
