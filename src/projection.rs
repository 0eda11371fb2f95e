//! Read-only projections of coordinator data
//!
//! A [`Projection`] names one value a host exposes (a sensor, a diagnostic,
//! a configurable field) and knows how to pull it out of a read model. The
//! tables below cover the real-time snapshot, the device detail, the staged
//! scheduler view and the call tracker.

use serde::Serialize;
use std::fmt;

use crate::api::{
    InverterDetail, RealTimeSnapshot, ScalarValue, ScheduleGroup, SchedulerInfo,
    canonical_setting_key,
};
use crate::error::{FoxessError, Result};
use crate::tracker::ApiCallTracker;

pub const MANUFACTURER: &str = "FoxESS";

/// How a host should present a projected value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectionCategory {
    Measurement,
    Diagnostic,
    Config,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ProjectedValue {
    Number(f64),
    Text(String),
    Bool(bool),
}

impl From<&ScalarValue> for ProjectedValue {
    fn from(value: &ScalarValue) -> Self {
        match value.as_f64() {
            Some(n) => ProjectedValue::Number(n),
            None => ProjectedValue::Text(value.to_string()),
        }
    }
}

impl fmt::Display for ProjectedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectedValue::Number(n) => write!(f, "{}", n),
            ProjectedValue::Text(s) => f.write_str(s),
            ProjectedValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

type Extractor<T> = Box<dyn Fn(&T) -> Option<ProjectedValue> + Send + Sync>;

/// One named value derived from a read model `T`
pub struct Projection<T> {
    pub key: &'static str,
    pub unit: Option<&'static str>,
    pub category: ProjectionCategory,
    pub enabled_by_default: bool,
    extract: Extractor<T>,
}

impl<T> Projection<T> {
    pub fn new<F>(key: &'static str, extract: F) -> Self
    where
        F: Fn(&T) -> Option<ProjectedValue> + Send + Sync + 'static,
    {
        Self {
            key,
            unit: None,
            category: ProjectionCategory::Measurement,
            enabled_by_default: true,
            extract: Box::new(extract),
        }
    }

    pub fn unit(mut self, unit: &'static str) -> Self {
        self.unit = Some(unit);
        self
    }

    pub fn category(mut self, category: ProjectionCategory) -> Self {
        self.category = category;
        self
    }

    pub fn disabled_by_default(mut self) -> Self {
        self.enabled_by_default = false;
        self
    }

    pub fn value(&self, source: &T) -> Option<ProjectedValue> {
        (self.extract)(source)
    }
}

impl<T> fmt::Debug for Projection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Projection")
            .field("key", &self.key)
            .field("unit", &self.unit)
            .field("category", &self.category)
            .field("enabled_by_default", &self.enabled_by_default)
            .finish()
    }
}

/// Evaluate every projection in `table` against `source`
pub fn project_all<'a, T>(
    table: &'a [Projection<T>],
    source: &T,
) -> Vec<(&'a Projection<T>, Option<ProjectedValue>)> {
    table.iter().map(|p| (p, p.value(source))).collect()
}

/// Human-readable running state for inverter state codes 160-170
pub fn running_state_label(code: &str) -> &'static str {
    match code.trim() {
        "160" => "Self test",
        "161" => "Waiting",
        "162" => "Checking",
        "163" => "On grid",
        "164" => "Off grid",
        "165" => "Fault",
        "166" => "Permanent fault",
        "167" => "Standby",
        "168" => "Upgrading",
        "169" => "Factory test",
        "170" => "Illegal",
        _ => "unknown",
    }
}

// (variable, unit, enabled by default)
const REALTIME_VARIABLES: &[(&str, Option<&str>, bool)] = &[
    ("pvPower", Some("kW"), true),
    ("pv1Volt", Some("V"), false),
    ("pv1Current", Some("A"), false),
    ("pv1Power", Some("kW"), false),
    ("pv2Volt", Some("V"), false),
    ("pv2Current", Some("A"), false),
    ("pv2Power", Some("kW"), false),
    ("pv3Volt", Some("V"), false),
    ("pv3Current", Some("A"), false),
    ("pv3Power", Some("kW"), false),
    ("pv4Volt", Some("V"), false),
    ("pv4Current", Some("A"), false),
    ("pv4Power", Some("kW"), false),
    ("epsPower", Some("kW"), true),
    ("epsCurrentR", Some("A"), false),
    ("epsVoltR", Some("V"), false),
    ("epsPowerR", Some("kW"), false),
    ("RCurrent", Some("A"), false),
    ("RVolt", Some("V"), true),
    ("RFreq", Some("Hz"), true),
    ("RPower", Some("kW"), false),
    ("ambientTemperation", Some("°C"), true),
    ("invTemperation", Some("°C"), true),
    ("batTemperature", Some("°C"), true),
    ("loadsPower", Some("kW"), true),
    ("generationPower", Some("kW"), true),
    ("feedinPower", Some("kW"), true),
    ("gridConsumptionPower", Some("kW"), true),
    ("invBatVolt", Some("V"), false),
    ("invBatCurrent", Some("A"), false),
    ("invBatPower", Some("kW"), false),
    ("batChargePower", Some("kW"), true),
    ("batDischargePower", Some("kW"), true),
    ("batVolt", Some("V"), true),
    ("batCurrent", Some("A"), true),
    ("meterPower", Some("kW"), true),
    ("meterPower2", Some("kW"), false),
    ("SoC", Some("%"), true),
    ("generation", Some("kWh"), true),
    ("ResidualEnergy", Some("kWh"), true),
    ("batStatus", None, true),
    ("batStatusV2", None, true),
    ("currentFaultCount", Some("faults"), true),
    ("energyThroughput", Some("kWh"), true),
    ("SOH", Some("%"), true),
    ("gridConsumption", Some("kWh"), true),
    ("loads", Some("kWh"), true),
    ("feedin", Some("kWh"), true),
    ("chargeEnergyToTal", Some("kWh"), true),
    ("dischargeEnergyToTal", Some("kWh"), true),
    ("PVEnergyTotal", Some("kWh"), true),
];

/// Sensors over the real-time snapshot
pub fn realtime_projections() -> Vec<Projection<RealTimeSnapshot>> {
    let mut table: Vec<Projection<RealTimeSnapshot>> = REALTIME_VARIABLES
        .iter()
        .map(|&(variable, unit, enabled)| {
            let mut projection = Projection::new(variable, move |snap: &RealTimeSnapshot| {
                snap.value(variable).map(ProjectedValue::from)
            });
            if let Some(unit) = unit {
                projection = projection.unit(unit);
            }
            if !enabled {
                projection = projection.disabled_by_default();
            }
            projection
        })
        .collect();

    table.push(
        Projection::new("runningState", |snap: &RealTimeSnapshot| {
            snap.value("runningState")
                .map(|raw| ProjectedValue::Text(running_state_label(&raw.to_string()).to_string()))
        })
        .category(ProjectionCategory::Diagnostic),
    );
    table.push(
        Projection::new("lastUpdateTime", |snap: &RealTimeSnapshot| {
            snap.timestamp()
                .map(|ts| ProjectedValue::Text(ts.to_rfc3339()))
        })
        .category(ProjectionCategory::Diagnostic),
    );
    table
}

/// Diagnostics over the device detail
pub fn detail_projections() -> Vec<Projection<InverterDetail>> {
    vec![
        Projection::new("deviceDetail", |detail: &InverterDetail| {
            detail
                .connect_status
                .clone()
                .or_else(|| detail.status.map(|s| s.to_string()))
                .map(ProjectedValue::Text)
        })
        .category(ProjectionCategory::Diagnostic),
        Projection::new("inverterCapacity", |detail: &InverterDetail| {
            detail.capacity.map(ProjectedValue::Number)
        })
        .unit("kW")
        .category(ProjectionCategory::Diagnostic),
        Projection::new("batteryCapacityTotal", |detail: &InverterDetail| {
            detail.battery_capacity_kwh().map(ProjectedValue::Number)
        })
        .unit("kWh")
        .category(ProjectionCategory::Diagnostic),
    ]
}

/// Editable fields of the staged scheduler view
pub fn scheduler_projections() -> Vec<Projection<SchedulerInfo>> {
    use ProjectionCategory::Config;

    vec![
        Projection::new("schedulerEnable", |info: &SchedulerInfo| {
            Some(ProjectedValue::Bool(info.is_enabled()))
        })
        .category(Config),
        Projection::new("groupEnable", |info: &SchedulerInfo| {
            info.first_group()
                .map(|g| ProjectedValue::Bool(g.is_enabled()))
        })
        .category(Config),
        Projection::new("startTime", |info: &SchedulerInfo| {
            info.first_group().map(|g| {
                ProjectedValue::Text(format!("{:02}:{:02}", g.start_hour, g.start_minute))
            })
        })
        .category(Config),
        Projection::new("endTime", |info: &SchedulerInfo| {
            info.first_group()
                .map(|g| ProjectedValue::Text(format!("{:02}:{:02}", g.end_hour, g.end_minute)))
        })
        .category(Config),
        Projection::new("workMode", |info: &SchedulerInfo| {
            info.first_group()
                .map(|g| ProjectedValue::Text(g.work_mode.clone()))
        })
        .category(Config),
        Projection::new("minSocOnGrid", |info: &SchedulerInfo| {
            info.first_group()
                .map(|g| ProjectedValue::Number(g.min_soc_on_grid as f64))
        })
        .unit("%")
        .category(Config),
        Projection::new("fdSoc", |info: &SchedulerInfo| {
            info.first_group()
                .map(|g| ProjectedValue::Number(g.fd_soc as f64))
        })
        .unit("%")
        .category(Config),
        Projection::new("fdPwr", |info: &SchedulerInfo| {
            info.first_group().map(|g| ProjectedValue::Number(g.fd_pwr))
        })
        .unit("W")
        .category(Config),
        Projection::new("maxSoc", |info: &SchedulerInfo| {
            info.first_group()
                .map(|g| ProjectedValue::Number(g.max_soc as f64))
        })
        .unit("%")
        .category(Config),
    ]
}

/// Rolling 24h call count
pub fn api_call_projection() -> Projection<ApiCallTracker> {
    Projection::new("apiCallCount", |tracker: &ApiCallTracker| {
        Some(ProjectedValue::Number(tracker.count_last_24h() as f64))
    })
    .unit("calls")
    .category(ProjectionCategory::Diagnostic)
}

/// Bounds for a numeric field a host lets the user edit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumberRange {
    pub key: &'static str,
    pub unit: Option<&'static str>,
    pub min: f64,
    pub max: f64,
}

impl NumberRange {
    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }

    fn check(&self, value: Option<f64>) -> Result<()> {
        match value {
            Some(v) if self.contains(v) => Ok(()),
            _ => Err(FoxessError::validation(
                self.key.to_string(),
                format!("Must be a number between {} and {}", self.min, self.max),
            )),
        }
    }
}

/// Editable device settings (canonical setting keys)
pub const SETTING_NUMBERS: [NumberRange; 4] = [
    NumberRange {
        key: "ExportLimit",
        unit: None,
        min: 0.0,
        max: 30000.0,
    },
    NumberRange {
        key: "MinSoc",
        unit: Some("%"),
        min: 0.0,
        max: 100.0,
    },
    NumberRange {
        key: "MinSocOnGrid",
        unit: Some("%"),
        min: 0.0,
        max: 100.0,
    },
    NumberRange {
        key: "MaxSoc",
        unit: Some("%"),
        min: 0.0,
        max: 100.0,
    },
];

/// Editable numeric fields of the staged scheduler group
pub const SCHEDULER_NUMBERS: [NumberRange; 4] = [
    NumberRange {
        key: "min_soc_on_grid",
        unit: Some("%"),
        min: 0.0,
        max: 100.0,
    },
    NumberRange {
        key: "fd_soc",
        unit: Some("%"),
        min: 0.0,
        max: 100.0,
    },
    NumberRange {
        key: "fd_pwr",
        unit: Some("W"),
        min: 0.0,
        max: 30000.0,
    },
    NumberRange {
        key: "max_soc",
        unit: Some("%"),
        min: 0.0,
        max: 100.0,
    },
];

/// Look up the editable range for a canonical setting key
pub fn setting_range(key: &str) -> Option<&'static NumberRange> {
    SETTING_NUMBERS.iter().find(|range| range.key == key)
}

/// Reject a setting value outside its editable range
///
/// Keys without a numeric range (work mode, grid code, ...) pass unchecked.
pub fn check_setting_value(key: &str, value: &ScalarValue) -> Result<()> {
    match setting_range(canonical_setting_key(key)?) {
        Some(range) => range.check(value.as_f64()),
        None => Ok(()),
    }
}

/// Reject a value for one scheduler group field outside its range
pub fn check_scheduler_number(key: &str, value: f64) -> Result<()> {
    match SCHEDULER_NUMBERS.iter().find(|range| range.key == key) {
        Some(range) => range.check(Some(value)),
        None => Ok(()),
    }
}

/// Reject a scheduler group whose numeric fields are out of range
pub fn check_group_numbers(group: &ScheduleGroup) -> Result<()> {
    check_scheduler_number("min_soc_on_grid", group.min_soc_on_grid as f64)?;
    check_scheduler_number("fd_soc", group.fd_soc as f64)?;
    check_scheduler_number("fd_pwr", group.fd_pwr)?;
    check_scheduler_number("max_soc", group.max_soc as f64)
}

/// Device registry entry for the inverter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub identifier: String,
    pub name: String,
    pub manufacturer: &'static str,
    pub model: Option<String>,
    pub sw_version: Option<String>,
    pub hw_version: Option<String>,
    pub serial_number: String,
}

impl DeviceInfo {
    /// Build from detail when available; without it only the serial is known
    pub fn from_detail(device_sn: &str, name: &str, detail: Option<&InverterDetail>) -> Self {
        let model = detail.and_then(|d| d.device_type.clone().or_else(|| d.product_type.clone()));
        let sw_version = detail.and_then(|d| {
            d.manager_version
                .clone()
                .or_else(|| d.master_version.clone())
                .or_else(|| d.slave_version.clone())
        });
        let hw_version = detail.and_then(|d| d.hardware_version.clone());
        Self {
            identifier: device_sn.to_string(),
            name: name.to_string(),
            manufacturer: MANUFACTURER,
            model,
            sw_version,
            hw_version,
            serial_number: device_sn.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::RealTimeData;
    use serde_json::json;

    fn snapshot() -> RealTimeSnapshot {
        let data: RealTimeData = serde_json::from_value(json!({
            "deviceSN": "SN1",
            "time": "2025-12-03 15:54:06 AEDT+1100",
            "datas": [
                {"variable": "pvPower", "unit": "kW", "value": 2.5},
                {"variable": "runningState", "value": "163"},
                {"variable": "batStatus", "value": "Charging"}
            ]
        }))
        .unwrap();
        RealTimeSnapshot::from_realtime(data)
    }

    fn find<'a, T>(table: &'a [Projection<T>], key: &str) -> &'a Projection<T> {
        table.iter().find(|p| p.key == key).unwrap()
    }

    #[test]
    fn running_state_codes() {
        assert_eq!(running_state_label("163"), "On grid");
        assert_eq!(running_state_label("170"), "Illegal");
        assert_eq!(running_state_label("42"), "unknown");
    }

    #[test]
    fn realtime_table_reads_snapshot() {
        let table = realtime_projections();
        let snap = snapshot();

        let pv = find(&table, "pvPower");
        assert_eq!(pv.unit, Some("kW"));
        assert_eq!(pv.value(&snap), Some(ProjectedValue::Number(2.5)));

        assert!(!find(&table, "pv1Volt").enabled_by_default);
        assert_eq!(find(&table, "SoC").value(&snap), None);
        assert_eq!(
            find(&table, "batStatus").value(&snap),
            Some(ProjectedValue::Text("Charging".to_string()))
        );

        let state = find(&table, "runningState");
        assert_eq!(state.category, ProjectionCategory::Diagnostic);
        assert_eq!(
            state.value(&snap),
            Some(ProjectedValue::Text("On grid".to_string()))
        );

        assert_eq!(
            find(&table, "lastUpdateTime").value(&snap),
            Some(ProjectedValue::Text("2025-12-03T15:54:06+11:00".to_string()))
        );
    }

    #[test]
    fn detail_table() {
        let detail: InverterDetail = serde_json::from_value(json!({
            "deviceSN": "SN1",
            "status": 1,
            "capacity": 5.0,
            "batteryList": [{"batterySN": "B1", "capacity": 10360}]
        }))
        .unwrap();
        let values: Vec<_> = project_all(&detail_projections(), &detail)
            .into_iter()
            .map(|(p, v)| (p.key, v))
            .collect();
        assert_eq!(
            values,
            vec![
                ("deviceDetail", Some(ProjectedValue::Text("1".to_string()))),
                ("inverterCapacity", Some(ProjectedValue::Number(5.0))),
                ("batteryCapacityTotal", Some(ProjectedValue::Number(10.36))),
            ]
        );
    }

    #[test]
    fn scheduler_table() {
        let info = SchedulerInfo {
            enable: 1,
            groups: vec![ScheduleGroup {
                enable: 1,
                start_hour: 2,
                start_minute: 5,
                end_hour: 6,
                end_minute: 0,
                work_mode: "ForceCharge".to_string(),
                ..ScheduleGroup::default()
            }],
        };
        let table = scheduler_projections();
        assert!(table.iter().all(|p| p.category == ProjectionCategory::Config));
        assert_eq!(
            find(&table, "startTime").value(&info),
            Some(ProjectedValue::Text("02:05".to_string()))
        );
        assert_eq!(
            find(&table, "fdPwr").value(&info),
            Some(ProjectedValue::Number(10000.0))
        );
        assert_eq!(
            find(&table, "schedulerEnable").value(&info),
            Some(ProjectedValue::Bool(true))
        );
    }

    #[test]
    fn number_ranges() {
        assert!(setting_range("MinSoc").unwrap().contains(10.0));
        assert!(!setting_range("MaxSoc").unwrap().contains(101.0));
        assert!(setting_range("WorkMode").is_none());
        assert!(SCHEDULER_NUMBERS.iter().any(|r| r.key == "fd_pwr" && r.max == 30000.0));
    }

    #[test]
    fn setting_values_are_range_checked() {
        assert!(check_setting_value("min_soc", &ScalarValue::Int(10)).is_ok());
        assert!(check_setting_value("ExportLimit", &ScalarValue::Text("5000".into())).is_ok());
        assert!(check_setting_value("WorkMode", &ScalarValue::Text("SelfUse".into())).is_ok());

        let err = check_setting_value("max-soc", &ScalarValue::Int(101)).unwrap_err();
        assert!(matches!(err, FoxessError::Validation { ref field, .. } if field == "MaxSoc"));
        assert!(check_setting_value("MinSoc", &ScalarValue::Text("low".into())).is_err());
        assert!(check_setting_value("bogus", &ScalarValue::Int(1)).is_err());
    }

    #[test]
    fn group_numbers_are_range_checked() {
        assert!(check_group_numbers(&ScheduleGroup::default()).is_ok());

        let group = ScheduleGroup {
            fd_pwr: 40000.0,
            ..ScheduleGroup::default()
        };
        let err = check_group_numbers(&group).unwrap_err();
        assert!(matches!(err, FoxessError::Validation { ref field, .. } if field == "fd_pwr"));

        let group = ScheduleGroup {
            min_soc_on_grid: -1,
            ..ScheduleGroup::default()
        };
        assert!(check_group_numbers(&group).is_err());
    }

    #[test]
    fn device_info_from_detail() {
        let detail: InverterDetail = serde_json::from_value(json!({
            "deviceSN": "SN1",
            "productType": "H3",
            "masterVersion": "1.20",
            "slaveVersion": "1.02",
            "hardwareVersion": "A"
        }))
        .unwrap();
        let info = DeviceInfo::from_detail("SN1", "Garage", Some(&detail));
        assert_eq!(info.manufacturer, "FoxESS");
        assert_eq!(info.model.as_deref(), Some("H3"));
        assert_eq!(info.sw_version.as_deref(), Some("1.20"));
        assert_eq!(info.hw_version.as_deref(), Some("A"));

        let bare = DeviceInfo::from_detail("SN1", "SN1", None);
        assert!(bare.model.is_none());
    }
}
