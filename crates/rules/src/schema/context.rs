//! Per-request input a rule is evaluated against.

use std::collections::BTreeMap;

use attend_core::{DepartmentId, UserId};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::time_format::hhmm_opt;

/// Named context fields a condition may declare as inputs. Anything else
/// is looked up in [`RuleExecutionContext::attributes`].
pub const CONTEXT_FIELDS: &[&str] = &[
    "user_id",
    "department_id",
    "attendance_date",
    "punch_in",
    "punch_out",
    "latitude",
    "longitude",
    "device_id",
];

/// Read-only evaluation input: who punched, when, where and on which device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleExecutionContext {
    pub user_id: UserId,
    #[serde(default)]
    pub department_id: Option<DepartmentId>,
    pub attendance_date: NaiveDate,
    #[serde(default, with = "hhmm_opt")]
    pub punch_in: Option<NaiveTime>,
    #[serde(default, with = "hhmm_opt")]
    pub punch_out: Option<NaiveTime>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub device_id: Option<String>,
    /// Free-form attributes (device status maps, workflow flags, ...).
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

impl RuleExecutionContext {
    pub fn new(user_id: UserId, attendance_date: NaiveDate) -> Self {
        Self {
            user_id,
            department_id: None,
            attendance_date,
            punch_in: None,
            punch_out: None,
            latitude: None,
            longitude: None,
            device_id: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_department(mut self, department_id: DepartmentId) -> Self {
        self.department_id = Some(department_id);
        self
    }

    pub fn with_punches(mut self, punch_in: Option<NaiveTime>, punch_out: Option<NaiveTime>) -> Self {
        self.punch_in = punch_in;
        self.punch_out = punch_out;
        self
    }

    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// The punch record slice of this context.
    pub fn record(&self) -> AttendanceRecord {
        AttendanceRecord {
            user_id: self.user_id,
            attendance_date: self.attendance_date,
            punch_in: self.punch_in,
            punch_out: self.punch_out,
        }
    }

    /// Resolve a field by name as JSON.
    ///
    /// Named fields come first; `attributes.<key>` and bare keys fall back
    /// to the attribute map. Times render as `HH:MM:SS` so that string
    /// comparison orders them chronologically.
    pub fn field(&self, name: &str) -> Option<Value> {
        match name {
            "user_id" => Some(Value::from(self.user_id)),
            "department_id" => self.department_id.map(Value::from),
            "attendance_date" => Some(Value::from(self.attendance_date.format("%Y-%m-%d").to_string())),
            "punch_in" => self.punch_in.map(|t| Value::from(t.format("%H:%M:%S").to_string())),
            "punch_out" => self.punch_out.map(|t| Value::from(t.format("%H:%M:%S").to_string())),
            "latitude" => self.latitude.map(Value::from),
            "longitude" => self.longitude.map(Value::from),
            "device_id" => self.device_id.clone().map(Value::from),
            other => {
                let key = other.strip_prefix("attributes.").unwrap_or(other);
                self.attributes.get(key).cloned()
            }
        }
    }
}

/// One user's punches for one day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttendanceRecord {
    pub user_id: UserId,
    pub attendance_date: NaiveDate,
    #[serde(default, with = "hhmm_opt")]
    pub punch_in: Option<NaiveTime>,
    #[serde(default, with = "hhmm_opt")]
    pub punch_out: Option<NaiveTime>,
}

impl AttendanceRecord {
    pub fn new(
        user_id: UserId,
        attendance_date: NaiveDate,
        punch_in: Option<NaiveTime>,
        punch_out: Option<NaiveTime>,
    ) -> Self {
        Self { user_id, attendance_date, punch_in, punch_out }
    }
}
