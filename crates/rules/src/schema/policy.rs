//! Attendance policy consumed by the time calculus.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use super::time_format::{hhmm, hhmm_opt};

/// Default geofence radius when a policy does not set one.
pub const DEFAULT_MAX_DISTANCE_METERS: f64 = 100.0;

/// Shift definition and tolerances a rule evaluates punches against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AttendancePolicy {
    #[serde(with = "hhmm")]
    pub work_start: NaiveTime,
    #[serde(with = "hhmm")]
    pub work_end: NaiveTime,
    #[serde(default, with = "hhmm_opt", skip_serializing_if = "Option::is_none")]
    pub break_start: Option<NaiveTime>,
    #[serde(default, with = "hhmm_opt", skip_serializing_if = "Option::is_none")]
    pub break_end: Option<NaiveTime>,
    #[serde(default)]
    pub location_required: bool,
    #[serde(default)]
    pub device_required: bool,
    #[serde(default = "default_max_distance")]
    pub max_distance_meters: f64,
    #[serde(default)]
    pub late_grace_minutes: u32,
    #[serde(default)]
    pub early_leave_grace_minutes: u32,
}

fn default_max_distance() -> f64 {
    DEFAULT_MAX_DISTANCE_METERS
}

impl AttendancePolicy {
    /// A policy with the given shift and no break, grace or checks.
    pub fn shift(work_start: NaiveTime, work_end: NaiveTime) -> Self {
        Self {
            work_start,
            work_end,
            break_start: None,
            break_end: None,
            location_required: false,
            device_required: false,
            max_distance_meters: DEFAULT_MAX_DISTANCE_METERS,
            late_grace_minutes: 0,
            early_leave_grace_minutes: 0,
        }
    }

    pub fn with_break(mut self, start: NaiveTime, end: NaiveTime) -> Self {
        self.break_start = Some(start);
        self.break_end = Some(end);
        self
    }

    pub fn with_grace(mut self, late_minutes: u32, early_leave_minutes: u32) -> Self {
        self.late_grace_minutes = late_minutes;
        self.early_leave_grace_minutes = early_leave_minutes;
        self
    }

    /// Both break bounds, when configured.
    pub fn break_window(&self) -> Option<(NaiveTime, NaiveTime)> {
        self.break_start.zip(self.break_end)
    }
}
