//! Closed set of condition types a rule can declare.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::result::AttendanceStatus;

/// Condition half of a rule, decoded from the rule's opaque `condition` map.
///
/// Leaf conditions test one attendance predicate; `all`/`any`/`not` compose
/// them recursively. `custom` dispatches to an evaluator registered by name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionConfig {
    Always,
    AttendanceStatus {
        any_of: Vec<AttendanceStatus>,
    },
    Late,
    EarlyLeave,
    Absent,
    Overtime {
        #[serde(default)]
        min_hours: f64,
    },
    WorkHoursBelow {
        hours: f64,
    },
    OutsideGeofence,
    UnauthorizedDevice,
    NonWorkingDay,
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    All {
        conditions: Vec<ConditionConfig>,
    },
    Any {
        conditions: Vec<ConditionConfig>,
    },
    Not {
        condition: Box<ConditionConfig>,
    },
    Custom {
        evaluator: String,
        #[serde(default)]
        params: Value,
        /// Context fields the evaluator reads. Unset means the whole context.
        #[serde(default)]
        inputs: Option<Vec<String>>,
    },
}

/// Comparison operators for `compare` conditions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Every `type` tag accepted in a condition map.
pub const CONDITION_TYPES: &[&str] = &[
    "always",
    "attendance_status",
    "late",
    "early_leave",
    "absent",
    "overtime",
    "work_hours_below",
    "outside_geofence",
    "unauthorized_device",
    "non_working_day",
    "compare",
    "all",
    "any",
    "not",
    "custom",
];

fn fields(names: &[&str]) -> Option<BTreeSet<String>> {
    Some(names.iter().map(|n| n.to_string()).collect())
}

impl ConditionConfig {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::AttendanceStatus { .. } => "attendance_status",
            Self::Late => "late",
            Self::EarlyLeave => "early_leave",
            Self::Absent => "absent",
            Self::Overtime { .. } => "overtime",
            Self::WorkHoursBelow { .. } => "work_hours_below",
            Self::OutsideGeofence => "outside_geofence",
            Self::UnauthorizedDevice => "unauthorized_device",
            Self::NonWorkingDay => "non_working_day",
            Self::Compare { .. } => "compare",
            Self::All { .. } => "all",
            Self::Any { .. } => "any",
            Self::Not { .. } => "not",
            Self::Custom { .. } => "custom",
        }
    }

    /// Context fields this condition reads. `None` means the whole context.
    pub fn declared_inputs(&self) -> Option<BTreeSet<String>> {
        match self {
            Self::Always => Some(BTreeSet::new()),
            Self::Late => fields(&["punch_in"]),
            Self::EarlyLeave | Self::Overtime { .. } => fields(&["punch_out"]),
            Self::AttendanceStatus { .. } | Self::Absent | Self::WorkHoursBelow { .. } => {
                fields(&["punch_in", "punch_out"])
            }
            Self::OutsideGeofence => fields(&["user_id", "latitude", "longitude"]),
            Self::UnauthorizedDevice => fields(&["user_id", "device_id"]),
            Self::NonWorkingDay => fields(&["user_id", "attendance_date"]),
            Self::Compare { field, .. } => Some(BTreeSet::from([field.clone()])),
            Self::All { conditions } | Self::Any { conditions } => {
                union_all(conditions.iter().map(ConditionConfig::declared_inputs))
            }
            Self::Not { condition } => condition.declared_inputs(),
            Self::Custom { inputs, .. } => inputs.as_ref().map(|list| list.iter().cloned().collect()),
        }
    }

    /// Whether any leaf needs the rule's attendance policy.
    pub fn needs_policy(&self) -> bool {
        match self {
            Self::AttendanceStatus { .. }
            | Self::Late
            | Self::EarlyLeave
            | Self::Overtime { .. }
            | Self::WorkHoursBelow { .. }
            | Self::OutsideGeofence => true,
            Self::All { conditions } | Self::Any { conditions } => {
                conditions.iter().any(ConditionConfig::needs_policy)
            }
            Self::Not { condition } => condition.needs_policy(),
            _ => false,
        }
    }
}

/// Union of input sets; any `None` widens the result to `None`.
pub(crate) fn union_all<I>(sets: I) -> Option<BTreeSet<String>>
where
    I: IntoIterator<Item = Option<BTreeSet<String>>>,
{
    let mut out = BTreeSet::new();
    for set in sets {
        out.extend(set?);
    }
    Some(out)
}
