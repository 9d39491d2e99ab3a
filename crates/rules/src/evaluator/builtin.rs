//! Leaf evaluators for the built-in condition types.

use std::cmp::Ordering;
use std::sync::Arc;

use serde_json::Value;

use super::{CustomEvaluator, EvaluationError, EvaluationScope, Evaluator};
use crate::schema::{AttendanceStatus, CompareOp};

pub(super) struct AlwaysTrue;

impl Evaluator for AlwaysTrue {
    fn evaluate(&self, _scope: &EvaluationScope<'_>) -> Result<bool, EvaluationError> {
        Ok(true)
    }
}

pub(super) enum PunchCheck {
    Late,
    EarlyLeave,
    Absent,
}

impl Evaluator for PunchCheck {
    fn evaluate(&self, scope: &EvaluationScope<'_>) -> Result<bool, EvaluationError> {
        let record = scope.context.record();
        match self {
            Self::Late => Ok(scope.calculus.is_late(&record, scope.policy_for("late")?)),
            Self::EarlyLeave => Ok(scope.calculus.is_early_leave(&record, scope.policy_for("early_leave")?)),
            Self::Absent => Ok(record.punch_in.is_none() && record.punch_out.is_none()),
        }
    }
}

pub(super) struct StatusIn {
    pub(super) statuses: Vec<AttendanceStatus>,
}

impl Evaluator for StatusIn {
    fn evaluate(&self, scope: &EvaluationScope<'_>) -> Result<bool, EvaluationError> {
        let policy = scope.policy_for("attendance_status")?;
        let status = scope.calculus.attendance_status(&scope.context.record(), policy);
        Ok(self.statuses.contains(&status))
    }
}

/// Some overtime, and at least `min_hours` of it.
pub(super) struct OvertimeAtLeast {
    pub(super) min_hours: f64,
}

impl Evaluator for OvertimeAtLeast {
    fn evaluate(&self, scope: &EvaluationScope<'_>) -> Result<bool, EvaluationError> {
        let policy = scope.policy_for("overtime")?;
        let overtime = scope.calculus.overtime_hours(&scope.context.record(), policy);
        Ok(overtime > 0.0 && overtime >= self.min_hours)
    }
}

pub(super) struct WorkHoursBelow {
    pub(super) hours: f64,
}

impl Evaluator for WorkHoursBelow {
    fn evaluate(&self, scope: &EvaluationScope<'_>) -> Result<bool, EvaluationError> {
        let policy = scope.policy_for("work_hours_below")?;
        Ok(scope.calculus.work_hours(&scope.context.record(), policy) < self.hours)
    }
}

/// Punch location outside every authorized site. Never fires when the
/// policy does not require a location.
pub(super) struct OutsideGeofence;

impl Evaluator for OutsideGeofence {
    fn evaluate(&self, scope: &EvaluationScope<'_>) -> Result<bool, EvaluationError> {
        let policy = scope.policy_for("outside_geofence")?;
        if !policy.location_required {
            return Ok(false);
        }
        let ctx = scope.context;
        Ok(!scope
            .calculus
            .validate_location(ctx.user_id, ctx.latitude, ctx.longitude, policy.max_distance_meters))
    }
}

/// Punch device not bound to the user. A policy with `device_required:
/// false` disables the check; without a policy the check always runs.
pub(super) struct UnauthorizedDevice;

impl Evaluator for UnauthorizedDevice {
    fn evaluate(&self, scope: &EvaluationScope<'_>) -> Result<bool, EvaluationError> {
        if scope.policy.is_some_and(|p| !p.device_required) {
            return Ok(false);
        }
        let ctx = scope.context;
        Ok(!scope.calculus.validate_device(ctx.user_id, ctx.device_id.as_deref()))
    }
}

pub(super) struct NonWorkingDay;

impl Evaluator for NonWorkingDay {
    fn evaluate(&self, scope: &EvaluationScope<'_>) -> Result<bool, EvaluationError> {
        let ctx = scope.context;
        Ok(!scope.calculus.is_working_day(ctx.user_id, ctx.attendance_date))
    }
}

pub(super) struct FieldCompare {
    pub(super) field: String,
    pub(super) op: CompareOp,
    pub(super) value: Value,
}

impl Evaluator for FieldCompare {
    fn evaluate(&self, scope: &EvaluationScope<'_>) -> Result<bool, EvaluationError> {
        Ok(match scope.context.field(&self.field) {
            Some(actual) => compare_values(&actual, self.op, &self.value),
            None => false,
        })
    }
}

/// Compare two JSON values.
///
/// Numbers compare numerically, strings lexically; equality on anything
/// else is structural. Ordering operators on mismatched or non-scalar
/// values are false.
pub fn compare_values(actual: &Value, op: CompareOp, expected: &Value) -> bool {
    match op {
        CompareOp::Eq => values_equal(actual, expected),
        CompareOp::Ne => !values_equal(actual, expected),
        CompareOp::Gt => ordering(actual, expected) == Some(Ordering::Greater),
        CompareOp::Gte => matches!(ordering(actual, expected), Some(Ordering::Greater | Ordering::Equal)),
        CompareOp::Lt => ordering(actual, expected) == Some(Ordering::Less),
        CompareOp::Lte => matches!(ordering(actual, expected), Some(Ordering::Less | Ordering::Equal)),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn ordering(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

pub(super) struct CustomAdapter {
    pub(super) inner: Arc<dyn CustomEvaluator>,
    pub(super) params: Value,
}

impl Evaluator for CustomAdapter {
    fn evaluate(&self, scope: &EvaluationScope<'_>) -> Result<bool, EvaluationError> {
        self.inner.evaluate(&self.params, scope)
    }
}
