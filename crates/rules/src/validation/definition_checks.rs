use attend_core::RuleId;

use crate::schema::{AttendancePolicy, RuleDefinition, RuleScope};

use super::ValidationResult;

/// Longest grace period accepted, in minutes.
const MAX_GRACE_MINUTES: u32 = 12 * 60;

pub(super) fn check_definition(rule_id: RuleId, definition: &RuleDefinition, result: &mut ValidationResult) {
    if definition.id != rule_id {
        result.error("id", format!("store returned rule {} for id {rule_id}", definition.id));
    }
    if !definition.enabled {
        result.error("enabled", format!("rule {rule_id} is disabled"));
    }
    if definition.name.trim().is_empty() {
        result.error("name", "must not be empty");
    }
    if definition.category.trim().is_empty() {
        result.error("category", "must not be empty");
    }
    if let Some(policy) = &definition.policy {
        check_policy(policy, result);
    }
    check_scope(&definition.scope, result);
}

fn check_policy(policy: &AttendancePolicy, result: &mut ValidationResult) {
    if policy.work_start == policy.work_end {
        result.error("policy.work_end", "must differ from work_start");
    }
    match (policy.break_start, policy.break_end) {
        (Some(start), Some(end)) if start == end => {
            result.warn("policy.break_end", "break has zero length");
        }
        (Some(_), None) | (None, Some(_)) => {
            result.warn("policy", "only one break bound set, break is ignored");
        }
        _ => {}
    }
    if policy.late_grace_minutes > MAX_GRACE_MINUTES {
        result.error("policy.late_grace_minutes", format!("must be at most {MAX_GRACE_MINUTES}"));
    }
    if policy.early_leave_grace_minutes > MAX_GRACE_MINUTES {
        result.error("policy.early_leave_grace_minutes", format!("must be at most {MAX_GRACE_MINUTES}"));
    }
    if !policy.max_distance_meters.is_finite() || policy.max_distance_meters <= 0.0 {
        result.error("policy.max_distance_meters", "must be a positive distance");
    }
}

fn check_scope(scope: &RuleScope, result: &mut ValidationResult) {
    if let (Some(start), Some(end)) = (scope.start_date, scope.end_date) {
        if start > end {
            result.error("scope.end_date", format!("{end} is before start_date {start}"));
        }
    }
}
