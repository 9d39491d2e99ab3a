//! Condition map decoding and parameter checks.

use serde_json::Value;

use crate::schema::{CompareOp, ConditionConfig, CONDITION_TYPES};

use super::{suggest, type_tag, unknown_type, ValidationResult};

/// Decode and check a condition map. `null` means "always".
///
/// Returns the decoded condition when it is structurally sound; parameter
/// problems are recorded in `result` either way.
pub fn check_condition(value: &Value, custom: &[String], result: &mut ValidationResult) -> Option<ConditionConfig> {
    if value.is_null() {
        return Some(ConditionConfig::Always);
    }

    let errors_before = result.errors.len();
    check_tags(value, "condition", result);
    if result.errors.len() > errors_before {
        return None;
    }

    let condition: ConditionConfig = match serde_json::from_value(value.clone()) {
        Ok(c) => c,
        Err(e) => {
            result.error("condition", format!("invalid condition: {e}"));
            return None;
        }
    };
    check_params(&condition, "condition", custom, result);
    Some(condition)
}

/// Walk nested condition maps checking every `type` tag is known.
fn check_tags(value: &Value, path: &str, result: &mut ValidationResult) {
    let Some(tag) = type_tag(value, path, result) else {
        return;
    };
    match tag {
        "all" | "any" => {
            if let Some(children) = value.get("conditions").and_then(Value::as_array) {
                for (i, child) in children.iter().enumerate() {
                    check_tags(child, &format!("{path}.conditions[{i}]"), result);
                }
            }
        }
        "not" => {
            if let Some(child) = value.get("condition") {
                check_tags(child, &format!("{path}.condition"), result);
            }
        }
        known if CONDITION_TYPES.contains(&known) => {}
        unknown => unknown_type(unknown, CONDITION_TYPES, path, "condition", result),
    }
}

fn check_params(condition: &ConditionConfig, path: &str, custom: &[String], result: &mut ValidationResult) {
    match condition {
        ConditionConfig::AttendanceStatus { any_of } if any_of.is_empty() => {
            result.error(format!("{path}.any_of"), "must list at least one status");
        }
        ConditionConfig::Overtime { min_hours } if !min_hours.is_finite() || *min_hours < 0.0 => {
            result.error(format!("{path}.min_hours"), "must be zero or more hours");
        }
        ConditionConfig::WorkHoursBelow { hours } if !hours.is_finite() || *hours <= 0.0 => {
            result.error(format!("{path}.hours"), "must be a positive number of hours");
        }
        ConditionConfig::Compare { field, op, value } => {
            if field.trim().is_empty() {
                result.error(format!("{path}.field"), "must not be empty");
            }
            let ordered = matches!(op, CompareOp::Gt | CompareOp::Gte | CompareOp::Lt | CompareOp::Lte);
            if ordered && !(value.is_number() || value.is_string()) {
                result.error(format!("{path}.value"), "ordering comparisons need a number or string");
            }
        }
        ConditionConfig::All { conditions } | ConditionConfig::Any { conditions } => {
            if conditions.is_empty() {
                result.error(format!("{path}.conditions"), "must contain at least one condition");
            }
            for (i, child) in conditions.iter().enumerate() {
                check_params(child, &format!("{path}.conditions[{i}]"), custom, result);
            }
        }
        ConditionConfig::Not { condition } => {
            check_params(condition, &format!("{path}.condition"), custom, result);
        }
        ConditionConfig::Custom { evaluator, .. } if !custom.iter().any(|c| c == evaluator) => {
            let names: Vec<&str> = custom.iter().map(String::as_str).collect();
            let message = format!("no evaluator registered as '{evaluator}'");
            match suggest::closest(evaluator, &names) {
                Some(s) => result.error_with_suggestion(format!("{path}.evaluator"), message, s),
                None => result.error(format!("{path}.evaluator"), message),
            }
        }
        _ => {}
    }
}
