//! Action map decoding and parameter checks.

use serde_json::Value;

use crate::alerting::TemplateRenderer;
use crate::schema::{ActionConfig, ACTION_TYPES};

use super::{suggest, type_tag, unknown_type, ValidationResult};

/// Decode and check an action map. `null` means "no action".
///
/// `custom` lists the handler names registered for `custom` actions.
pub fn check_action(value: &Value, custom: &[String], result: &mut ValidationResult) -> Option<ActionConfig> {
    if value.is_null() {
        return None;
    }

    let errors_before = result.errors.len();
    check_tags(value, "action", result);
    if result.errors.len() > errors_before {
        return None;
    }

    let action: ActionConfig = match serde_json::from_value(value.clone()) {
        Ok(a) => a,
        Err(e) => {
            result.error("action", format!("invalid action: {e}"));
            return None;
        }
    };
    let renderer = TemplateRenderer::new();
    check_params(&action, "action", custom, &renderer, result);
    Some(action)
}

fn check_tags(value: &Value, path: &str, result: &mut ValidationResult) {
    let Some(tag) = type_tag(value, path, result) else {
        return;
    };
    match tag {
        "sequence" => {
            if let Some(children) = value.get("actions").and_then(Value::as_array) {
                for (i, child) in children.iter().enumerate() {
                    check_tags(child, &format!("{path}.actions[{i}]"), result);
                }
            }
        }
        known if ACTION_TYPES.contains(&known) => {}
        unknown => unknown_type(unknown, ACTION_TYPES, path, "action", result),
    }
}

fn check_template(template: &str, path: String, renderer: &TemplateRenderer, result: &mut ValidationResult) {
    if template.trim().is_empty() {
        result.error(path, "must not be empty");
    } else if let Err(e) = renderer.validate(template) {
        result.error(path, e.to_string());
    }
}

fn check_params(
    action: &ActionConfig,
    path: &str,
    custom: &[String],
    renderer: &TemplateRenderer,
    result: &mut ValidationResult,
) {
    match action {
        ActionConfig::Classify => {}
        ActionConfig::Alert { message, .. } => {
            check_template(message, format!("{path}.message"), renderer, result);
        }
        ActionConfig::Notify { recipients, subject, body, .. } => {
            if recipients.is_empty() {
                result.error(format!("{path}.recipients"), "must list at least one recipient");
            }
            check_template(subject, format!("{path}.subject"), renderer, result);
            if let Some(body) = body {
                check_template(body, format!("{path}.body"), renderer, result);
            }
        }
        ActionConfig::Correction { reason, .. } => {
            if reason.as_deref().map_or(true, |r| r.trim().is_empty()) {
                result.warn(format!("{path}.reason"), "correction has no reason");
            }
        }
        ActionConfig::Log { message, .. } => {
            check_template(message, format!("{path}.message"), renderer, result);
        }
        ActionConfig::DeviceStatusCheck { attribute, normal_statuses, message, .. } => {
            if let Some(message) = message {
                check_template(message, format!("{path}.message"), renderer, result);
            }
            if attribute.trim().is_empty() {
                result.error(format!("{path}.attribute"), "must not be empty");
            }
            if normal_statuses.is_empty() {
                result.warn(format!("{path}.normal_statuses"), "no normal status, every device will alert");
            }
        }
        ActionConfig::Sequence { actions } => {
            if actions.is_empty() {
                result.warn(format!("{path}.actions"), "empty sequence does nothing");
            }
            for (i, child) in actions.iter().enumerate() {
                check_params(child, &format!("{path}.actions[{i}]"), custom, renderer, result);
            }
        }
        ActionConfig::Custom { handler, .. } => {
            if !custom.iter().any(|c| c == handler) {
                let names: Vec<&str> = custom.iter().map(String::as_str).collect();
                let message = format!("no action handler registered as '{handler}'");
                match suggest::closest(handler, &names) {
                    Some(s) => result.error_with_suggestion(format!("{path}.handler"), message, s),
                    None => result.error(format!("{path}.handler"), message),
                }
            }
        }
    }
}
