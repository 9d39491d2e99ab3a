//! Minijinja template rendering for alert and notification text.
//!
//! Templates are arbitrary strings taken from rule actions, so a fresh
//! [`minijinja::Environment`] is created per render call.

use std::collections::BTreeMap;

use attend_core::{DepartmentId, RuleId, UserId};
use serde::Serialize;
use serde_json::Value;

use crate::schema::{time_format, AttendanceOutcome, RuleExecutionContext};

#[derive(Debug, thiserror::Error)]
#[error("template error: {0}")]
pub struct TemplateError(pub String);

impl From<TemplateError> for super::NotifyError {
    fn from(e: TemplateError) -> Self {
        super::NotifyError::Template(e.0)
    }
}

/// Values available to action templates.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateContext {
    pub rule: RuleContext,
    pub user_id: UserId,
    pub department_id: Option<DepartmentId>,
    pub date: String,
    pub punch_in: Option<String>,
    pub punch_out: Option<String>,
    pub device_id: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub attributes: BTreeMap<String, Value>,
    /// Classification of the record, when the rule has a policy.
    pub outcome: Option<AttendanceOutcome>,
    /// Set while rendering a per-device alert.
    pub device: Option<DeviceContext>,
    pub now: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleContext {
    pub id: RuleId,
    pub name: String,
    pub category: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceContext {
    pub id: String,
    pub status: String,
}

impl TemplateContext {
    pub fn new(rule: RuleContext, ctx: &RuleExecutionContext, outcome: Option<AttendanceOutcome>) -> Self {
        Self {
            rule,
            user_id: ctx.user_id,
            department_id: ctx.department_id,
            date: ctx.attendance_date.format("%Y-%m-%d").to_string(),
            punch_in: ctx.punch_in.as_ref().map(time_format::render),
            punch_out: ctx.punch_out.as_ref().map(time_format::render),
            device_id: ctx.device_id.clone(),
            latitude: ctx.latitude,
            longitude: ctx.longitude,
            attributes: ctx.attributes.clone(),
            outcome,
            device: None,
            now: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn for_device(&self, id: &str, status: &str) -> Self {
        let mut scoped = self.clone();
        scoped.device = Some(DeviceContext { id: id.to_string(), status: status.to_string() });
        scoped
    }
}

/// Renders action templates using minijinja.
#[derive(Debug, Default)]
pub struct TemplateRenderer {
    _private: (),
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self { _private: () }
    }

    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();
        env.add_filter("round", round_filter);
        env.add_filter("lower", lower_filter);
        env.add_filter("upper", upper_filter);
        env
    }

    pub fn render(&self, template_str: &str, ctx: &TemplateContext) -> Result<String, TemplateError> {
        let env = Self::build_env();
        env.render_str(template_str, ctx).map_err(|e| TemplateError(e.to_string()))
    }

    /// Check that a template parses, without evaluating it.
    pub fn validate(&self, template_str: &str) -> Result<(), TemplateError> {
        let env = Self::build_env();
        env.template_from_str(template_str)
            .map_err(|e| TemplateError(e.to_string()))?;
        Ok(())
    }
}

/// Round a float to N decimal places.
fn round_filter(value: f64, decimals: Option<u32>) -> String {
    let n = decimals.unwrap_or(0);
    format!("{:.prec$}", value, prec = n as usize)
}

fn lower_filter(value: String) -> String {
    value.to_lowercase()
}

fn upper_filter(value: String) -> String {
    value.to_uppercase()
}
