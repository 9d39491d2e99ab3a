//! Rule validation with structured errors and suggestions.
//!
//! Checks that a rule exists, is enabled, and that its opaque condition
//! and action maps decode into known variants with sane parameters.
//! Successful validation yields a [`CompiledRule`]; failure yields a
//! [`ValidationResult`] with errors (blocking) and warnings (advisory).

mod action_checks;
mod condition_checks;
mod definition_checks;

mod suggest;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use attend_core::RuleId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::evaluator::EvaluatorFactory;
use crate::executor::RuleExecutor;
use crate::loader::RuleLoader;
use crate::schema::{ActionConfig, ConditionConfig, RuleDefinition};

pub use action_checks::check_action;
pub use condition_checks::check_condition;

// ── Result types ────────────────────────────────────────────────────

/// Overall validation outcome.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

/// A blocking validation error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationError {
    /// Path-like location, e.g. `"condition.conditions[1].type"`.
    pub path: String,
    pub message: String,
    /// Optional "Did you mean …?" suggestion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// A non-blocking advisory warning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self { valid: true, errors: Vec::new(), warnings: Vec::new() }
    }

    pub(crate) fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(ValidationError { path: path.into(), message: message.into(), suggestion: None });
    }

    pub(crate) fn error_with_suggestion(
        &mut self,
        path: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) {
        self.valid = false;
        self.errors.push(ValidationError {
            path: path.into(),
            message: message.into(),
            suggestion: Some(suggestion.into()),
        });
    }

    pub(crate) fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationWarning { path: path.into(), message: message.into() });
    }

    /// All errors on one line, or `None` when valid.
    pub fn error_message(&self) -> Option<String> {
        if self.errors.is_empty() {
            return None;
        }
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| {
                let located = if e.path.is_empty() { e.message.clone() } else { format!("{}: {}", e.path, e.message) };
                match &e.suggestion {
                    Some(s) => format!("{located} (did you mean '{s}'?)"),
                    None => located,
                }
            })
            .collect();
        Some(parts.join("; "))
    }
}

/// A rule whose condition and action have been decoded and checked.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub definition: RuleDefinition,
    pub condition: ConditionConfig,
    pub action: Option<ActionConfig>,
    pub warnings: Vec<ValidationWarning>,
}

// ── Validator ───────────────────────────────────────────────────────

/// Checks rules against the evaluators and action handlers registered
/// with this engine instance.
pub struct RuleValidator {
    loader: Arc<dyn RuleLoader>,
    evaluators: Arc<EvaluatorFactory>,
    executor: Arc<RuleExecutor>,
    store_timeout: Duration,
}

impl RuleValidator {
    pub fn new(
        loader: Arc<dyn RuleLoader>,
        evaluators: Arc<EvaluatorFactory>,
        executor: Arc<RuleExecutor>,
        store_timeout: Duration,
    ) -> Self {
        Self { loader, evaluators, executor, store_timeout }
    }

    /// Load a rule from the store and validate it.
    pub async fn validate_rule(&self, rule_id: RuleId) -> ValidationResult {
        match tokio::time::timeout(self.store_timeout, self.loader.load_rule_config(rule_id)).await {
            Ok(Ok(definition)) => self.validate(rule_id, definition.as_ref()),
            Ok(Err(e)) => {
                let mut result = ValidationResult::new();
                result.error("", format!("failed to load rule {rule_id}: {e}"));
                result
            }
            Err(_) => {
                let mut result = ValidationResult::new();
                result.error("", format!("loading rule {rule_id} timed out after {}ms", self.store_timeout.as_millis()));
                result
            }
        }
    }

    /// Validate an already loaded definition (`None` = not found).
    pub fn validate(&self, rule_id: RuleId, definition: Option<&RuleDefinition>) -> ValidationResult {
        match self.compile(rule_id, definition) {
            Ok(compiled) => ValidationResult { warnings: compiled.warnings, ..ValidationResult::new() },
            Err(result) => result,
        }
    }

    /// Validate and decode a definition for evaluation.
    pub fn compile(
        &self,
        rule_id: RuleId,
        definition: Option<&RuleDefinition>,
    ) -> Result<CompiledRule, ValidationResult> {
        let mut result = ValidationResult::new();
        let Some(definition) = definition else {
            result.error("id", format!("rule {rule_id} not found"));
            return Err(result);
        };

        definition_checks::check_definition(rule_id, definition, &mut result);

        let condition = check_condition(&definition.condition, &self.evaluators.custom_names(), &mut result);
        let action = check_action(&definition.action, &self.executor.custom_action_types(), &mut result);

        if definition.policy.is_none() {
            if let Some(c) = condition.as_ref().filter(|c| c.needs_policy()) {
                result.error("policy", format!("condition '{}' needs an attendance policy", c.type_name()));
            }
            if let Some(a) = action.as_ref().filter(|a| a.needs_policy()) {
                result.error("policy", format!("action '{}' needs an attendance policy", a.action_type()));
            }
        }

        match condition {
            Some(condition) if result.valid => Ok(CompiledRule {
                definition: definition.clone(),
                condition,
                action,
                warnings: result.warnings,
            }),
            _ => Err(result),
        }
    }
}

/// The `type` tag of a config map, or an error recorded at `path`.
pub(crate) fn type_tag<'a>(value: &'a Value, path: &str, result: &mut ValidationResult) -> Option<&'a str> {
    let Some(map) = value.as_object() else {
        result.error(path, "must be a map with a 'type' key");
        return None;
    };
    match map.get("type").and_then(Value::as_str) {
        Some(tag) => Some(tag),
        None => {
            result.error(format!("{path}.type"), "missing 'type'");
            None
        }
    }
}

/// Record an unknown type tag with the closest known one as suggestion.
pub(crate) fn unknown_type(tag: &str, known: &[&str], path: &str, what: &str, result: &mut ValidationResult) {
    let message = format!("unknown {what} type '{tag}'");
    match suggest::closest(tag, known) {
        Some(suggestion) => result.error_with_suggestion(format!("{path}.type"), message, suggestion),
        None => result.error(format!("{path}.type"), message),
    }
}
