//! Condition evaluators selected by condition type.
//!
//! [`EvaluatorFactory::create_evaluator`] turns a decoded
//! [`ConditionConfig`] into a tree of [`Evaluator`] strategies: one leaf
//! strategy per attendance predicate, composite nodes for `all`/`any`/`not`,
//! and adapters for custom evaluators registered by name.

mod builtin;
mod composition;


use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::calculus::AttendanceCalculus;
use crate::schema::{AttendancePolicy, ConditionConfig, RuleExecutionContext};

use builtin::{
    AlwaysTrue, CustomAdapter, FieldCompare, NonWorkingDay, OutsideGeofence, OvertimeAtLeast, PunchCheck,
    StatusIn, UnauthorizedDevice, WorkHoursBelow,
};
use composition::{Composite, LogicalOp};

pub use builtin::compare_values;

#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("condition '{condition}' needs an attendance policy")]
    MissingPolicy { condition: &'static str },

    #[error("no evaluator registered as '{0}'")]
    UnknownEvaluator(String),

    #[error("evaluator '{name}' failed: {message}")]
    Custom { name: String, message: String },
}

/// Everything a condition may read while evaluating.
pub struct EvaluationScope<'a> {
    pub context: &'a RuleExecutionContext,
    pub policy: Option<&'a AttendancePolicy>,
    pub calculus: &'a AttendanceCalculus,
}

impl<'a> EvaluationScope<'a> {
    pub fn new(
        context: &'a RuleExecutionContext,
        policy: Option<&'a AttendancePolicy>,
        calculus: &'a AttendanceCalculus,
    ) -> Self {
        Self { context, policy, calculus }
    }

    pub(crate) fn policy_for(&self, condition: &'static str) -> Result<&'a AttendancePolicy, EvaluationError> {
        self.policy.ok_or(EvaluationError::MissingPolicy { condition })
    }
}

/// A compiled condition.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, scope: &EvaluationScope<'_>) -> Result<bool, EvaluationError>;
}

/// A condition type supplied by the embedding service.
pub trait CustomEvaluator: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(&self, params: &Value, scope: &EvaluationScope<'_>) -> Result<bool, EvaluationError>;
}

/// Registry of custom evaluators and builder of evaluator trees.
#[derive(Default)]
pub struct EvaluatorFactory {
    custom: RwLock<HashMap<String, Arc<dyn CustomEvaluator>>>,
}

impl EvaluatorFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a custom evaluator under its name.
    pub fn register(&self, evaluator: Arc<dyn CustomEvaluator>) {
        let name = evaluator.name().to_string();
        tracing::debug!(evaluator = %name, "registered custom evaluator");
        self.custom.write().expect("evaluators lock poisoned").insert(name, evaluator);
    }

    pub fn has_custom(&self, name: &str) -> bool {
        self.custom.read().expect("evaluators lock poisoned").contains_key(name)
    }

    pub fn custom_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.custom.read().expect("evaluators lock poisoned").keys().cloned().collect();
        names.sort();
        names
    }

    /// Build the evaluator tree for a condition.
    pub fn create_evaluator(&self, condition: &ConditionConfig) -> Result<Box<dyn Evaluator>, EvaluationError> {
        let evaluator: Box<dyn Evaluator> = match condition {
            ConditionConfig::Always => Box::new(AlwaysTrue),
            ConditionConfig::AttendanceStatus { any_of } => Box::new(StatusIn { statuses: any_of.clone() }),
            ConditionConfig::Late => Box::new(PunchCheck::Late),
            ConditionConfig::EarlyLeave => Box::new(PunchCheck::EarlyLeave),
            ConditionConfig::Absent => Box::new(PunchCheck::Absent),
            ConditionConfig::Overtime { min_hours } => Box::new(OvertimeAtLeast { min_hours: *min_hours }),
            ConditionConfig::WorkHoursBelow { hours } => Box::new(WorkHoursBelow { hours: *hours }),
            ConditionConfig::OutsideGeofence => Box::new(OutsideGeofence),
            ConditionConfig::UnauthorizedDevice => Box::new(UnauthorizedDevice),
            ConditionConfig::NonWorkingDay => Box::new(NonWorkingDay),
            ConditionConfig::Compare { field, op, value } => Box::new(FieldCompare {
                field: field.clone(),
                op: *op,
                value: value.clone(),
            }),
            ConditionConfig::All { conditions } => Box::new(Composite {
                op: LogicalOp::All,
                children: self.create_all(conditions)?,
            }),
            ConditionConfig::Any { conditions } => Box::new(Composite {
                op: LogicalOp::Any,
                children: self.create_all(conditions)?,
            }),
            ConditionConfig::Not { condition } => Box::new(Composite {
                op: LogicalOp::Not,
                children: vec![self.create_evaluator(condition)?],
            }),
            ConditionConfig::Custom { evaluator, params, .. } => {
                let inner = self
                    .custom
                    .read()
                    .expect("evaluators lock poisoned")
                    .get(evaluator)
                    .cloned()
                    .ok_or_else(|| EvaluationError::UnknownEvaluator(evaluator.clone()))?;
                Box::new(CustomAdapter { inner, params: params.clone() })
            }
        };
        Ok(evaluator)
    }

    fn create_all(&self, conditions: &[ConditionConfig]) -> Result<Vec<Box<dyn Evaluator>>, EvaluationError> {
        conditions.iter().map(|c| self.create_evaluator(c)).collect()
    }
}
