//! Rule definition as stored by the rule store.

use std::collections::{BTreeMap, BTreeSet};

use attend_core::{DepartmentId, RuleId, UserId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::action::ActionConfig;
use super::condition::{union_all, ConditionConfig};
use super::context::RuleExecutionContext;
use super::policy::AttendancePolicy;

/// Priority assigned when a rule file omits one.
pub const DEFAULT_PRIORITY: i32 = 100;

/// A named condition+action pair. `condition` and `action` stay opaque
/// until the validator compiles them into [`ConditionConfig`] and
/// [`ActionConfig`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RuleDefinition {
    pub id: RuleId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: String,
    /// Lower is evaluated and applied first.
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub policy: Option<AttendancePolicy>,
    #[serde(default)]
    pub scope: RuleScope,
    /// Missing means the condition always holds.
    #[serde(default)]
    pub condition: Value,
    /// Missing means the rule only classifies its match.
    #[serde(default)]
    pub action: Value,
}

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

fn default_true() -> bool {
    true
}

impl RuleDefinition {
    pub fn new(id: RuleId, name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            category: category.into(),
            priority: DEFAULT_PRIORITY,
            enabled: true,
            policy: None,
            scope: RuleScope::default(),
            condition: Value::Null,
            action: Value::Null,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_policy(mut self, policy: AttendancePolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_condition(mut self, condition: Value) -> Self {
        self.condition = condition;
        self
    }

    pub fn with_action(mut self, action: Value) -> Self {
        self.action = action;
        self
    }

    pub fn with_scope(mut self, scope: RuleScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn decode_condition(&self) -> Result<ConditionConfig, serde_json::Error> {
        if self.condition.is_null() {
            return Ok(ConditionConfig::Always);
        }
        serde_json::from_value(self.condition.clone())
    }

    pub fn decode_action(&self) -> Result<Option<ActionConfig>, serde_json::Error> {
        if self.action.is_null() {
            return Ok(None);
        }
        serde_json::from_value(self.action.clone()).map(Some)
    }

    /// Context fields an evaluation of this rule depends on, used to
    /// fingerprint cached results. Undecodable configs fall back to `None`
    /// (whole context).
    pub fn fingerprint_inputs(&self) -> Option<BTreeSet<String>> {
        let condition = self.decode_condition().ok()?;
        let action = self.decode_action().ok()?;
        union_all([
            Some(self.scope.declared_inputs()),
            condition.declared_inputs(),
            action.map_or_else(|| Some(BTreeSet::new()), |a| a.declared_inputs()),
        ])
    }
}

/// Who and when a rule applies to. Empty lists match everyone.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RuleScope {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub departments: Vec<DepartmentId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    /// Context fields that must equal the given values.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
}

impl RuleScope {
    /// Context fields [`matches`](Self::matches) reads.
    pub fn declared_inputs(&self) -> BTreeSet<String> {
        let mut inputs: BTreeSet<String> = self.attributes.keys().cloned().collect();
        if !self.departments.is_empty() {
            inputs.insert("department_id".to_string());
        }
        if !self.users.is_empty() {
            inputs.insert("user_id".to_string());
        }
        if self.start_date.is_some() || self.end_date.is_some() {
            inputs.insert("attendance_date".to_string());
        }
        inputs
    }

    pub fn matches(&self, ctx: &RuleExecutionContext) -> bool {
        if !self.departments.is_empty() {
            match ctx.department_id {
                Some(dept) if self.departments.contains(&dept) => {}
                _ => return false,
            }
        }
        if !self.users.is_empty() && !self.users.contains(&ctx.user_id) {
            return false;
        }
        if self.start_date.is_some_and(|start| ctx.attendance_date < start) {
            return false;
        }
        if self.end_date.is_some_and(|end| ctx.attendance_date > end) {
            return false;
        }
        self.attributes
            .iter()
            .all(|(key, expected)| ctx.field(key).as_ref() == Some(expected))
    }
}
