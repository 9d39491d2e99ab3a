//! Evaluation and execution result values.

use attend_core::RuleId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Stable error codes carried by failed results.
pub mod codes {
    pub const VALIDATION_FAILURE: &str = "VALIDATION_FAILURE";
    pub const EXECUTION_ERROR: &str = "EXECUTION_ERROR";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const CANCELLED: &str = "CANCELLED";
    pub const UNSUPPORTED_ACTION: &str = "UNSUPPORTED_ACTION";
    pub const INVALID_ACTION_CONFIG: &str = "INVALID_ACTION_CONFIG";
    pub const PANIC: &str = "PANIC";
}

// ── Attendance classification ───────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceStatus {
    Normal,
    Late,
    EarlyLeave,
    Abnormal,
    Absent,
}

impl std::fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Normal => "NORMAL",
            Self::Late => "LATE",
            Self::EarlyLeave => "EARLY_LEAVE",
            Self::Abnormal => "ABNORMAL",
            Self::Absent => "ABSENT",
        };
        f.write_str(label)
    }
}

/// Classified punch record: status plus rounded hour totals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttendanceOutcome {
    pub status: AttendanceStatus,
    pub work_hours: f64,
    pub overtime_hours: f64,
}

// ── Evaluation ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluationOutcome {
    /// Condition met (and its action, if any, was attempted).
    Success,
    /// Condition not met, or the rule failed validation.
    Failed,
    /// The pipeline itself broke; never cached.
    Error,
}

impl EvaluationOutcome {
    pub fn is_cacheable(self) -> bool {
        !matches!(self, Self::Error)
    }
}

impl std::fmt::Display for EvaluationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => f.write_str("SUCCESS"),
            Self::Failed => f.write_str("FAILED"),
            Self::Error => f.write_str("ERROR"),
        }
    }
}

/// Outcome of running one rule against one context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleEvaluationResult {
    pub rule_id: RuleId,
    #[serde(default)]
    pub rule_category: Option<String>,
    pub rule_priority: i32,
    pub evaluation_result: EvaluationOutcome,
    pub condition_met: bool,
    pub message: String,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    pub evaluated_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(default)]
    pub execution: Option<RuleExecutionResult>,
    /// Set by override resolution when a higher-priority rule in the same
    /// category already matched.
    #[serde(default)]
    pub overridden_by: Option<RuleId>,
}

impl RuleEvaluationResult {
    fn base(rule_id: RuleId, outcome: EvaluationOutcome, message: impl Into<String>) -> Self {
        Self {
            rule_id,
            rule_category: None,
            rule_priority: 0,
            evaluation_result: outcome,
            condition_met: false,
            message: message.into(),
            error_message: None,
            error_code: None,
            evaluated_at: Utc::now(),
            duration_ms: 0,
            execution: None,
            overridden_by: None,
        }
    }

    /// Condition evaluated; `met` decides SUCCESS or FAILED.
    pub fn evaluated(rule_id: RuleId, met: bool, execution: Option<RuleExecutionResult>) -> Self {
        let (outcome, message) = if met {
            (EvaluationOutcome::Success, "condition met")
        } else {
            (EvaluationOutcome::Failed, "condition not met")
        };
        let mut result = Self::base(rule_id, outcome, message);
        result.condition_met = met;
        result.execution = execution;
        result
    }

    pub fn validation_failed(rule_id: RuleId, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut result = Self::base(rule_id, EvaluationOutcome::Failed, "validation failed");
        result.error_message = Some(message);
        result.error_code = Some(codes::VALIDATION_FAILURE.to_string());
        result
    }

    pub fn error(rule_id: RuleId, message: impl Into<String>) -> Self {
        Self::error_with_code(rule_id, codes::EXECUTION_ERROR, message)
    }

    pub fn error_with_code(rule_id: RuleId, code: &str, message: impl Into<String>) -> Self {
        let mut result = Self::base(rule_id, EvaluationOutcome::Error, "evaluation error");
        result.error_message = Some(message.into());
        result.error_code = Some(code.to_string());
        result
    }

    pub fn with_rule_meta(mut self, category: impl Into<String>, priority: i32) -> Self {
        self.rule_category = Some(category.into());
        self.rule_priority = priority;
        self
    }

    pub fn is_success(&self) -> bool {
        self.evaluation_result == EvaluationOutcome::Success
    }
}

// ── Execution ───────────────────────────────────────────────────────

/// One concrete side effect an action performed (or attempted).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutedAction {
    pub action_type: String,
    pub success: bool,
    pub detail: String,
    #[serde(default)]
    pub target: Option<String>,
}

impl ExecutedAction {
    pub fn ok(action_type: impl Into<String>, detail: impl Into<String>) -> Self {
        Self { action_type: action_type.into(), success: true, detail: detail.into(), target: None }
    }

    pub fn failed(action_type: impl Into<String>, detail: impl Into<String>) -> Self {
        Self { action_type: action_type.into(), success: false, detail: detail.into(), target: None }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// Structured outcome of one action execution. Failures are values too.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleExecutionResult {
    pub execution_id: Uuid,
    pub rule_id: RuleId,
    pub action_type: String,
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub result_data: Map<String, Value>,
    pub execution_duration_ms: u64,
    #[serde(default)]
    pub executed_actions: Vec<ExecutedAction>,
}

impl RuleExecutionResult {
    pub fn success(rule_id: RuleId, action_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            rule_id,
            action_type: action_type.into(),
            success: true,
            message: message.into(),
            error_code: None,
            result_data: Map::new(),
            execution_duration_ms: 0,
            executed_actions: Vec::new(),
        }
    }

    /// Action not run because the condition was not satisfied.
    pub fn skipped(rule_id: RuleId, action_type: impl Into<String>) -> Self {
        let mut result = Self::success(rule_id, action_type, "condition not satisfied, action skipped");
        result.success = false;
        result
    }

    pub fn failure(
        rule_id: RuleId,
        action_type: impl Into<String>,
        code: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            rule_id,
            action_type: action_type.into(),
            success: false,
            message: message.into(),
            error_code: Some(code.to_string()),
            result_data: Map::new(),
            execution_duration_ms: 0,
            executed_actions: Vec::new(),
        }
    }
}
