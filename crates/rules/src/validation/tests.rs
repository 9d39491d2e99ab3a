use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveTime;
use serde_json::{json, Value};

use super::*;
use crate::alerting::Dispatcher;
use crate::calculus::AttendanceCalculus;
use crate::evaluator::{CustomEvaluator, EvaluationError, EvaluationScope};
use crate::executor::{ActionError, ActionHandler, ActionOutput, ExecutionRequest};
use crate::loader::InMemoryRuleLoader;
use crate::schema::AttendancePolicy;

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn policy() -> AttendancePolicy {
    AttendancePolicy::shift(t(9, 0), t(18, 0)).with_break(t(12, 0), t(13, 0))
}

struct ShiftIs;

impl CustomEvaluator for ShiftIs {
    fn name(&self) -> &str {
        "shift_is"
    }

    fn evaluate(&self, _params: &Value, _scope: &EvaluationScope<'_>) -> Result<bool, EvaluationError> {
        Ok(true)
    }
}

struct Escalate;

#[async_trait]
impl ActionHandler for Escalate {
    fn action_type(&self) -> &str {
        "escalate"
    }

    async fn execute(&self, _params: &Value, _request: &ExecutionRequest) -> Result<ActionOutput, ActionError> {
        Ok(ActionOutput::ok("escalated"))
    }
}

fn validator(rules: Vec<RuleDefinition>) -> RuleValidator {
    let evaluators = Arc::new(EvaluatorFactory::new());
    evaluators.register(Arc::new(ShiftIs));
    let executor = Arc::new(RuleExecutor::new(Arc::new(AttendanceCalculus::default()), Arc::new(Dispatcher::empty())));
    executor.register_handler(Arc::new(Escalate));
    RuleValidator::new(
        Arc::new(InMemoryRuleLoader::with_rules(rules)),
        evaluators,
        executor,
        Duration::from_secs(1),
    )
}

fn late_rule() -> RuleDefinition {
    RuleDefinition::new(1, "Late arrival", "punch")
        .with_policy(policy())
        .with_condition(json!({"type": "late"}))
        .with_action(json!({"type": "alert", "message": "{{ user_id }} was late"}))
}

fn check(rule: RuleDefinition) -> ValidationResult {
    validator(Vec::new()).validate(rule.id, Some(&rule))
}

// ── Definition checks ───────────────────────────────────────────────

#[test]
fn well_formed_rule_is_valid() {
    let result = check(late_rule());
    assert!(result.valid, "{:?}", result.errors);
    assert!(result.warnings.is_empty());
    assert_eq!(result.error_message(), None);
}

#[test]
fn missing_rule_is_reported_on_id() {
    let result = validator(Vec::new()).validate(7, None);
    assert!(!result.valid);
    assert_eq!(result.errors[0].path, "id");
    assert_eq!(result.errors[0].message, "rule 7 not found");
}

#[test]
fn disabled_rule_is_invalid() {
    let result = check(late_rule().disabled());
    assert!(!result.valid);
    assert!(result.errors.iter().any(|e| e.path == "enabled"));
}

#[test]
fn id_mismatch_is_invalid() {
    let rule = late_rule();
    let result = validator(Vec::new()).validate(2, Some(&rule));
    assert!(!result.valid);
    assert_eq!(result.errors[0].message, "store returned rule 1 for id 2");
}

#[test]
fn blank_name_and_category_are_errors() {
    let result = check(RuleDefinition::new(1, "  ", ""));
    let paths: Vec<&str> = result.errors.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["name", "category"]);
}

#[test]
fn single_break_bound_warns_without_blocking() {
    let mut p = policy();
    p.break_end = None;
    let result = check(late_rule().with_policy(p));
    assert!(result.valid, "{:?}", result.errors);
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].path, "policy");
}

#[test]
fn zero_length_shift_is_an_error() {
    let result = check(late_rule().with_policy(AttendancePolicy::shift(t(9, 0), t(9, 0))));
    assert!(result.errors.iter().any(|e| e.path == "policy.work_end"));
}

// ── Condition checks ────────────────────────────────────────────────

#[test]
fn unknown_condition_type_suggests_closest() {
    let result = check(late_rule().with_condition(json!({"type": "lat"})));
    assert!(!result.valid);
    let err = &result.errors[0];
    assert_eq!(err.path, "condition.type");
    assert_eq!(err.suggestion.as_deref(), Some("late"));
    assert_eq!(
        result.error_message().unwrap(),
        "condition.type: unknown condition type 'lat' (did you mean 'late'?)"
    );
}

#[test]
fn nested_condition_errors_carry_their_path() {
    let result = check(late_rule().with_condition(json!({
        "type": "all",
        "conditions": [{"type": "late"}, {"type": "overtme", "min_hours": 1}]
    })));
    assert!(!result.valid);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].path, "condition.conditions[1].type");
    assert_eq!(result.errors[0].suggestion.as_deref(), Some("overtime"));
}

#[test]
fn condition_without_type_is_an_error() {
    let result = check(late_rule().with_condition(json!({"min_hours": 1})));
    assert_eq!(result.errors[0].path, "condition.type");
    assert_eq!(result.errors[0].message, "missing 'type'");
}

#[test]
fn empty_status_set_is_an_error() {
    let result = check(late_rule().with_condition(json!({"type": "attendance_status", "any_of": []})));
    assert!(result.errors.iter().any(|e| e.path == "condition.any_of"));
}

#[test]
fn policy_dependent_condition_needs_policy() {
    let rule = RuleDefinition::new(1, "Late arrival", "punch").with_condition(json!({"type": "late"}));
    let result = check(rule);
    assert!(!result.valid);
    assert_eq!(result.errors[0].path, "policy");
    assert_eq!(result.errors[0].message, "condition 'late' needs an attendance policy");
}

#[test]
fn absent_condition_runs_without_policy() {
    let rule = RuleDefinition::new(1, "No show", "punch").with_condition(json!({"type": "absent"}));
    assert!(check(rule).valid);
}

#[test]
fn custom_evaluator_must_be_registered() {
    let registered = check(late_rule().with_condition(json!({"type": "custom", "evaluator": "shift_is"})));
    assert!(registered.valid, "{:?}", registered.errors);

    let typo = check(late_rule().with_condition(json!({"type": "custom", "evaluator": "shift_iz"})));
    assert!(!typo.valid);
    assert_eq!(typo.errors[0].path, "condition.evaluator");
    assert_eq!(typo.errors[0].suggestion.as_deref(), Some("shift_is"));
}

// ── Action checks ───────────────────────────────────────────────────

#[test]
fn unknown_action_type_suggests_closest() {
    let result = check(late_rule().with_action(json!({"type": "alrt", "message": "x"})));
    assert!(!result.valid);
    assert_eq!(result.errors[0].path, "action.type");
    assert_eq!(result.errors[0].suggestion.as_deref(), Some("alert"));
}

#[test]
fn broken_template_is_an_error() {
    let result = check(late_rule().with_action(json!({"type": "alert", "message": "{{ user_id"})));
    assert!(!result.valid);
    assert_eq!(result.errors[0].path, "action.message");
}

#[test]
fn notify_needs_recipients() {
    let result = check(late_rule().with_action(json!({"type": "notify", "recipients": [], "subject": "late"})));
    assert!(result.errors.iter().any(|e| e.path == "action.recipients"));
}

#[test]
fn nested_sequence_action_paths() {
    let result = check(late_rule().with_action(json!({
        "type": "sequence",
        "actions": [{"type": "classify"}, {"type": "log", "message": ""}]
    })));
    assert!(!result.valid);
    assert_eq!(result.errors[0].path, "action.actions[1].message");
}

#[test]
fn empty_sequence_only_warns() {
    let result = check(late_rule().with_action(json!({"type": "sequence", "actions": []})));
    assert!(result.valid, "{:?}", result.errors);
    assert_eq!(result.warnings[0].path, "action.actions");
}

#[test]
fn correction_without_reason_warns() {
    let result = check(late_rule().with_action(json!({"type": "correction", "status": "NORMAL"})));
    assert!(result.valid, "{:?}", result.errors);
    assert!(result.warnings.iter().any(|w| w.path == "action.reason"));
}

#[test]
fn classify_action_needs_policy() {
    let rule = RuleDefinition::new(1, "No show", "punch")
        .with_condition(json!({"type": "absent"}))
        .with_action(json!({"type": "classify"}));
    let result = check(rule);
    assert!(!result.valid);
    assert_eq!(result.errors[0].message, "action 'classify' needs an attendance policy");
}

#[test]
fn custom_handler_must_be_registered() {
    let known = check(late_rule().with_action(json!({"type": "custom", "handler": "escalate"})));
    assert!(known.valid, "{:?}", known.errors);

    let unknown = check(late_rule().with_action(json!({"type": "custom", "handler": "page_manager"})));
    assert!(!unknown.valid);
    assert_eq!(unknown.errors[0].path, "action.handler");
    assert_eq!(unknown.errors[0].suggestion, None);
}

// ── Compile / store ─────────────────────────────────────────────────

#[test]
fn compile_decodes_condition_and_action() {
    let rule = late_rule();
    let compiled = validator(Vec::new()).compile(1, Some(&rule)).unwrap();
    assert_eq!(compiled.condition, ConditionConfig::Late);
    assert_eq!(compiled.action.as_ref().map(ActionConfig::action_type), Some("alert"));
}

#[test]
fn rule_without_action_compiles_to_none() {
    let rule = RuleDefinition::new(1, "No show", "punch").with_condition(json!({"type": "absent"}));
    let compiled = validator(Vec::new()).compile(1, Some(&rule)).unwrap();
    assert!(compiled.action.is_none());
}

#[tokio::test]
async fn validate_rule_reads_from_the_store() {
    let v = validator(vec![late_rule(), RuleDefinition::new(2, "Off", "punch").disabled()]);

    assert!(v.validate_rule(1).await.valid);

    let disabled = v.validate_rule(2).await;
    assert!(!disabled.valid);
    assert_eq!(disabled.error_message().unwrap(), "enabled: rule 2 is disabled");

    let missing = v.validate_rule(3).await;
    assert_eq!(missing.errors[0].message, "rule 3 not found");
}
