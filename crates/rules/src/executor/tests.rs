use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use serde_json::{json, Value};

use super::*;
use crate::alerting::{Notifier, RecordingNotifier};
use crate::schema::{AlertLevel, AttendancePolicy, EvaluationOutcome};

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn policy() -> AttendancePolicy {
    AttendancePolicy::shift(t(9, 0), t(18, 0)).with_break(t(12, 0), t(13, 0))
}

fn context() -> RuleExecutionContext {
    RuleExecutionContext::new(42, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap())
        .with_punches(Some(t(9, 30)), Some(t(19, 0)))
}

fn executor_with(notifier: Arc<RecordingNotifier>) -> Arc<RuleExecutor> {
    let dispatcher = Dispatcher::with_defaults(vec![notifier as Arc<dyn Notifier>]);
    Arc::new(RuleExecutor::new(Arc::new(AttendanceCalculus::default()), Arc::new(dispatcher)))
}

fn action(value: Value) -> ActionConfig {
    serde_json::from_value(value).unwrap()
}

fn request(value: Value) -> ExecutionRequest {
    ExecutionRequest::new(1, action(value), context())
        .with_rule("Late arrival", "punch")
        .with_policy(Some(policy()))
}

#[tokio::test]
async fn classify_writes_outcome_into_result_data() {
    let executor = executor_with(Arc::new(RecordingNotifier::new()));
    let result = executor.execute(&request(json!({"type": "classify"}))).await;

    assert!(result.success, "{}", result.message);
    assert_eq!(result.action_type, "classify");
    assert_eq!(result.result_data["status"], json!("LATE"));
    assert_eq!(result.result_data["work_hours"], json!(8.5));
    assert_eq!(result.result_data["overtime_hours"], json!(1.0));
    assert_eq!(result.executed_actions.len(), 1);
}

#[tokio::test]
async fn device_status_check_alerts_once_per_abnormal_device() {
    let notifier = Arc::new(RecordingNotifier::new());
    let executor = executor_with(notifier.clone());
    let mut req = request(json!({"type": "device_status_check", "level": "critical"}));
    req.context = req
        .context
        .with_attribute("device_statuses", json!({"1001": "ONLINE", "1002": "OFFLINE", "1003": "FAULT"}));

    let result = executor.execute(&req).await;

    assert!(result.success, "{}", result.message);
    let targets: Vec<_> = result.executed_actions.iter().map(|a| a.target.clone().unwrap()).collect();
    assert_eq!(targets, vec!["1002", "1003"]);
    assert_eq!(result.result_data["checked"], json!(3));
    assert_eq!(result.result_data["abnormal"], json!(["1002", "1003"]));

    let sent = notifier.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|n| n.level == AlertLevel::Critical));
    assert_eq!(sent[1].metadata["device_status"], "FAULT");
}

#[tokio::test]
async fn device_status_message_template_sees_the_device() {
    let notifier = Arc::new(RecordingNotifier::new());
    let executor = executor_with(notifier.clone());
    let mut req = request(json!({
        "type": "device_status_check",
        "message": "{{ device.id }} is {{ device.status | lower }}"
    }));
    req.context = req.context.with_attribute("device_statuses", json!({"7": "OFFLINE"}));

    executor.execute(&req).await;
    assert_eq!(notifier.sent()[0].body, "7 is offline");
}

#[tokio::test]
async fn alert_renders_template_and_dispatches() {
    let notifier = Arc::new(RecordingNotifier::new());
    let executor = executor_with(notifier.clone());
    let req = request(json!({
        "type": "alert",
        "message": "User {{ user_id }} punched in at {{ punch_in }} ({{ outcome.status }})"
    }));

    let result = executor.execute(&req).await;
    assert!(result.success);

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].body, "User 42 punched in at 09:30 (LATE)");
    assert_eq!(sent[0].subject, "[warning] Late arrival");
    assert_eq!(sent[0].metadata["rule_id"], "1");
}

#[tokio::test]
async fn delivery_failure_is_a_failed_result() {
    let notifier = Arc::new(RecordingNotifier::new());
    notifier.set_failing(true);
    let executor = executor_with(notifier);

    let result = executor.execute(&request(json!({"type": "alert", "message": "late"}))).await;
    assert!(!result.success);
    assert_eq!(result.error_code.as_deref(), Some(codes::EXECUTION_ERROR));
    assert!(!result.executed_actions[0].success);
}

#[tokio::test]
async fn no_channel_counts_as_attempted() {
    let executor = RuleExecutor::new(Arc::new(AttendanceCalculus::default()), Arc::new(Dispatcher::empty()));
    let result = executor
        .execute(&request(json!({"type": "notify", "recipients": ["hr@example.com"], "subject": "Late"})))
        .await;
    assert!(result.success);
    assert_eq!(result.executed_actions[0].detail, "no notification channel configured");
}

#[tokio::test]
async fn action_is_skipped_unless_condition_met() {
    let executor = executor_with(Arc::new(RecordingNotifier::new()));
    let req = request(json!({"type": "classify"})).with_outcome(EvaluationOutcome::Failed);

    let result = executor.execute(&req).await;
    assert!(!result.success);
    assert!(result.error_code.is_none());
    assert_eq!(executor.statistics().total_executions, 0);
}

#[tokio::test]
async fn missing_policy_is_invalid_config() {
    let executor = executor_with(Arc::new(RecordingNotifier::new()));
    let req = request(json!({"type": "correction", "status": "NORMAL"})).with_policy(None);
    let result = executor.execute(&req).await;
    assert_eq!(result.error_code.as_deref(), Some(codes::INVALID_ACTION_CONFIG));
}

#[tokio::test]
async fn correction_reports_both_statuses() {
    let executor = executor_with(Arc::new(RecordingNotifier::new()));
    let req = request(json!({"type": "correction", "status": "NORMAL", "reason": "approved by manager"}));
    let result = executor.execute(&req).await;
    assert!(result.success);
    assert_eq!(result.result_data["original_status"], json!("LATE"));
    assert_eq!(result.result_data["corrected_status"], json!("NORMAL"));
    assert_eq!(result.executed_actions[0].target.as_deref(), Some("42"));
}

#[tokio::test]
async fn sequence_runs_every_step() {
    let notifier = Arc::new(RecordingNotifier::new());
    let executor = executor_with(notifier.clone());
    let req = request(json!({
        "type": "sequence",
        "actions": [
            {"type": "classify"},
            {"type": "custom", "handler": "missing"},
            {"type": "log", "message": "done for {{ user_id }}"}
        ]
    }));

    let result = executor.execute(&req).await;
    assert!(!result.success);
    assert_eq!(result.message, "2 of 3 actions succeeded");
    assert_eq!(result.executed_actions.len(), 3);
    assert!(!result.executed_actions[1].success);
    assert_eq!(result.result_data["status"], json!("LATE"));
    assert_eq!(result.result_data["message"], json!("done for 42"));
}

// ── Custom handlers ─────────────────────────────────────────────────

struct Escalate;

#[async_trait]
impl ActionHandler for Escalate {
    fn action_type(&self) -> &str {
        "escalate"
    }

    async fn execute(&self, params: &Value, request: &ExecutionRequest) -> Result<ActionOutput, ActionError> {
        let to = params.get("to").and_then(Value::as_str).ok_or_else(|| ActionError::InvalidConfig("missing 'to'".into()))?;
        Ok(ActionOutput::ok(format!("escalated to {to}"))
            .with_action(ExecutedAction::ok("escalate", to).with_target(request.context.user_id.to_string())))
    }
}

struct Panics;

#[async_trait]
impl ActionHandler for Panics {
    fn action_type(&self) -> &str {
        "panics"
    }

    async fn execute(&self, _params: &Value, _request: &ExecutionRequest) -> Result<ActionOutput, ActionError> {
        panic!("handler bug");
    }
}

struct Slow;

#[async_trait]
impl ActionHandler for Slow {
    fn action_type(&self) -> &str {
        "slow"
    }

    async fn execute(&self, _params: &Value, _request: &ExecutionRequest) -> Result<ActionOutput, ActionError> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok(ActionOutput::ok("finally"))
    }
}

#[tokio::test]
async fn custom_handlers_by_name() {
    let executor = executor_with(Arc::new(RecordingNotifier::new()));
    let req = request(json!({"type": "custom", "handler": "escalate", "params": {"to": "manager"}}));

    let unsupported = executor.execute(&req).await;
    assert_eq!(unsupported.error_code.as_deref(), Some(codes::UNSUPPORTED_ACTION));
    assert!(!executor.supports_action_type("escalate"));

    executor.register_handler(Arc::new(Escalate));
    assert!(executor.supports_action_type("escalate"));
    assert!(executor.supported_action_types().contains(&"escalate".to_string()));

    let result = executor.execute(&req).await;
    assert!(result.success);
    assert_eq!(result.action_type, "escalate");
    assert_eq!(result.message, "escalated to manager");

    let bad = executor.execute(&request(json!({"type": "custom", "handler": "escalate"}))).await;
    assert_eq!(bad.error_code.as_deref(), Some(codes::INVALID_ACTION_CONFIG));
}

#[tokio::test]
async fn batch_isolates_panicking_request() {
    let executor = executor_with(Arc::new(RecordingNotifier::new()));
    executor.register_handler(Arc::new(Panics));

    let requests = vec![
        request(json!({"type": "classify"})),
        request(json!({"type": "custom", "handler": "panics"})),
        request(json!({"type": "log", "message": "ok"})),
    ];
    let batch = executor.execute_batch(&requests).await;

    assert_eq!(batch.total_requests, 3);
    assert_eq!(batch.success_count, 2);
    assert_eq!(batch.failure_count, 1);
    assert_eq!(batch.success_count + batch.failure_count, batch.total_requests);
    assert!(batch.results[1].message.contains("handler bug"));
    assert_eq!(batch.results[1].error_code.as_deref(), Some(codes::EXECUTION_ERROR));
    assert!(batch.results[2].success);
}

#[tokio::test]
async fn async_execution_completes_times_out_and_cancels() {
    let executor = executor_with(Arc::new(RecordingNotifier::new()));
    executor.register_handler(Arc::new(Slow));

    let done = executor.execute_async(request(json!({"type": "classify"})), Duration::from_secs(5));
    assert_eq!(done.rule_id(), 1);
    assert!(done.wait().await.success);

    let slow = request(json!({"type": "custom", "handler": "slow"}));
    let timed_out = executor.execute_async(slow.clone(), Duration::from_millis(20)).wait().await;
    assert_eq!(timed_out.error_code.as_deref(), Some(codes::TIMEOUT));

    let handle = executor.execute_async(slow, Duration::from_secs(60));
    handle.cancel();
    let cancelled = handle.wait().await;
    assert_eq!(cancelled.error_code.as_deref(), Some(codes::CANCELLED));
}

#[tokio::test]
async fn statistics_accumulate_and_reset() {
    let notifier = Arc::new(RecordingNotifier::new());
    let executor = executor_with(notifier.clone());

    executor.execute(&request(json!({"type": "classify"}))).await;
    executor.execute(&request(json!({"type": "classify"}))).await;
    notifier.set_failing(true);
    executor.execute(&request(json!({"type": "alert", "message": "x"}))).await;

    let stats = executor.statistics();
    assert_eq!(stats.total_executions, 3);
    assert_eq!(stats.successful_executions, 2);
    assert_eq!(stats.failed_executions, 1);
    assert_eq!(stats.action_type_counts["classify"], 2);
    assert_eq!(stats.action_type_counts["alert"], 1);
    assert!(stats.min_execution_time_ms <= stats.max_execution_time_ms);
    assert_eq!(
        stats.avg_execution_time_ms,
        stats.total_execution_time_ms as f64 / stats.total_executions as f64
    );
    assert!(stats.last_execution_time.is_some());

    executor.reset_statistics();
    assert_eq!(executor.statistics(), ExecutorStatistics::default());
}

#[test]
fn validate_action_reports_errors_and_warnings() {
    let executor = RuleExecutor::new(Arc::new(AttendanceCalculus::default()), Arc::new(Dispatcher::empty()));

    let ok = executor.validate_action(&json!({"type": "correction", "status": "NORMAL"}));
    assert!(ok.valid);
    assert_eq!(ok.warnings.len(), 1);

    let typo = executor.validate_action(&json!({"type": "alret", "message": "x"}));
    assert!(!typo.valid);
    assert!(typo.error_message.unwrap().contains("did you mean 'alert'"));

    let bad_template = executor.validate_action(&json!({"type": "log", "message": "{{ unclosed"}));
    assert!(!bad_template.valid);

    assert!(executor.supports_action_type("device_status_check"));
    assert!(!executor.supports_action_type("custom"));
}
