//! Action execution for matched rules.
//!
//! [`RuleExecutor`] runs the action half of a rule once its condition is
//! satisfied. Built-in action types are handled in `actions`; `custom`
//! actions go to [`ActionHandler`]s registered by name. Every execution
//! returns a [`RuleExecutionResult`]: handler errors and panics are caught
//! and turned into failed results with an error code.

mod actions;
mod handle;
mod stats;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use attend_core::RuleId;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::alerting::{Dispatcher, NotifyError, TemplateRenderer};
use crate::calculus::AttendanceCalculus;
use crate::schema::{
    codes, ActionConfig, AttendancePolicy, EvaluationOutcome, ExecutedAction, RuleExecutionContext,
    RuleExecutionResult, ACTION_TYPES,
};
use crate::validation::{check_action, ValidationResult};

pub use handle::ExecutionHandle;
pub use stats::ExecutorStatistics;

use stats::StatsRecorder;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("unsupported action type '{0}'")]
    Unsupported(String),

    #[error("invalid action config: {0}")]
    InvalidConfig(String),

    #[error("action '{0}' needs an attendance policy")]
    MissingPolicy(String),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error("{0}")]
    Failed(String),
}

impl ActionError {
    /// Stable error code carried by the failed result.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unsupported(_) => codes::UNSUPPORTED_ACTION,
            Self::InvalidConfig(_) | Self::MissingPolicy(_) | Self::Notify(NotifyError::Template(_)) => {
                codes::INVALID_ACTION_CONFIG
            }
            Self::Notify(_) | Self::Failed(_) => codes::EXECUTION_ERROR,
        }
    }
}

// ── Requests and outputs ────────────────────────────────────────────

/// Everything needed to run one rule's action.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub rule_id: RuleId,
    pub rule_name: String,
    pub category: String,
    pub action: ActionConfig,
    pub context: RuleExecutionContext,
    pub policy: Option<AttendancePolicy>,
    /// Outcome of the condition; the action only runs on `Success`.
    pub outcome: EvaluationOutcome,
}

impl ExecutionRequest {
    pub fn new(rule_id: RuleId, action: ActionConfig, context: RuleExecutionContext) -> Self {
        Self {
            rule_id,
            rule_name: format!("rule {rule_id}"),
            category: String::new(),
            action,
            context,
            policy: None,
            outcome: EvaluationOutcome::Success,
        }
    }

    pub fn with_rule(mut self, name: impl Into<String>, category: impl Into<String>) -> Self {
        self.rule_name = name.into();
        self.category = category.into();
        self
    }

    pub fn with_policy(mut self, policy: Option<AttendancePolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_outcome(mut self, outcome: EvaluationOutcome) -> Self {
        self.outcome = outcome;
        self
    }
}

/// What an action produced, before it is stamped into a result.
#[derive(Debug, Clone, Default)]
pub struct ActionOutput {
    pub success: bool,
    pub message: String,
    pub data: Map<String, Value>,
    pub actions: Vec<ExecutedAction>,
}

impl ActionOutput {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into(), ..Self::default() }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into(), ..Self::default() }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_action(mut self, action: ExecutedAction) -> Self {
        self.actions.push(action);
        self
    }
}

/// A `custom` action type supplied by the embedding service.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn action_type(&self) -> &str;

    async fn execute(&self, params: &Value, request: &ExecutionRequest) -> Result<ActionOutput, ActionError>;
}

/// Aggregate of [`RuleExecutor::execute_batch`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchExecutionResult {
    pub total_requests: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub results: Vec<RuleExecutionResult>,
}

impl BatchExecutionResult {
    fn fold(results: Vec<RuleExecutionResult>) -> Self {
        let success_count = results.iter().filter(|r| r.success).count();
        Self {
            total_requests: results.len(),
            success_count,
            failure_count: results.len() - success_count,
            results,
        }
    }
}

/// Outcome of [`RuleExecutor::validate_action`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleExecutionValidationResult {
    pub valid: bool,
    pub error_message: Option<String>,
    pub warnings: Vec<String>,
}

// ── Executor ────────────────────────────────────────────────────────

pub struct RuleExecutor {
    calculus: Arc<AttendanceCalculus>,
    dispatcher: Arc<Dispatcher>,
    renderer: TemplateRenderer,
    handlers: RwLock<HashMap<String, Arc<dyn ActionHandler>>>,
    stats: StatsRecorder,
}

impl RuleExecutor {
    pub fn new(calculus: Arc<AttendanceCalculus>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            calculus,
            dispatcher,
            renderer: TemplateRenderer::new(),
            handlers: RwLock::new(HashMap::new()),
            stats: StatsRecorder::default(),
        }
    }

    /// Register (or replace) the handler for a custom action type.
    pub fn register_handler(&self, handler: Arc<dyn ActionHandler>) {
        let name = handler.action_type().to_string();
        debug!(action_type = %name, "registered action handler");
        self.handlers.write().expect("handlers lock poisoned").insert(name, handler);
    }

    pub fn custom_action_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().expect("handlers lock poisoned").keys().cloned().collect();
        names.sort();
        names
    }

    /// Built-in types plus registered custom handlers, sorted.
    pub fn supported_action_types(&self) -> Vec<String> {
        let mut types: Vec<String> = ACTION_TYPES
            .iter()
            .filter(|t| **t != "custom")
            .map(|t| t.to_string())
            .chain(self.custom_action_types())
            .collect();
        types.sort();
        types.dedup();
        types
    }

    pub fn supports_action_type(&self, action_type: &str) -> bool {
        (action_type != "custom" && ACTION_TYPES.contains(&action_type))
            || self.handlers.read().expect("handlers lock poisoned").contains_key(action_type)
    }

    /// Check an action map without running it.
    pub fn validate_action(&self, action: &Value) -> RuleExecutionValidationResult {
        let mut result = ValidationResult::new();
        check_action(action, &self.custom_action_types(), &mut result);
        RuleExecutionValidationResult {
            valid: result.valid,
            error_message: result.error_message(),
            warnings: result.warnings.into_iter().map(|w| format!("{}: {}", w.path, w.message)).collect(),
        }
    }

    /// Run one action. Never fails: errors and panics become failed results.
    pub async fn execute(&self, request: &ExecutionRequest) -> RuleExecutionResult {
        let action_type = request.action.action_type().to_string();
        if request.outcome != EvaluationOutcome::Success {
            debug!(rule_id = request.rule_id, action_type = %action_type, "condition not satisfied, skipping action");
            return RuleExecutionResult::skipped(request.rule_id, action_type);
        }

        let started = Instant::now();
        let outcome = AssertUnwindSafe(self.run_action(&request.action, request)).catch_unwind().await;

        let mut result = match outcome {
            Ok(Ok(output)) => {
                let mut result = if output.success {
                    RuleExecutionResult::success(request.rule_id, &action_type, output.message)
                } else {
                    RuleExecutionResult::failure(request.rule_id, &action_type, codes::EXECUTION_ERROR, output.message)
                };
                result.result_data = output.data;
                result.executed_actions = output.actions;
                result
            }
            Ok(Err(e)) => {
                warn!(rule_id = request.rule_id, action_type = %action_type, error = %e, "action failed");
                RuleExecutionResult::failure(request.rule_id, &action_type, e.code(), e.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(rule_id = request.rule_id, action_type = %action_type, panic = %message, "action panicked");
                RuleExecutionResult::failure(
                    request.rule_id,
                    &action_type,
                    codes::EXECUTION_ERROR,
                    format!("action panicked: {message}"),
                )
            }
        };

        result.execution_duration_ms = started.elapsed().as_millis() as u64;
        self.stats.record(&action_type, result.execution_duration_ms, result.success);
        debug!(
            rule_id = request.rule_id,
            action_type = %action_type,
            success = result.success,
            duration_ms = result.execution_duration_ms,
            "action executed"
        );
        result
    }

    /// Run independent requests concurrently; one failure does not affect
    /// the others. Results keep request order.
    pub async fn execute_batch(&self, requests: &[ExecutionRequest]) -> BatchExecutionResult {
        let results = futures::future::join_all(requests.iter().map(|r| self.execute(r))).await;
        BatchExecutionResult::fold(results)
    }

    /// Run an action on a spawned task.
    ///
    /// The returned handle resolves exactly once: with the action's result,
    /// with a `TIMEOUT` result after `timeout`, or with a `CANCELLED` result
    /// if the handle is cancelled first.
    pub fn execute_async(self: &Arc<Self>, request: ExecutionRequest, timeout: Duration) -> ExecutionHandle {
        let (tx, rx) = oneshot::channel();
        let executor = Arc::clone(self);
        let rule_id = request.rule_id;
        let action_type = request.action.action_type().to_string();
        let task_action_type = action_type.clone();

        let task = tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, executor.execute(&request)).await {
                Ok(result) => result,
                Err(_) => {
                    let timeout_ms = timeout.as_millis() as u64;
                    warn!(rule_id, action_type = %task_action_type, timeout_ms, "async action timed out");
                    executor.stats.record(&task_action_type, timeout_ms, false);
                    let mut result = RuleExecutionResult::failure(
                        rule_id,
                        &task_action_type,
                        codes::TIMEOUT,
                        format!("action did not complete within {timeout_ms}ms"),
                    );
                    result.execution_duration_ms = timeout_ms;
                    result
                }
            };
            // The receiver may already be gone; nothing to report then.
            let _ = tx.send(result);
        });

        ExecutionHandle::new(rule_id, action_type, rx, task.abort_handle())
    }

    pub fn statistics(&self) -> ExecutorStatistics {
        self.stats.snapshot()
    }

    pub fn reset_statistics(&self) {
        self.stats.reset();
    }

    fn handler(&self, name: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.read().expect("handlers lock poisoned").get(name).cloned()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
