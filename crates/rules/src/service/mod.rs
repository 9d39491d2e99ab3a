//! Rule execution service: the evaluation pipeline and its batch forms.
//!
//! One evaluation runs cache check, load, validation, condition
//! evaluation, action execution and cache write, in that order. The cache
//! check uses the inputs remembered from the rule's last successful load
//! (or [`RuleExecutionService::warm_up`]), so cached results stay
//! available while the store is down. Every failure along the way becomes
//! a [`RuleEvaluationResult`]; nothing is propagated to the caller.

mod builder;
mod priority;
mod stats;


use std::collections::{BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use attend_core::{EngineConfig, RuleId, PIPELINE_RULE_ID};
use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audit_log::{AuditLog, ExecutionPhase, LogLevel};
use crate::cache::RuleCache;
use crate::calculus::AttendanceCalculus;
use crate::evaluator::{EvaluationScope, EvaluatorFactory};
use crate::executor::{ExecutionHandle, ExecutionRequest, RuleExecutor};
use crate::loader::{LoaderError, RuleChange, RuleLoader};
use crate::schema::{codes, EvaluationOutcome, RuleDefinition, RuleEvaluationResult, RuleExecutionContext};
use crate::validation::{CompiledRule, RuleValidator};

pub use builder::RuleExecutionServiceBuilder;
pub use priority::{resolve_overrides, sort_by_priority};
pub use stats::EngineStatistics;

use stats::EngineCounters;

/// Context fields a rule reads, as of its last successful load.
type InputSnapshot = Option<BTreeSet<String>>;

pub struct RuleExecutionService {
    config: EngineConfig,
    loader: Arc<dyn RuleLoader>,
    cache: RuleCache,
    validator: RuleValidator,
    evaluators: Arc<EvaluatorFactory>,
    executor: Arc<RuleExecutor>,
    calculus: Arc<AttendanceCalculus>,
    audit: AuditLog,
    counters: EngineCounters,
    inputs: RwLock<HashMap<RuleId, InputSnapshot>>,
}

impl RuleExecutionService {
    pub fn builder(loader: Arc<dyn RuleLoader>) -> RuleExecutionServiceBuilder {
        RuleExecutionServiceBuilder::new(loader)
    }

    // ── Single rule ─────────────────────────────────────────────────

    /// Evaluate one rule against one context.
    ///
    /// A cached result is returned unchanged, without loading, validating,
    /// evaluating or executing anything. The store is only consulted on a
    /// miss, or when the rule's inputs are not yet known.
    pub async fn evaluate_rule(&self, rule_id: RuleId, ctx: &RuleExecutionContext) -> RuleEvaluationResult {
        let started = Instant::now();

        let known = self.known_inputs(rule_id);
        if let Some(inputs) = &known {
            if let Some(hit) = self.cached(rule_id, inputs.as_ref(), ctx).await {
                return hit;
            }
        }

        let definition = match self.load(rule_id).await {
            Ok(definition) => definition,
            Err(e) => {
                let message = format!("failed to load rule {rule_id}: {e}");
                self.audit.log(rule_id, LogLevel::Error, ExecutionPhase::Load, &message);
                return self.finish(RuleEvaluationResult::error(rule_id, message), started);
            }
        };
        let inputs = definition.as_ref().and_then(RuleDefinition::fingerprint_inputs);
        if definition.is_some() {
            self.remember_inputs(rule_id, inputs.clone());
        }

        // The definition may have changed since the snapshot was taken.
        if known.as_ref() != Some(&inputs) {
            if let Some(hit) = self.cached(rule_id, inputs.as_ref(), ctx).await {
                return hit;
            }
        }
        self.audit.log(rule_id, LogLevel::Debug, ExecutionPhase::CacheCheck, "cache miss");

        self.counters.validation();
        let compiled = match self.validator.compile(rule_id, definition.as_ref()) {
            Ok(compiled) => compiled,
            Err(validation) => {
                let message = validation.error_message().unwrap_or_else(|| "invalid rule".to_string());
                debug!(rule_id, error = %message, "rule failed validation");
                self.audit.log_with_details(
                    rule_id,
                    LogLevel::Warning,
                    ExecutionPhase::Validate,
                    &message,
                    serde_json::to_value(&validation.errors).ok(),
                    None,
                );
                let mut result = RuleEvaluationResult::validation_failed(rule_id, message);
                if let Some(def) = &definition {
                    result = result.with_rule_meta(def.category.clone(), def.priority);
                }
                return self.store(rule_id, inputs.as_ref(), ctx, result, started).await;
            }
        };
        for warning in &compiled.warnings {
            self.audit.log(
                rule_id,
                LogLevel::Info,
                ExecutionPhase::Validate,
                format!("{}: {}", warning.path, warning.message),
            );
        }

        let result = self
            .run_compiled(&compiled, ctx)
            .await
            .with_rule_meta(compiled.definition.category.clone(), compiled.definition.priority);
        self.store(rule_id, inputs.as_ref(), ctx, result, started).await
    }

    async fn cached(
        &self,
        rule_id: RuleId,
        inputs: Option<&BTreeSet<String>>,
        ctx: &RuleExecutionContext,
    ) -> Option<RuleEvaluationResult> {
        let hit = self.cache.get(rule_id, inputs, ctx).await?;
        self.audit.log(rule_id, LogLevel::Debug, ExecutionPhase::CacheCheck, "cache hit");
        self.counters.cache_hit(hit.evaluation_result);
        Some(hit)
    }

    fn known_inputs(&self, rule_id: RuleId) -> Option<InputSnapshot> {
        self.inputs.read().expect("input snapshot lock poisoned").get(&rule_id).cloned()
    }

    fn remember_inputs(&self, rule_id: RuleId, inputs: InputSnapshot) {
        self.inputs.write().expect("input snapshot lock poisoned").insert(rule_id, inputs);
    }

    fn forget_inputs(&self, rule_id: Option<RuleId>) {
        let mut snapshots = self.inputs.write().expect("input snapshot lock poisoned");
        match rule_id {
            Some(id) => {
                snapshots.remove(&id);
            }
            None => snapshots.clear(),
        }
    }

    /// Load and compile each rule ahead of traffic so later evaluations can
    /// check the cache without reaching the store. Failures are logged and
    /// skipped. Returns the ids that compiled.
    pub async fn warm_up(&self, rule_ids: &[RuleId]) -> Vec<RuleId> {
        let warmed: Vec<RuleId> = stream::iter(rule_ids.iter().map(|&id| self.warm_rule(id)))
            .buffered(self.config.execution.max_concurrency)
            .filter_map(|id| async move { id })
            .collect()
            .await;
        info!(requested = rule_ids.len(), warmed = warmed.len(), "rule cache warmed");
        warmed
    }

    async fn warm_rule(&self, rule_id: RuleId) -> Option<RuleId> {
        let definition = match self.load(rule_id).await {
            Ok(definition) => definition,
            Err(e) => {
                warn!(rule_id, error = %e, "warm-up load failed");
                self.audit.log(rule_id, LogLevel::Warning, ExecutionPhase::Load, format!("warm-up load failed: {e}"));
                return None;
            }
        };
        match self.validator.compile(rule_id, definition.as_ref()) {
            Ok(compiled) => {
                self.remember_inputs(rule_id, compiled.definition.fingerprint_inputs());
                debug!(rule_id, "rule warmed");
                Some(rule_id)
            }
            Err(validation) => {
                let message = validation.error_message().unwrap_or_else(|| "invalid rule".to_string());
                warn!(rule_id, error = %message, "warm-up skipped invalid rule");
                self.audit.log(rule_id, LogLevel::Warning, ExecutionPhase::Validate, format!("warm-up: {message}"));
                None
            }
        }
    }

    /// Run one action on a spawned task, bounded by the configured async
    /// timeout.
    pub fn execute_async(&self, request: ExecutionRequest) -> ExecutionHandle {
        self.executor.execute_async(request, self.config.execution.async_timeout())
    }

    async fn run_compiled(&self, compiled: &CompiledRule, ctx: &RuleExecutionContext) -> RuleEvaluationResult {
        let definition = &compiled.definition;
        let rule_id = definition.id;

        if !definition.scope.matches(ctx) {
            self.audit.log(rule_id, LogLevel::Debug, ExecutionPhase::Evaluate, "rule does not apply to this context");
            let mut result = RuleEvaluationResult::evaluated(rule_id, false, None);
            result.message = "rule does not apply to this context".to_string();
            return result;
        }

        let evaluator = match self.evaluators.create_evaluator(&compiled.condition) {
            Ok(evaluator) => evaluator,
            Err(e) => {
                self.audit.log(rule_id, LogLevel::Error, ExecutionPhase::Evaluate, e.to_string());
                return RuleEvaluationResult::error(rule_id, e.to_string());
            }
        };
        let scope = EvaluationScope::new(ctx, definition.policy.as_ref(), &self.calculus);
        let met = match std::panic::catch_unwind(AssertUnwindSafe(|| evaluator.evaluate(&scope))) {
            Ok(Ok(met)) => met,
            Ok(Err(e)) => {
                warn!(rule_id, error = %e, "condition evaluation failed");
                self.audit.log(rule_id, LogLevel::Error, ExecutionPhase::Evaluate, e.to_string());
                return RuleEvaluationResult::error(rule_id, e.to_string());
            }
            Err(_) => {
                warn!(rule_id, "condition evaluator panicked");
                self.audit.log(rule_id, LogLevel::Error, ExecutionPhase::Evaluate, "evaluator panicked");
                return RuleEvaluationResult::error_with_code(rule_id, codes::PANIC, "condition evaluator panicked");
            }
        };
        self.audit.log(
            rule_id,
            LogLevel::Debug,
            ExecutionPhase::Evaluate,
            format!("condition '{}' evaluated to {met}", compiled.condition.type_name()),
        );

        let execution = match (&compiled.action, met) {
            (Some(action), true) => {
                let request = ExecutionRequest::new(rule_id, action.clone(), ctx.clone())
                    .with_rule(definition.name.clone(), definition.category.clone())
                    .with_policy(definition.policy.clone());
                let execution = self.executor.execute(&request).await;
                let level = if execution.success { LogLevel::Info } else { LogLevel::Warning };
                self.audit.log_with_details(
                    rule_id,
                    level,
                    ExecutionPhase::Execute,
                    &execution.message,
                    execution.error_code.clone().map(serde_json::Value::from),
                    Some(execution.execution_duration_ms),
                );
                Some(execution)
            }
            _ => None,
        };

        RuleEvaluationResult::evaluated(rule_id, met, execution)
    }

    /// Stamp the duration, cache the result and count it.
    async fn store(
        &self,
        rule_id: RuleId,
        inputs: Option<&BTreeSet<String>>,
        ctx: &RuleExecutionContext,
        result: RuleEvaluationResult,
        started: Instant,
    ) -> RuleEvaluationResult {
        let mut result = result;
        result.duration_ms = started.elapsed().as_millis() as u64;
        if self.cache.put(rule_id, inputs, ctx, &result).await {
            self.audit.log(rule_id, LogLevel::Debug, ExecutionPhase::CacheWrite, "result cached");
        }
        self.complete(result)
    }

    fn finish(&self, mut result: RuleEvaluationResult, started: Instant) -> RuleEvaluationResult {
        result.duration_ms = started.elapsed().as_millis() as u64;
        self.complete(result)
    }

    fn complete(&self, result: RuleEvaluationResult) -> RuleEvaluationResult {
        self.counters.evaluated(result.evaluation_result, result.duration_ms);
        let level = match result.evaluation_result {
            EvaluationOutcome::Error => LogLevel::Error,
            _ => LogLevel::Info,
        };
        self.audit.log_with_details(
            result.rule_id,
            level,
            ExecutionPhase::Complete,
            format!("{}: {}", result.evaluation_result, result.message),
            result.error_message.clone().map(serde_json::Value::from),
            Some(result.duration_ms),
        );
        debug!(
            rule_id = result.rule_id,
            outcome = %result.evaluation_result,
            duration_ms = result.duration_ms,
            "rule evaluated"
        );
        result
    }

    async fn load(&self, rule_id: RuleId) -> Result<Option<RuleDefinition>, LoaderError> {
        let timeout = self.config.store.timeout();
        match tokio::time::timeout(timeout, self.loader.load_rule_config(rule_id)).await {
            Ok(result) => result,
            Err(_) => Err(LoaderError::Unavailable(format!("load timed out after {}ms", timeout.as_millis()))),
        }
    }

    // ── Batches ─────────────────────────────────────────────────────

    /// Evaluate several rules against one context. Output order matches
    /// `rule_ids`; rules run concurrently up to the configured limit.
    pub async fn evaluate_rules(&self, rule_ids: &[RuleId], ctx: &RuleExecutionContext) -> Vec<RuleEvaluationResult> {
        stream::iter(rule_ids.iter().map(|&id| self.evaluate_rule(id, ctx)))
            .buffered(self.config.execution.max_concurrency)
            .collect()
            .await
    }

    /// Evaluate every enabled rule of a category, in priority order.
    pub async fn evaluate_rules_by_category(
        &self,
        category: &str,
        ctx: &RuleExecutionContext,
    ) -> Vec<RuleEvaluationResult> {
        let timeout = self.config.store.timeout();
        let ids = match tokio::time::timeout(timeout, self.loader.applicable_rule_ids(category)).await {
            Ok(Ok(ids)) => ids,
            Ok(Err(e)) => return vec![self.pipeline_error(category, format!("failed to list category '{category}': {e}"))],
            Err(_) => {
                return vec![self.pipeline_error(
                    category,
                    format!("listing category '{category}' timed out after {}ms", timeout.as_millis()),
                )]
            }
        };
        debug!(category, rules = ids.len(), "evaluating category");
        self.evaluate_rules(&ids, ctx).await
    }

    /// Evaluate the applicable rules for each context and flatten the
    /// results. Each context's results keep rule order, and contexts keep
    /// input order.
    pub async fn batch_evaluate_rules(&self, contexts: &[RuleExecutionContext]) -> Vec<RuleEvaluationResult> {
        let per_context: Vec<Vec<RuleEvaluationResult>> = stream::iter(contexts.iter().map(|ctx| async move {
            match self.get_applicable_rules(ctx).await {
                Ok(ids) => self.evaluate_rules(&ids, ctx).await,
                Err(e) => vec![self.pipeline_error("", format!("failed to resolve rules for user {}: {e}", ctx.user_id))],
            }
        }))
        .buffered(self.config.execution.max_concurrency)
        .collect()
        .await;
        per_context.into_iter().flatten().collect()
    }

    /// Enabled rules whose scope matches the context, in priority order.
    pub async fn get_applicable_rules(&self, ctx: &RuleExecutionContext) -> Result<Vec<RuleId>, LoaderError> {
        let timeout = self.config.store.timeout();
        let ids = tokio::time::timeout(timeout, self.loader.active_rule_ids())
            .await
            .map_err(|_| LoaderError::Unavailable(format!("listing rules timed out after {}ms", timeout.as_millis())))??;

        let mut applicable = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(definition) = self.load(id).await? {
                if definition.scope.matches(ctx) {
                    applicable.push(id);
                }
            }
        }
        Ok(applicable)
    }

    fn pipeline_error(&self, category: &str, message: String) -> RuleEvaluationResult {
        warn!(category, error = %message, "rule pipeline failed");
        let result = RuleEvaluationResult::error(PIPELINE_RULE_ID, message).with_rule_meta(category, 0);
        self.complete(result)
    }

    // ── Ordering ────────────────────────────────────────────────────

    pub fn sort_by_priority(&self, results: Vec<RuleEvaluationResult>) -> Vec<RuleEvaluationResult> {
        sort_by_priority(results)
    }

    pub fn resolve_overrides(&self, results: Vec<RuleEvaluationResult>) -> Vec<RuleEvaluationResult> {
        resolve_overrides(results)
    }

    // ── Cache management ────────────────────────────────────────────

    pub async fn evict_rule(&self, rule_id: RuleId) {
        self.cache.evict(rule_id).await;
        self.forget_inputs(Some(rule_id));
        self.audit.log(rule_id, LogLevel::Info, ExecutionPhase::CacheWrite, "cached results evicted");
    }

    pub async fn clear_cache(&self) {
        self.cache.evict_all().await;
        self.forget_inputs(None);
        info!("rule result cache cleared");
    }

    pub async fn apply_rule_change(&self, change: RuleChange) {
        debug!(?change, "rule changed, evicting cached results");
        self.evict_rule(change.rule_id()).await;
    }

    /// Evict cached results for every change received until the sender
    /// side closes.
    pub fn spawn_invalidation(self: &Arc<Self>, mut changes: mpsc::UnboundedReceiver<RuleChange>) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(change) = changes.recv().await {
                service.apply_rule_change(change).await;
            }
            debug!("rule change channel closed, invalidation stopped");
        })
    }

    // ── Introspection ───────────────────────────────────────────────

    pub fn statistics(&self) -> EngineStatistics {
        self.counters.snapshot(self.cache.stats(), self.executor.statistics())
    }

    pub fn reset_statistics(&self) {
        self.counters.reset();
        self.executor.reset_statistics();
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn executor(&self) -> &Arc<RuleExecutor> {
        &self.executor
    }

    pub fn validator(&self) -> &RuleValidator {
        &self.validator
    }

    pub fn evaluators(&self) -> &Arc<EvaluatorFactory> {
        &self.evaluators
    }

    pub fn calculus(&self) -> &Arc<AttendanceCalculus> {
        &self.calculus
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }
}
