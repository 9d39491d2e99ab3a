//! Engine-level evaluation counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::cache::CacheStats;
use crate::executor::ExecutorStatistics;
use crate::schema::EvaluationOutcome;

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatistics {
    pub total_evaluations: u64,
    pub cache_hits: u64,
    pub validations: u64,
    pub success_count: u64,
    pub failed_count: u64,
    pub error_count: u64,
    pub total_evaluation_time_ms: u64,
    /// Over evaluations that missed the cache.
    pub avg_evaluation_time_ms: f64,
    pub cache: CacheStats,
    pub executor: ExecutorStatistics,
}

#[derive(Default)]
pub(super) struct EngineCounters {
    evaluations: AtomicU64,
    cache_hits: AtomicU64,
    validations: AtomicU64,
    success: AtomicU64,
    failed: AtomicU64,
    errors: AtomicU64,
    timed: AtomicU64,
    total_time_ms: AtomicU64,
}

impl EngineCounters {
    pub(super) fn cache_hit(&self, outcome: EvaluationOutcome) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        self.outcome(outcome);
    }

    pub(super) fn validation(&self) {
        self.validations.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn evaluated(&self, outcome: EvaluationOutcome, duration_ms: u64) {
        self.timed.fetch_add(1, Ordering::Relaxed);
        self.total_time_ms.fetch_add(duration_ms, Ordering::Relaxed);
        self.outcome(outcome);
    }

    fn outcome(&self, outcome: EvaluationOutcome) {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            EvaluationOutcome::Success => &self.success,
            EvaluationOutcome::Failed => &self.failed,
            EvaluationOutcome::Error => &self.errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn snapshot(&self, cache: CacheStats, executor: ExecutorStatistics) -> EngineStatistics {
        let timed = self.timed.load(Ordering::Relaxed);
        let total_time_ms = self.total_time_ms.load(Ordering::Relaxed);
        EngineStatistics {
            total_evaluations: self.evaluations.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            validations: self.validations.load(Ordering::Relaxed),
            success_count: self.success.load(Ordering::Relaxed),
            failed_count: self.failed.load(Ordering::Relaxed),
            error_count: self.errors.load(Ordering::Relaxed),
            total_evaluation_time_ms: total_time_ms,
            avg_evaluation_time_ms: if timed == 0 { 0.0 } else { total_time_ms as f64 / timed as f64 },
            cache,
            executor,
        }
    }

    pub(super) fn reset(&self) {
        for counter in [
            &self.evaluations,
            &self.cache_hits,
            &self.validations,
            &self.success,
            &self.failed,
            &self.errors,
            &self.timed,
            &self.total_time_ms,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
