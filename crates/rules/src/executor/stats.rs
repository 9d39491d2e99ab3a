//! Running execution statistics.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cumulative counters since creation or the last reset.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExecutorStatistics {
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub total_execution_time_ms: u64,
    pub min_execution_time_ms: Option<u64>,
    pub max_execution_time_ms: Option<u64>,
    /// `total_execution_time_ms / total_executions`, computed on read.
    pub avg_execution_time_ms: f64,
    pub action_type_counts: BTreeMap<String, u64>,
    pub last_execution_time: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub(super) struct StatsRecorder {
    inner: Mutex<ExecutorStatistics>,
}

impl StatsRecorder {
    pub(super) fn record(&self, action_type: &str, duration_ms: u64, success: bool) {
        let mut stats = self.inner.lock().expect("stats lock poisoned");
        stats.total_executions += 1;
        if success {
            stats.successful_executions += 1;
        } else {
            stats.failed_executions += 1;
        }
        stats.total_execution_time_ms += duration_ms;
        stats.min_execution_time_ms = Some(stats.min_execution_time_ms.map_or(duration_ms, |m| m.min(duration_ms)));
        stats.max_execution_time_ms = Some(stats.max_execution_time_ms.map_or(duration_ms, |m| m.max(duration_ms)));
        *stats.action_type_counts.entry(action_type.to_string()).or_default() += 1;
        stats.last_execution_time = Some(Utc::now());
    }

    pub(super) fn snapshot(&self) -> ExecutorStatistics {
        let mut stats = self.inner.lock().expect("stats lock poisoned").clone();
        if stats.total_executions > 0 {
            stats.avg_execution_time_ms = stats.total_execution_time_ms as f64 / stats.total_executions as f64;
        }
        stats
    }

    pub(super) fn reset(&self) {
        *self.inner.lock().expect("stats lock poisoned") = ExecutorStatistics::default();
    }
}
