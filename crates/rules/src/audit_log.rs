//! Per-rule audit trail of evaluation pipeline phases.
//!
//! Entries are kept in memory per rule id, capped with FIFO eviction, and
//! queried newest-first.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use attend_core::RuleId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default per-rule cap.
pub const DEFAULT_MAX_ENTRIES: usize = 500;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// Pipeline phase that produced an entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    CacheCheck,
    Load,
    Validate,
    Evaluate,
    Execute,
    CacheWrite,
    Complete,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub rule_id: RuleId,
    pub level: LogLevel,
    pub phase: ExecutionPhase,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Filters for [`AuditLog::query`]. All unset means the latest 100 entries.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogQuery {
    /// Minimum level, inclusive.
    pub level: Option<LogLevel>,
    pub phase: Option<ExecutionPhase>,
    pub limit: Option<usize>,
    /// Only entries at or after this instant.
    pub since: Option<DateTime<Utc>>,
}

pub struct AuditLog {
    entries: RwLock<HashMap<RuleId, VecDeque<LogEntry>>>,
    max_entries_per_rule: usize,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }

    pub fn with_max_entries(max: usize) -> Self {
        Self { entries: RwLock::new(HashMap::new()), max_entries_per_rule: max.max(1) }
    }

    pub fn log(&self, rule_id: RuleId, level: LogLevel, phase: ExecutionPhase, message: impl Into<String>) {
        self.log_with_details(rule_id, level, phase, message, None, None);
    }

    pub fn log_with_details(
        &self,
        rule_id: RuleId,
        level: LogLevel,
        phase: ExecutionPhase,
        message: impl Into<String>,
        details: Option<Value>,
        duration_ms: Option<u64>,
    ) {
        let entry = LogEntry {
            timestamp: Utc::now(),
            rule_id,
            level,
            phase,
            message: message.into(),
            details,
            duration_ms,
        };

        let mut guard = self.entries.write().expect("audit_log lock poisoned");
        let deque = guard.entry(rule_id).or_default();
        deque.push_back(entry);
        while deque.len() > self.max_entries_per_rule {
            deque.pop_front();
        }
    }

    /// Entries for one rule, newest first.
    pub fn query(&self, rule_id: RuleId, query: &LogQuery) -> Vec<LogEntry> {
        let guard = self.entries.read().expect("audit_log lock poisoned");
        let Some(deque) = guard.get(&rule_id) else {
            return Vec::new();
        };

        deque
            .iter()
            .rev()
            .filter(|e| query.level.map_or(true, |min| e.level >= min))
            .filter(|e| query.phase.map_or(true, |p| e.phase == p))
            .filter(|e| query.since.map_or(true, |s| e.timestamp >= s))
            .take(query.limit.unwrap_or(100))
            .cloned()
            .collect()
    }

    pub fn clear(&self, rule_id: RuleId) {
        self.entries.write().expect("audit_log lock poisoned").remove(&rule_id);
    }

    pub fn clear_all(&self) {
        self.entries.write().expect("audit_log lock poisoned").clear();
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_first() {
        let log = AuditLog::new();
        log.log(1, LogLevel::Info, ExecutionPhase::CacheCheck, "miss");
        log.log(1, LogLevel::Debug, ExecutionPhase::Validate, "valid");
        log.log(1, LogLevel::Warning, ExecutionPhase::Execute, "alert failed");

        let entries = log.query(1, &LogQuery::default());
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].phase, ExecutionPhase::Execute);
        assert_eq!(entries[2].phase, ExecutionPhase::CacheCheck);
    }

    #[test]
    fn level_and_phase_filters() {
        let log = AuditLog::new();
        log.log(1, LogLevel::Debug, ExecutionPhase::Evaluate, "debug");
        log.log(1, LogLevel::Info, ExecutionPhase::Evaluate, "info");
        log.log(1, LogLevel::Warning, ExecutionPhase::Execute, "warn");
        log.log(1, LogLevel::Error, ExecutionPhase::Evaluate, "error");

        let at_least_warning = log.query(1, &LogQuery { level: Some(LogLevel::Warning), ..Default::default() });
        assert_eq!(at_least_warning.len(), 2);

        let evaluate = log.query(1, &LogQuery { phase: Some(ExecutionPhase::Evaluate), ..Default::default() });
        assert_eq!(evaluate.len(), 3);
        assert!(evaluate.iter().all(|e| e.phase == ExecutionPhase::Evaluate));
    }

    #[test]
    fn limit_and_since() {
        let log = AuditLog::new();
        for i in 0..10 {
            log.log(1, LogLevel::Info, ExecutionPhase::Complete, format!("run {i}"));
        }
        assert_eq!(log.query(1, &LogQuery { limit: Some(3), ..Default::default() }).len(), 3);

        let future = Utc::now() + chrono::Duration::hours(1);
        assert!(log.query(1, &LogQuery { since: Some(future), ..Default::default() }).is_empty());
    }

    #[test]
    fn fifo_eviction() {
        let log = AuditLog::with_max_entries(3);
        for i in 1..=4 {
            log.log(1, LogLevel::Info, ExecutionPhase::Complete, format!("msg {i}"));
        }
        let entries = log.query(1, &LogQuery::default());
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].message, "msg 4");
        assert_eq!(entries[2].message, "msg 2");
    }

    #[test]
    fn rules_are_isolated_and_clearable() {
        let log = AuditLog::new();
        log.log(1, LogLevel::Info, ExecutionPhase::Complete, "one");
        log.log_with_details(
            2,
            LogLevel::Error,
            ExecutionPhase::Execute,
            "two",
            Some(serde_json::json!({"code": "TIMEOUT"})),
            Some(150),
        );

        let two = log.query(2, &LogQuery::default());
        assert_eq!(two.len(), 1);
        assert_eq!(two[0].rule_id, 2);
        assert_eq!(two[0].duration_ms, Some(150));

        log.clear(1);
        assert!(log.query(1, &LogQuery::default()).is_empty());
        assert_eq!(log.query(2, &LogQuery::default()).len(), 1);
        log.clear_all();
        assert!(log.query(2, &LogQuery::default()).is_empty());
        assert!(log.query(99, &LogQuery::default()).is_empty());
    }
}
