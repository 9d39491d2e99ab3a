use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_usize(profile: &str, key: &str, default: usize) -> usize {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Engine config ─────────────────────────────────────────────

/// Runtime knobs for the rule engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Active profile name (empty = default).
    pub profile: String,
    pub cache: CacheConfig,
    pub store: StoreConfig,
    pub execution: ExecutionConfig,
    pub audit: AuditConfig,
}

impl EngineConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `ATTEND_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("ATTEND_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            cache: CacheConfig::from_env_profiled(p),
            store: StoreConfig::from_env_profiled(p),
            execution: ExecutionConfig::from_env_profiled(p),
            audit: AuditConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Reject values that would make the engine unusable.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.cache.capacity == 0 {
            return Err(CoreError::InvalidConfig {
                key: "ATTEND_CACHE_CAPACITY".to_string(),
                value: "0".to_string(),
            });
        }
        if self.execution.max_concurrency == 0 {
            return Err(CoreError::InvalidConfig {
                key: "ATTEND_MAX_CONCURRENCY".to_string(),
                value: "0".to_string(),
            });
        }
        if self.store.timeout_ms == 0 {
            return Err(CoreError::InvalidConfig {
                key: "ATTEND_STORE_TIMEOUT_MS".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Engine config loaded (profile: {}):", self.profile_label());
        tracing::info!("  cache:      ttl={}s, capacity={}", self.cache.ttl_secs, self.cache.capacity);
        tracing::info!("  store:      timeout={}ms, rules_dir={}", self.store.timeout_ms, self.store.rules_dir.display());
        tracing::info!(
            "  execution:  async_timeout={}ms, max_concurrency={}",
            self.execution.async_timeout_ms,
            self.execution.max_concurrency
        );
        tracing::info!("  audit:      max_entries_per_rule={}", self.audit.max_entries_per_rule);
    }
}

// ── Cache ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Lifetime of a cached evaluation result, in both tiers.
    pub ttl_secs: u64,
    /// Maximum number of entries in the process-local tier.
    pub capacity: usize,
}

impl CacheConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            ttl_secs: profiled_env_u64(p, "ATTEND_CACHE_TTL_SECS", 300),
            capacity: profiled_env_usize(p, "ATTEND_CACHE_CAPACITY", 10_000),
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 300, capacity: 10_000 }
    }
}

// ── Rule store ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Upper bound for every rule-store and distributed-cache call.
    pub timeout_ms: u64,
    /// Directory scanned by the filesystem rule loader.
    pub rules_dir: PathBuf,
}

impl StoreConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            timeout_ms: profiled_env_u64(p, "ATTEND_STORE_TIMEOUT_MS", 2_000),
            rules_dir: PathBuf::from(profiled_env_or(p, "ATTEND_RULES_DIR", "data/rules")),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { timeout_ms: 2_000, rules_dir: PathBuf::from("data/rules") }
    }
}

// ── Execution ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Default deadline for asynchronously scheduled executions.
    pub async_timeout_ms: u64,
    /// Number of items a batch operation runs concurrently.
    pub max_concurrency: usize,
}

impl ExecutionConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            async_timeout_ms: profiled_env_u64(p, "ATTEND_ASYNC_TIMEOUT_MS", 5_000),
            max_concurrency: profiled_env_usize(p, "ATTEND_MAX_CONCURRENCY", 8),
        }
    }

    pub fn async_timeout(&self) -> Duration {
        Duration::from_millis(self.async_timeout_ms)
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self { async_timeout_ms: 5_000, max_concurrency: 8 }
    }
}

// ── Audit log ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub max_entries_per_rule: usize,
}

impl AuditConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            max_entries_per_rule: profiled_env_usize(p, "ATTEND_AUDIT_MAX_ENTRIES", 500),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { max_entries_per_rule: 500 }
    }
}
