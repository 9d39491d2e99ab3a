//! Two-tier cache of evaluation results.
//!
//! The local tier is an LRU map guarded by a mutex; the optional
//! distributed tier is reached through [`DistributedCache`] with every
//! call bounded by the store timeout. Distributed failures degrade to a
//! miss and are logged, never surfaced.
//!
//! Distributed entries carry their absolute expiry, so a promoted entry
//! lives in the local tier only as long as it has left remotely. Keys
//! this node wrote or read remotely are tracked in a second LRU of the
//! same capacity for eviction; keys pushed out of it are left to the
//! distributed tier's own TTL.

mod backend;
mod fingerprint;

use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use attend_core::config::CacheConfig;
use attend_core::RuleId;
use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::schema::{RuleEvaluationResult, RuleExecutionContext};

pub use backend::{CacheError, DistributedCache, MemoryDistributedCache};
pub use fingerprint::{cache_key, fingerprint};

struct LocalEntry {
    rule_id: RuleId,
    result: RuleEvaluationResult,
    expires_at: Instant,
}

/// Payload stored in the distributed tier.
#[derive(Serialize, Deserialize)]
struct RemoteEntry {
    expires_at: DateTime<Utc>,
    result: RuleEvaluationResult,
}

impl RemoteEntry {
    /// Time left before expiry; `None` once expired.
    fn remaining(&self) -> Option<Duration> {
        (self.expires_at - Utc::now()).to_std().ok().filter(|left| !left.is_zero())
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    pub local_hits: u64,
    pub remote_hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub local_entries: usize,
    pub tracked_remote_keys: usize,
}

#[derive(Default)]
struct Counters {
    local_hits: AtomicU64,
    remote_hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

pub struct RuleCache {
    local: Mutex<LruCache<String, LocalEntry>>,
    /// Distributed keys this node knows about, so `evict` can reach them.
    remote_keys: Mutex<LruCache<String, RuleId>>,
    remote: Option<Arc<dyn DistributedCache>>,
    ttl: Duration,
    op_timeout: Duration,
    counters: Counters,
}

impl RuleCache {
    pub fn new(config: &CacheConfig, op_timeout: Duration) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            local: Mutex::new(LruCache::new(capacity)),
            remote_keys: Mutex::new(LruCache::new(capacity)),
            remote: None,
            ttl: config.ttl(),
            op_timeout,
            counters: Counters::default(),
        }
    }

    pub fn with_distributed(mut self, remote: Arc<dyn DistributedCache>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub async fn get(
        &self,
        rule_id: RuleId,
        inputs: Option<&BTreeSet<String>>,
        ctx: &RuleExecutionContext,
    ) -> Option<RuleEvaluationResult> {
        let key = cache_key(rule_id, inputs, ctx);

        if let Some(hit) = self.get_local(&key) {
            self.counters.local_hits.fetch_add(1, Ordering::Relaxed);
            debug!(rule_id, "cache hit (local)");
            return Some(hit);
        }

        if let Some((hit, remaining)) = self.get_remote(&key).await {
            self.counters.remote_hits.fetch_add(1, Ordering::Relaxed);
            debug!(rule_id, remaining_ms = remaining.as_millis() as u64, "cache hit (distributed)");
            self.track_remote(rule_id, &key);
            self.put_local(rule_id, key, hit.clone(), remaining.min(self.ttl));
            return Some(hit);
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a result. `ERROR` results are refused; returns whether the
    /// result was stored.
    pub async fn put(
        &self,
        rule_id: RuleId,
        inputs: Option<&BTreeSet<String>>,
        ctx: &RuleExecutionContext,
        result: &RuleEvaluationResult,
    ) -> bool {
        if !result.evaluation_result.is_cacheable() {
            return false;
        }
        let key = cache_key(rule_id, inputs, ctx);
        self.put_local(rule_id, key.clone(), result.clone(), self.ttl);
        self.counters.writes.fetch_add(1, Ordering::Relaxed);

        if let Some(remote) = &self.remote {
            match self.encode_remote(result) {
                Ok(raw) => {
                    self.track_remote(rule_id, &key);
                    if let Err(e) = self.bounded("set", remote.set(&key, raw, self.ttl)).await {
                        warn!(rule_id, error = %e, "distributed cache write failed");
                    }
                }
                Err(e) => warn!(rule_id, error = %e, "cache entry not serializable"),
            }
        }
        true
    }

    /// Drop every cached result of one rule from both tiers.
    pub async fn evict(&self, rule_id: RuleId) {
        {
            let mut local = self.local.lock().expect("cache lock poisoned");
            let stale: Vec<String> =
                local.iter().filter(|(_, entry)| entry.rule_id == rule_id).map(|(key, _)| key.clone()).collect();
            for key in &stale {
                local.pop(key);
            }
        }
        let keys: Vec<String> = {
            let mut tracked = self.remote_keys.lock().expect("cache lock poisoned");
            let keys: Vec<String> =
                tracked.iter().filter(|(_, id)| **id == rule_id).map(|(key, _)| key.clone()).collect();
            for key in &keys {
                tracked.pop(key);
            }
            keys
        };
        self.delete_remote(keys).await;
        debug!(rule_id, "rule cache evicted");
    }

    pub async fn evict_all(&self) {
        self.local.lock().expect("cache lock poisoned").clear();
        let keys: Vec<String> = {
            let mut tracked = self.remote_keys.lock().expect("cache lock poisoned");
            let keys: Vec<String> = tracked.iter().map(|(key, _)| key.clone()).collect();
            tracked.clear();
            keys
        };
        self.delete_remote(keys).await;
        debug!("rule cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            local_hits: self.counters.local_hits.load(Ordering::Relaxed),
            remote_hits: self.counters.remote_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            local_entries: self.local.lock().expect("cache lock poisoned").len(),
            tracked_remote_keys: self.remote_keys.lock().expect("cache lock poisoned").len(),
        }
    }

    // ── Internals ───────────────────────────────────────────────────

    fn get_local(&self, key: &str) -> Option<RuleEvaluationResult> {
        let mut local = self.local.lock().expect("cache lock poisoned");
        let expired = match local.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => return Some(entry.result.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            local.pop(key);
        }
        None
    }

    fn put_local(&self, rule_id: RuleId, key: String, result: RuleEvaluationResult, ttl: Duration) {
        let entry = LocalEntry { rule_id, result, expires_at: Instant::now() + ttl };
        self.local.lock().expect("cache lock poisoned").put(key, entry);
    }

    fn track_remote(&self, rule_id: RuleId, key: &str) {
        if self.remote.is_some() {
            self.remote_keys.lock().expect("cache lock poisoned").put(key.to_string(), rule_id);
        }
    }

    fn encode_remote(&self, result: &RuleEvaluationResult) -> Result<String, CacheError> {
        let ttl = chrono::Duration::from_std(self.ttl).map_err(|e| CacheError::Backend(e.to_string()))?;
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .ok_or_else(|| CacheError::Backend(format!("ttl of {}s overflows", self.ttl.as_secs())))?;
        Ok(serde_json::to_string(&RemoteEntry { expires_at, result: result.clone() })?)
    }

    async fn get_remote(&self, key: &str) -> Option<(RuleEvaluationResult, Duration)> {
        let remote = self.remote.as_ref()?;
        match self.bounded("get", remote.get(key)).await {
            Ok(Some(raw)) => match serde_json::from_str::<RemoteEntry>(&raw) {
                Ok(entry) => {
                    let remaining = entry.remaining()?;
                    Some((entry.result, remaining))
                }
                Err(e) => {
                    warn!(key, error = %e, "discarding undecodable distributed cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "distributed cache read failed");
                None
            }
        }
    }

    async fn delete_remote(&self, keys: Vec<String>) {
        let Some(remote) = &self.remote else {
            return;
        };
        for key in keys {
            if let Err(e) = self.bounded("delete", remote.delete(&key)).await {
                warn!(key = %key, error = %e, "distributed cache delete failed");
            }
        }
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl std::future::Future<Output = Result<T, CacheError>>,
    ) -> Result<T, CacheError> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout { op, timeout_ms: self.op_timeout.as_millis() as u64 }),
        }
    }
}
