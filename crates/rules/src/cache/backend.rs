//! Distributed cache contract and an in-process implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cache {op} timed out after {timeout_ms}ms")]
    Timeout { op: &'static str, timeout_ms: u64 },
}

/// Shared cache tier (Redis or similar). Values are opaque strings.
#[async_trait]
pub trait DistributedCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// `DistributedCache` held in process memory, with TTL expiry and an
/// availability switch for exercising backend outages.
#[derive(Debug)]
pub struct MemoryDistributedCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
    available: AtomicBool,
}

impl Default for MemoryDistributedCache {
    fn default() -> Self {
        Self { entries: Mutex::new(HashMap::new()), available: AtomicBool::new(true) }
    }
}

impl MemoryDistributedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .values()
            .filter(|(_, expires_at)| *expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<(), CacheError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::Backend("backend unavailable".to_string()))
        }
    }
}

#[async_trait]
impl DistributedCache for MemoryDistributedCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.check_available()?;
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.check_available()?;
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.check_available()?;
        self.entries.lock().expect("cache lock poisoned").remove(key);
        Ok(())
    }
}
