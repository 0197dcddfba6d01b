//! Two-tier store: LRU in front, append-only log behind
//!
//! The LRU holds the hot working set under a strict byte budget. Entries it
//! evicts are spilled to the log; a cache miss consults the log and, on a
//! hit, rehydrates the entry through the normal insert path. The cache copy
//! is authoritative whenever both tiers hold a key; the log copy is stale
//! but harmless until the next compaction drops it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::lru::LruCache;
use crate::persist::LogStore;

/// Point-in-time counters backing the INFO command.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
  pub keys: usize,
  pub memory_used: usize,
  pub memory_limit: usize,
  pub hits: u64,
  pub misses: u64,
  pub evictions: u64,
}

/// Store operation error
#[derive(Debug, Clone)]
pub enum StoreError {
  /// The entry can never fit the configured memory limit.
  EntryTooLarge,
}

impl std::fmt::Display for StoreError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      StoreError::EntryTooLarge => write!(f, "entry too large"),
    }
  }
}

impl std::error::Error for StoreError {}

/// What the command dispatcher programs against.
#[async_trait]
pub trait CacheStore: Send + Sync {
  async fn get(&self, key: &str) -> Option<String>;
  async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
  async fn delete(&self, key: &str) -> bool;
  async fn stats(&self) -> CacheStats;
}

/// The worker's store: one [`LruCache`] plus an optional spill log.
pub struct TieredStore {
  lru: Mutex<LruCache>,
  log: Option<Arc<LogStore>>,
  hits: AtomicU64,
  misses: AtomicU64,
  evictions: AtomicU64,
}

impl TieredStore {
  /// Memory-only store; evicted entries are simply dropped.
  pub fn new(max_bytes: usize) -> Self {
    Self {
      lru: Mutex::new(LruCache::new(max_bytes)),
      log: None,
      hits: AtomicU64::new(0),
      misses: AtomicU64::new(0),
      evictions: AtomicU64::new(0),
    }
  }

  /// Store with a persistence tier behind the cache.
  pub fn with_log(max_bytes: usize, log: Arc<LogStore>) -> Self {
    Self {
      log: Some(log),
      ..Self::new(max_bytes)
    }
  }

  /// Keys currently cached in memory, most recently used first.
  pub fn cached_keys(&self) -> Vec<String> {
    self
      .lru
      .lock()
      .keys_by_recency()
      .into_iter()
      .map(String::from)
      .collect()
  }

  fn store_entry(&self, lru: &mut LruCache, key: &str, value: &str) -> Result<(), StoreError> {
    let evicted = lru.insert(key, value).map_err(|e| {
      tracing::debug!("rejecting {}: {}", key, e);
      StoreError::EntryTooLarge
    })?;

    for entry in evicted {
      self.evictions.fetch_add(1, Ordering::Relaxed);
      match &self.log {
        Some(log) => {
          if let Err(e) = log.insert(&entry.key, &entry.value) {
            // Persistence trouble degrades the operation to cache-only.
            tracing::warn!("failed to spill {} to log: {}", entry.key, e);
          }
        }
        None => tracing::trace!("evicting {} (no persistence tier)", entry.key),
      }
    }
    Ok(())
  }
}

#[async_trait]
impl CacheStore for TieredStore {
  async fn get(&self, key: &str) -> Option<String> {
    let mut lru = self.lru.lock();
    if let Some(value) = lru.get(key) {
      self.hits.fetch_add(1, Ordering::Relaxed);
      return Some(value);
    }

    if let Some(log) = &self.log {
      match log.get(key) {
        Ok(Some(value)) => {
          // Rehydrate through the normal insert path; that may in turn
          // evict the current LRU tail back out to the log.
          if self.store_entry(&mut lru, key, &value).is_err() {
            tracing::debug!("rehydrated {} does not fit the cache", key);
          }
          self.hits.fetch_add(1, Ordering::Relaxed);
          return Some(value);
        }
        Ok(None) => {}
        Err(e) => tracing::warn!("log read for {} failed: {}", key, e),
      }
    }

    self.misses.fetch_add(1, Ordering::Relaxed);
    None
  }

  async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
    let mut lru = self.lru.lock();
    self.store_entry(&mut lru, key, value)
  }

  async fn delete(&self, key: &str) -> bool {
    let cached = self.lru.lock().remove(key);
    let logged = self.log.as_ref().map(|log| log.remove(key)).unwrap_or(false);
    cached || logged
  }

  async fn stats(&self) -> CacheStats {
    let lru = self.lru.lock();
    CacheStats {
      keys: lru.len(),
      memory_used: lru.memory_usage(),
      memory_limit: lru.max_memory(),
      hits: self.hits.load(Ordering::Relaxed),
      misses: self.misses.load(Ordering::Relaxed),
      evictions: self.evictions.load(Ordering::Relaxed),
    }
  }
}
