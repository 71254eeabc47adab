//! In-memory cache store with per-entry staleness and lazy garbage collection.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use super::key::{CacheKey, Domain, KeyPattern};

/// How long entries of a domain stay fresh and how long they survive unused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifetimes {
  pub stale_after: Duration,
  pub gc_after: Duration,
}

impl Default for Lifetimes {
  fn default() -> Self {
    Self {
      stale_after: Duration::from_secs(5 * 60),
      gc_after: Duration::from_secs(10 * 60),
    }
  }
}

/// Lifetimes applied to new entries, with optional per-domain overrides.
#[derive(Debug, Clone, Default)]
pub struct CachePolicy {
  default: Lifetimes,
  overrides: HashMap<Domain, Lifetimes>,
}

impl CachePolicy {
  pub fn new(default: Lifetimes) -> Self {
    Self {
      default,
      overrides: HashMap::new(),
    }
  }

  pub fn with_override(mut self, domain: Domain, lifetimes: Lifetimes) -> Self {
    self.overrides.insert(domain, lifetimes);
    self
  }

  pub fn lifetimes_for(&self, domain: Domain) -> Lifetimes {
    self.overrides.get(&domain).copied().unwrap_or(self.default)
  }
}

/// A cached value and the bookkeeping needed to expire it.
#[derive(Debug, Clone)]
pub struct CacheEntry {
  pub key: CacheKey,
  pub value: Value,
  pub fetched_at: Instant,
  pub last_accessed: Instant,
  pub stale_after: Duration,
  pub gc_after: Duration,
}

impl CacheEntry {
  pub fn age(&self) -> Duration {
    self.fetched_at.elapsed()
  }

  pub fn is_fresh(&self, now: Instant) -> bool {
    now.saturating_duration_since(self.fetched_at) < self.stale_after
  }

  fn is_collectable(&self, now: Instant) -> bool {
    now.saturating_duration_since(self.last_accessed) >= self.gc_after
  }
}

/// Counters exposed for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
  pub hits: u64,
  pub misses: u64,
  pub invalidated: u64,
  pub cleared: u64,
  pub evicted: u64,
}

#[derive(Default)]
struct Inner {
  entries: HashMap<CacheKey, CacheEntry>,
  stats: CacheStats,
}

impl Inner {
  /// Drop entries that nobody touched within their gc window.
  fn sweep(&mut self, now: Instant) {
    let before = self.entries.len();
    self.entries.retain(|_, entry| !entry.is_collectable(now));
    let evicted = before - self.entries.len();
    if evicted > 0 {
      tracing::debug!(evicted, "Collected unused cache entries");
      self.stats.evicted += evicted as u64;
    }
  }
}

/// Process-wide cache of backend reads.
///
/// Operations never fail. Concurrent writers to one key resolve last-write-wins:
/// the backend is the source of truth and the store is only an optimization.
pub struct CacheStore {
  inner: Mutex<Inner>,
  policy: CachePolicy,
}

impl CacheStore {
  pub fn new(policy: CachePolicy) -> Self {
    Self {
      inner: Mutex::new(Inner::default()),
      policy,
    }
  }

  pub fn policy(&self) -> &CachePolicy {
    &self.policy
  }

  // A panic while holding the lock cannot leave the map half-updated, so poisoning is ignored.
  fn lock(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Return the value for `key` if it is present and still fresh.
  pub fn get(&self, key: &CacheKey) -> Option<Value> {
    self.get_entry(key).map(|entry| entry.value)
  }

  /// Like [`get`](Self::get), but returns the whole entry.
  pub fn get_entry(&self, key: &CacheKey) -> Option<CacheEntry> {
    let now = Instant::now();
    let mut inner = self.lock();
    inner.sweep(now);

    let fresh = match inner.entries.get_mut(key) {
      Some(entry) => {
        entry.last_accessed = now;
        entry.is_fresh(now).then(|| entry.clone())
      }
      None => None,
    };

    if fresh.is_some() {
      inner.stats.hits += 1;
      tracing::trace!(%key, "Cache hit");
    } else {
      inner.stats.misses += 1;
      tracing::trace!(%key, "Cache miss");
    }
    fresh
  }

  /// Return the entry for `key` whether or not it is stale.
  pub fn peek(&self, key: &CacheKey) -> Option<CacheEntry> {
    let now = Instant::now();
    let mut inner = self.lock();
    inner.sweep(now);
    inner.entries.get_mut(key).map(|entry| {
      entry.last_accessed = now;
      entry.clone()
    })
  }

  /// Insert or overwrite the entry for `key`, stamped with the current time.
  pub fn set(&self, key: CacheKey, value: Value) {
    let now = Instant::now();
    let lifetimes = self.policy.lifetimes_for(key.tag());
    let mut inner = self.lock();
    inner.sweep(now);
    tracing::trace!(%key, "Cache set");
    inner.entries.insert(
      key.clone(),
      CacheEntry {
        key,
        value,
        fetched_at: now,
        last_accessed: now,
        stale_after: lifetimes.stale_after,
        gc_after: lifetimes.gc_after,
      },
    );
  }

  /// Remove every entry matching `pattern`. Returns how many were removed.
  pub fn invalidate(&self, pattern: &KeyPattern) -> usize {
    let mut inner = self.lock();
    let before = inner.entries.len();
    inner.entries.retain(|key, _| !pattern.matches(key));
    let removed = before - inner.entries.len();
    inner.stats.invalidated += removed as u64;
    tracing::debug!(%pattern, removed, "Invalidated cache entries");
    removed
  }

  /// Remove every entry. Returns how many were removed.
  pub fn clear(&self) -> usize {
    let mut inner = self.lock();
    let removed = inner.entries.len();
    inner.entries.clear();
    inner.stats.cleared += removed as u64;
    tracing::info!(removed, "Cleared cache");
    removed
  }

  pub fn len(&self) -> usize {
    self.lock().entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn stats(&self) -> CacheStats {
    self.lock().stats
  }

  /// Snapshot of the cached keys, sorted by their display form.
  pub fn keys(&self) -> Vec<CacheKey> {
    let mut keys: Vec<CacheKey> = self.lock().entries.keys().cloned().collect();
    keys.sort_by_key(|k| k.to_string());
    keys
  }
}

impl Default for CacheStore {
  fn default() -> Self {
    Self::new(CachePolicy::default())
  }
}
