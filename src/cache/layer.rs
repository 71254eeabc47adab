//! Cache layer that orchestrates caching logic with network fetching.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;

use super::key::{CacheKey, KeyPattern};
use super::store::CacheStore;
use super::traits::CacheResult;

type SharedFetch<E> = Shared<BoxFuture<'static, Result<Value, E>>>;
type InFlight<E> = Arc<Mutex<HashMap<CacheKey, SharedFetch<E>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cache layer that manages caching logic and network fetching.
///
/// Reads are served from the [`CacheStore`] while fresh. Otherwise the backend
/// is asked, with at most one request in flight per key: concurrent readers of
/// the same key wait on the same request and all get its result.
pub struct QueryClient<E> {
  store: Arc<CacheStore>,
  in_flight: InFlight<E>,
}

impl<E> QueryClient<E>
where
  E: Clone + Send + Sync + std::fmt::Display + 'static,
{
  pub fn new(store: Arc<CacheStore>) -> Self {
    Self {
      store,
      in_flight: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  pub fn store(&self) -> &Arc<CacheStore> {
    &self.store
  }

  /// Fetch with cache-first strategy.
  ///
  /// 1. Check cache - if fresh, return immediately
  /// 2. If a request for this key is already running, wait for it
  /// 3. Otherwise start one; on success the result is stored
  /// 4. On failure the error is returned and the cache is left untouched
  ///
  /// The request runs on its own task, so it completes and fills the cache
  /// even if every caller gives up waiting.
  pub async fn fetch<F, Fut>(&self, key: &CacheKey, fetcher: F) -> Result<CacheResult<Value>, E>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value, E>> + Send + 'static,
  {
    if let Some(entry) = self.store.get_entry(key) {
      let age = entry.age();
      return Ok(CacheResult::from_cache(entry.value, age));
    }

    let (request, started) = self.join_or_start(key, fetcher);
    let data = request.await?;

    Ok(if started {
      CacheResult::from_network(data)
    } else {
      CacheResult::coalesced(data)
    })
  }

  /// Like [`fetch`](Self::fetch), but falls back to a stale entry when the
  /// backend fails (offline mode). The error is only returned if nothing is cached.
  pub async fn fetch_or_stale<F, Fut>(
    &self,
    key: &CacheKey,
    fetcher: F,
  ) -> Result<CacheResult<Value>, E>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value, E>> + Send + 'static,
  {
    match self.fetch(key, fetcher).await {
      Ok(result) => Ok(result),
      Err(err) => match self.store.peek(key) {
        Some(entry) => {
          tracing::warn!(%key, error = %err, "Backend unavailable, serving stale entry");
          let age = entry.age();
          Ok(CacheResult::offline(entry.value, age))
        }
        None => Err(err),
      },
    }
  }

  pub fn invalidate(&self, pattern: &KeyPattern) -> usize {
    self.store.invalidate(pattern)
  }

  pub fn clear(&self) -> usize {
    self.store.clear()
  }

  /// Number of keys with a backend request currently running.
  pub fn in_flight(&self) -> usize {
    lock(&self.in_flight).len()
  }

  /// Return the running request for `key`, or start a new one.
  /// The flag is true when this call started the request.
  fn join_or_start<F, Fut>(&self, key: &CacheKey, fetcher: F) -> (SharedFetch<E>, bool)
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value, E>> + Send + 'static,
  {
    let mut in_flight = lock(&self.in_flight);
    if let Some(running) = in_flight.get(key) {
      tracing::debug!(%key, "Joining in-flight request");
      return (running.clone(), false);
    }

    tracing::debug!(%key, "Fetching from backend");
    let request = fetcher();
    let store = Arc::clone(&self.store);
    let registry = Arc::clone(&self.in_flight);
    let owned_key = key.clone();

    let shared = async move {
      let result = request.await;
      match &result {
        Ok(value) => store.set(owned_key.clone(), value.clone()),
        Err(err) => tracing::debug!(key = %owned_key, error = %err, "Fetch failed, cache untouched"),
      }
      lock(&registry).remove(&owned_key);
      result
    }
    .boxed()
    .shared();

    in_flight.insert(key.clone(), shared.clone());
    drop(in_flight);

    tokio::spawn(shared.clone());
    (shared, true)
  }
}

impl<E> Clone for QueryClient<E> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      in_flight: Arc::clone(&self.in_flight),
    }
  }
}
