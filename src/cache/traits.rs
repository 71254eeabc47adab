//! Read results and their provenance.

use std::time::Duration;

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// Age of the cached data, when it did not come straight from the network
  pub age: Option<Duration>,
}

impl<T> CacheResult<T> {
  /// Fresh data fetched by this caller.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      age: None,
    }
  }

  /// Fresh data fetched by a request another caller already had in flight.
  pub fn coalesced(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Coalesced,
      age: None,
    }
  }

  /// Data served from a fresh cache entry.
  pub fn from_cache(data: T, age: Duration) -> Self {
    Self {
      data,
      source: CacheSource::CacheFresh,
      age: Some(age),
    }
  }

  /// Stale data served because the backend could not be reached.
  pub fn offline(data: T, age: Duration) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      age: Some(age),
    }
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheResult<U> {
    CacheResult {
      data: f(self.data),
      source: self.source,
      age: self.age,
    }
  }

  pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<CacheResult<U>, E> {
    Ok(CacheResult {
      data: f(self.data)?,
      source: self.source,
      age: self.age,
    })
  }
}

/// Indicates where returned data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fetched from the backend by this call
  Network,
  /// Joined a backend fetch already in flight for the same key
  Coalesced,
  /// Cache entry within its staleness window
  CacheFresh,
  /// Backend failed, serving a stale entry
  Offline,
}

impl CacheSource {
  pub fn label(self) -> &'static str {
    match self {
      CacheSource::Network => "network",
      CacheSource::Coalesced => "network (shared)",
      CacheSource::CacheFresh => "cache",
      CacheSource::Offline => "stale cache (offline)",
    }
  }
}
