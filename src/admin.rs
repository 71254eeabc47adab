//! Privileged action that clears the cache of every connected client.

use std::sync::Arc;

use crate::cache::CacheStore;
use crate::erp::{ApiError, ErpClient, Session};

#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
  #[error("role '{role}' may not clear caches (requires '{required}')")]
  Forbidden { role: String, required: String },
  #[error("local cache cleared, but the broadcast failed: {0}")]
  Broadcast(#[source] ApiError),
}

/// Clears the local cache, then asks the backend to broadcast `cache:clear`.
///
/// Only sessions holding the elevated role may trigger it. A failed broadcast
/// is reported but not retried; the local clear has happened either way.
#[derive(Clone)]
pub struct ClearAllTrigger {
  client: ErpClient,
  store: Arc<CacheStore>,
  elevated_role: String,
}

impl ClearAllTrigger {
  pub fn new(client: ErpClient, store: Arc<CacheStore>, elevated_role: impl Into<String>) -> Self {
    Self {
      client,
      store,
      elevated_role: elevated_role.into(),
    }
  }

  pub fn is_permitted(&self, session: &Session) -> bool {
    session.has_role(&self.elevated_role)
  }

  /// Returns how many local entries were dropped.
  pub async fn trigger(&self, session: &Session) -> Result<usize, TriggerError> {
    if !self.is_permitted(session) {
      tracing::warn!(user = ?session.user, role = %session.role, "Refused cache clear broadcast");
      return Err(TriggerError::Forbidden {
        role: session.role.clone(),
        required: self.elevated_role.clone(),
      });
    }

    let removed = self.store.clear();
    self
      .client
      .broadcast_clear()
      .await
      .map_err(TriggerError::Broadcast)?;

    tracing::info!(user = ?session.user, removed, "Broadcast cache clear");
    Ok(removed)
  }
}
