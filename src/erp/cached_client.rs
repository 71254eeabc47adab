//! Cached ERP client that wraps ErpClient with transparent caching.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::cache::{
  CacheKey, CacheResult, CacheStore, Domain, InvalidationDispatcher, MutationEvent, Operation,
  QueryClient, RuleTable,
};

use super::api_types::{ExpenseReview, ListQuery};
use super::client::ErpClient;
use super::error::ApiError;

/// ERP client with transparent caching support.
///
/// Reads are answered from the shared cache when fresh. Writes go straight to
/// the backend and, once it confirms them, drop every cache entry the rule
/// table declares for that mutation.
#[derive(Clone)]
pub struct CachedErpClient {
  inner: ErpClient,
  cache: QueryClient<ApiError>,
  dispatcher: InvalidationDispatcher,
}

impl CachedErpClient {
  pub fn new(inner: ErpClient, store: Arc<CacheStore>, rules: Arc<RuleTable>) -> Self {
    let cache = QueryClient::new(Arc::clone(&store));
    let dispatcher = InvalidationDispatcher::new(store, rules);
    Self {
      inner,
      cache,
      dispatcher,
    }
  }

  pub fn inner(&self) -> &ErpClient {
    &self.inner
  }

  pub fn cache(&self) -> &QueryClient<ApiError> {
    &self.cache
  }

  pub fn dispatcher(&self) -> &InvalidationDispatcher {
    &self.dispatcher
  }

  /// List a collection, cached per domain and query parameters.
  pub async fn list(&self, domain: Domain, query: &ListQuery) -> Result<CacheResult<Value>, ApiError> {
    let key = query.cache_key(domain);
    self
      .cache
      .fetch(&key, || {
        let inner = self.inner.clone();
        let query = query.clone();
        async move { inner.list(domain, &query).await }
      })
      .await
  }

  /// List a collection, falling back to stale data when the backend is unreachable.
  pub async fn list_or_stale(
    &self,
    domain: Domain,
    query: &ListQuery,
  ) -> Result<CacheResult<Value>, ApiError> {
    let key = query.cache_key(domain);
    self
      .cache
      .fetch_or_stale(&key, || {
        let inner = self.inner.clone();
        let query = query.clone();
        async move { inner.list(domain, &query).await }
      })
      .await
  }

  /// Typed variant of [`list`](Self::list).
  pub async fn list_as<T: DeserializeOwned>(
    &self,
    domain: Domain,
    query: &ListQuery,
  ) -> Result<CacheResult<Vec<T>>, ApiError> {
    self
      .list(domain, query)
      .await?
      .try_map(|data| serde_json::from_value(data).map_err(ApiError::from))
  }

  /// Get a single entity by id with caching.
  pub async fn get(&self, domain: Domain, id: &str) -> Result<CacheResult<Value>, ApiError> {
    let key = CacheKey::entity(domain, id);
    self
      .cache
      .fetch(&key, || {
        let inner = self.inner.clone();
        let id = id.to_string();
        async move { inner.get(domain, &id).await }
      })
      .await
  }

  pub async fn create<B>(&self, domain: Domain, body: &B) -> Result<Value, ApiError>
  where
    B: Serialize + ?Sized,
  {
    self
      .mutate(domain, Operation::Create, self.inner.create(domain, body))
      .await
  }

  pub async fn update<B>(&self, domain: Domain, id: &str, body: &B) -> Result<Value, ApiError>
  where
    B: Serialize + ?Sized,
  {
    self
      .mutate(domain, Operation::Update, self.inner.update(domain, id, body))
      .await
  }

  pub async fn delete(&self, domain: Domain, id: &str) -> Result<Value, ApiError> {
    self
      .mutate(domain, Operation::Delete, self.inner.delete(domain, id))
      .await
  }

  /// Approve or reject an expense. Counts as an update of the expenses domain.
  pub async fn review_expense(&self, id: &str, review: &ExpenseReview) -> Result<Value, ApiError> {
    self
      .mutate(
        Domain::Expenses,
        Operation::Update,
        self.inner.action(Domain::Expenses, id, "review", review),
      )
      .await
  }

  /// Run a write and invalidate only if the backend confirmed it.
  async fn mutate<Fut>(&self, domain: Domain, operation: Operation, write: Fut) -> Result<Value, ApiError>
  where
    Fut: Future<Output = Result<Value, ApiError>>,
  {
    if domain.is_aggregate() {
      return Err(ApiError::ReadOnly(domain));
    }

    let response = write.await?;
    let removed = self
      .dispatcher
      .dispatch(MutationEvent::new(domain, operation));
    tracing::info!(%domain, %operation, removed, "Mutation confirmed");
    Ok(response)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::CacheSource;
  use crate::config::ApiConfig;
  use crate::erp::api_types::ReviewStatus;
  use crate::erp::stub::StubServer;
  use serde::Deserialize;
  use serde_json::json;

  fn cached_client(base_url: &str) -> (CachedErpClient, Arc<CacheStore>) {
    let config = ApiConfig {
      base_url: base_url.to_string(),
      ws_url: None,
      request_timeout_secs: 5,
    };
    let store = Arc::new(CacheStore::default());
    let client = CachedErpClient::new(
      ErpClient::new(&config, Some("token".to_string())).unwrap(),
      Arc::clone(&store),
      Arc::new(RuleTable::standard()),
    );
    (client, store)
  }

  #[tokio::test]
  async fn test_second_read_is_served_from_cache() {
    let server = StubServer::start(|_| (200, r#"[{"id":"j1"}]"#.to_string())).await;
    let (erp, _) = cached_client(&server.base_url);

    let first = erp.list(Domain::Jobs, &ListQuery::default()).await.unwrap();
    let second = erp.list(Domain::Jobs, &ListQuery::default()).await.unwrap();

    assert_eq!(first.source, CacheSource::Network);
    assert_eq!(second.source, CacheSource::CacheFresh);
    assert_eq!(first.data, second.data);
    assert_eq!(server.requests().len(), 1);
  }

  #[tokio::test]
  async fn test_expense_update_invalidates_list_and_dashboard() {
    let server = StubServer::start(|req| match req.path.as_str() {
      "/api/dashboard/expenses" => (200, r#"{"total": 120}"#.to_string()),
      _ => (200, r#"[{"id":"e1"}]"#.to_string()),
    })
    .await;
    let (erp, store) = cached_client(&server.base_url);

    erp.list(Domain::Expenses, &ListQuery::default()).await.unwrap();
    erp
      .list(Domain::ExpenseDashboard, &ListQuery::default())
      .await
      .unwrap();
    assert_eq!(store.len(), 2);

    erp
      .update(Domain::Expenses, "e1", &json!({"amount": 40}))
      .await
      .unwrap();

    assert_eq!(store.get(&CacheKey::domain(Domain::Expenses)), None);
    assert_eq!(store.get(&CacheKey::domain(Domain::ExpenseDashboard)), None);

    let refetched = erp.list(Domain::Expenses, &ListQuery::default()).await.unwrap();
    assert_eq!(refetched.source, CacheSource::Network);
  }

  #[tokio::test]
  async fn test_failed_mutation_skips_invalidation() {
    let server = StubServer::start(|req| match req.method.as_str() {
      "GET" => (200, "[]".to_string()),
      _ => (422, r#"{"message":"Invalid team"}"#.to_string()),
    })
    .await;
    let (erp, store) = cached_client(&server.base_url);

    erp.list(Domain::Teams, &ListQuery::default()).await.unwrap();
    let err = erp
      .create(Domain::Teams, &json!({"name": ""}))
      .await
      .unwrap_err();

    assert_eq!(err.status(), Some(422));
    assert!(store.get(&CacheKey::domain(Domain::Teams)).is_some());
  }

  #[tokio::test]
  async fn test_review_expense_posts_review_and_invalidates() {
    let server = StubServer::start(|_| (200, "{}".to_string())).await;
    let (erp, store) = cached_client(&server.base_url);
    store.set(CacheKey::entity(Domain::Expenses, "12"), json!({"id": "12"}));
    store.set(CacheKey::domain(Domain::Dashboard), json!({}));

    let review = ExpenseReview {
      status: ReviewStatus::Rejected,
      comment: Some("missing receipt".to_string()),
    };
    erp.review_expense("12", &review).await.unwrap();

    let request = &server.requests()[0];
    assert_eq!(request.path, "/api/expenses/12/review");
    assert_eq!(
      serde_json::from_str::<Value>(&request.body).unwrap(),
      json!({"status": "rejected", "comment": "missing receipt"})
    );
    assert!(store.is_empty());
  }

  #[tokio::test]
  async fn test_aggregates_are_read_only() {
    let server = StubServer::start(|_| (200, "{}".to_string())).await;
    let (erp, _) = cached_client(&server.base_url);

    let err = erp.create(Domain::Dashboard, &json!({})).await.unwrap_err();
    assert_eq!(err, ApiError::ReadOnly(Domain::Dashboard));
    assert!(server.requests().is_empty());
  }

  #[tokio::test]
  async fn test_timeout_fails_read_and_leaves_cache_untouched() {
    // Accepts connections and never answers.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      let mut held = Vec::new();
      while let Ok((socket, _)) = listener.accept().await {
        held.push(socket);
      }
    });

    let config = ApiConfig {
      base_url: format!("http://{}/api", addr),
      ws_url: None,
      request_timeout_secs: 1,
    };
    let store = Arc::new(CacheStore::default());
    let erp = CachedErpClient::new(
      ErpClient::new(&config, None).unwrap(),
      Arc::clone(&store),
      Arc::new(RuleTable::standard()),
    );
    store.set(CacheKey::entity(Domain::Jobs, "1"), json!({"id": "1"}));

    let err = erp.list(Domain::Jobs, &ListQuery::default()).await.unwrap_err();

    assert_eq!(err, ApiError::Timeout);
    assert_eq!(store.keys(), vec![CacheKey::entity(Domain::Jobs, "1")]);
    assert_eq!(erp.cache().in_flight(), 0);
  }

  #[tokio::test]
  async fn test_list_as_decodes_entities() {
    #[derive(Debug, Deserialize, PartialEq)]
    struct Customer {
      id: u32,
      name: String,
    }

    let server =
      StubServer::start(|_| (200, r#"[{"id":1,"name":"Acme","city":"Oslo"}]"#.to_string())).await;
    let (erp, _) = cached_client(&server.base_url);

    let customers = erp
      .list_as::<Customer>(Domain::Customers, &ListQuery::default())
      .await
      .unwrap();
    assert_eq!(
      customers.data,
      vec![Customer {
        id: 1,
        name: "Acme".to_string()
      }]
    );
  }
}
