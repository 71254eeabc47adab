use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::cache::Domain;
use crate::config::ApiConfig;
use crate::erp::api_types::{ApiErrorBody, ListQuery};
use crate::erp::error::ApiError;

/// ERP REST API client wrapper
#[derive(Clone)]
pub struct ErpClient {
  client: reqwest::Client,
  base_url: Url,
  token: Option<String>,
}

impl ErpClient {
  pub fn new(config: &ApiConfig, token: Option<String>) -> Result<Self, ApiError> {
    let client = reqwest::Client::builder()
      .timeout(config.request_timeout())
      .build()
      .map_err(|e| ApiError::Config(e.to_string()))?;

    let base_url = Url::parse(&config.base_url)
      .map_err(|e| ApiError::Config(format!("invalid base URL '{}': {}", config.base_url, e)))?;
    if base_url.cannot_be_a_base() {
      return Err(ApiError::Config(format!(
        "'{}' cannot be used as a base URL",
        config.base_url
      )));
    }

    Ok(Self {
      client,
      base_url,
      token,
    })
  }

  /// List a collection
  pub async fn list(&self, domain: Domain, query: &ListQuery) -> Result<Value, ApiError> {
    let url = self.url(domain.path(), &[])?;
    let request = self.request(Method::GET, url).query(&query.to_pairs());
    self.send(request).await
  }

  /// Get a single entity by id
  pub async fn get(&self, domain: Domain, id: &str) -> Result<Value, ApiError> {
    let url = self.url(domain.path(), &[id])?;
    self.send(self.request(Method::GET, url)).await
  }

  pub async fn create<B>(&self, domain: Domain, body: &B) -> Result<Value, ApiError>
  where
    B: Serialize + ?Sized,
  {
    let url = self.url(domain.path(), &[])?;
    self.send(self.request(Method::POST, url).json(body)).await
  }

  pub async fn update<B>(&self, domain: Domain, id: &str, body: &B) -> Result<Value, ApiError>
  where
    B: Serialize + ?Sized,
  {
    let url = self.url(domain.path(), &[id])?;
    self.send(self.request(Method::PUT, url).json(body)).await
  }

  pub async fn delete(&self, domain: Domain, id: &str) -> Result<Value, ApiError> {
    let url = self.url(domain.path(), &[id])?;
    self.send(self.request(Method::DELETE, url)).await
  }

  /// Resource-specific action, e.g. `POST /expenses/{id}/review`
  pub async fn action<B>(
    &self,
    domain: Domain,
    id: &str,
    action: &str,
    body: &B,
  ) -> Result<Value, ApiError>
  where
    B: Serialize + ?Sized,
  {
    let url = self.url(domain.path(), &[id, action])?;
    self.send(self.request(Method::POST, url).json(body)).await
  }

  /// Ask the backend to push `cache:clear` to every connected client.
  /// Delivery to the clients is best-effort and not acknowledged.
  pub async fn broadcast_clear(&self) -> Result<(), ApiError> {
    let url = self.url("cache/clear", &[])?;
    self.send(self.request(Method::POST, url)).await?;
    Ok(())
  }

  /// Append a collection path and encoded segments to the base URL.
  fn url(&self, path: &str, segments: &[&str]) -> Result<Url, ApiError> {
    let mut url = self.base_url.clone();
    {
      let mut parts = url
        .path_segments_mut()
        .map_err(|_| ApiError::Config("base URL cannot have a path".to_string()))?;
      parts.pop_if_empty();
      parts.extend(path.split('/'));
      parts.extend(segments);
    }
    Ok(url)
  }

  fn request(&self, method: Method, url: Url) -> RequestBuilder {
    let request = self.client.request(method, url);
    match &self.token {
      Some(token) => request.bearer_auth(token),
      None => request,
    }
  }

  async fn send(&self, request: RequestBuilder) -> Result<Value, ApiError> {
    let response = request.send().await?;
    parse_response(response).await
  }
}

async fn parse_response(response: Response) -> Result<Value, ApiError> {
  let status = response.status();
  let body = response.bytes().await?;

  if !status.is_success() {
    let err = error_from_body(status, &body);
    tracing::warn!(status = status.as_u16(), error = %err, "Backend request failed");
    return Err(err);
  }
  if body.iter().all(u8::is_ascii_whitespace) {
    return Ok(Value::Null);
  }
  Ok(serde_json::from_slice(&body)?)
}

/// Map an error response to [`ApiError::Status`], preferring the JSON `message`.
pub fn error_from_body(status: StatusCode, body: &[u8]) -> ApiError {
  let message = serde_json::from_slice::<ApiErrorBody>(body)
    .ok()
    .and_then(ApiErrorBody::into_message)
    .or_else(|| {
      let text = String::from_utf8_lossy(body).trim().to_string();
      (!text.is_empty() && text.len() <= 200 && !text.starts_with('<')).then_some(text)
    })
    .unwrap_or_else(|| {
      status
        .canonical_reason()
        .unwrap_or("Request failed")
        .to_string()
    });

  ApiError::Status {
    status: status.as_u16(),
    message,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::erp::stub::StubServer;
  use serde_json::json;

  fn client(base_url: &str, token: Option<&str>) -> ErpClient {
    let config = ApiConfig {
      base_url: base_url.to_string(),
      ws_url: None,
      request_timeout_secs: 5,
    };
    ErpClient::new(&config, token.map(String::from)).unwrap()
  }

  #[test]
  fn test_url_building() {
    let erp = client("http://erp.local/api/", None);
    assert_eq!(
      erp.url(Domain::EricssonInvoices.path(), &["INV 7"]).unwrap().as_str(),
      "http://erp.local/api/ericsson/invoices/INV%207"
    );
    assert_eq!(
      erp.url("cache/clear", &[]).unwrap().as_str(),
      "http://erp.local/api/cache/clear"
    );
  }

  #[test]
  fn test_error_from_body() {
    let err = error_from_body(StatusCode::BAD_REQUEST, br#"{"message":"Amount is required"}"#);
    assert_eq!(
      err,
      ApiError::Status {
        status: 400,
        message: "Amount is required".to_string()
      }
    );

    let err = error_from_body(StatusCode::BAD_GATEWAY, b"<html>oops</html>");
    assert_eq!(err.to_string(), "Bad Gateway (HTTP 502)");

    let err = error_from_body(StatusCode::FORBIDDEN, b"");
    assert!(err.is_unauthorized());
  }

  #[tokio::test]
  async fn test_list_sends_query_and_bearer_token() {
    let server = StubServer::start(|_| (200, r#"[{"id":1}]"#.to_string())).await;
    let erp = client(&server.base_url, Some("secret"));

    let data = erp
      .list(Domain::Jobs, &ListQuery::default().page(2).filter("status", "open"))
      .await
      .unwrap();
    assert_eq!(data, json!([{"id": 1}]));

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].path, "/api/jobs?page=2&status=open");
    assert_eq!(requests[0].header("authorization"), Some("Bearer secret"));
  }

  #[tokio::test]
  async fn test_mutations_use_rest_verbs() {
    let server = StubServer::start(|_| (200, "{}".to_string())).await;
    let erp = client(&server.base_url, None);

    erp.create(Domain::Customers, &json!({"name": "Acme"})).await.unwrap();
    erp.update(Domain::Customers, "4", &json!({"name": "Acme Ltd"})).await.unwrap();
    erp.delete(Domain::Customers, "4").await.unwrap();
    erp
      .action(Domain::Expenses, "9", "review", &json!({"status": "approved"}))
      .await
      .unwrap();

    let seen: Vec<(String, String)> = server
      .requests()
      .into_iter()
      .map(|r| (r.method, r.path))
      .collect();
    assert_eq!(
      seen,
      vec![
        ("POST".to_string(), "/api/customers".to_string()),
        ("PUT".to_string(), "/api/customers/4".to_string()),
        ("DELETE".to_string(), "/api/customers/4".to_string()),
        ("POST".to_string(), "/api/expenses/9/review".to_string()),
      ]
    );
    assert_eq!(server.requests()[0].body, r#"{"name":"Acme"}"#);
  }

  #[tokio::test]
  async fn test_broadcast_clear_accepts_empty_response() {
    let server = StubServer::start(|_| (204, String::new())).await;
    let erp = client(&server.base_url, Some("t"));

    erp.broadcast_clear().await.unwrap();
    let requests = server.requests();
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].path, "/api/cache/clear");
    assert!(requests[0].body.is_empty());
  }

  #[tokio::test]
  async fn test_error_status_is_mapped() {
    let server = StubServer::start(|_| (404, r#"{"message":"Job not found"}"#.to_string())).await;
    let erp = client(&server.base_url, None);

    let err = erp.get(Domain::Jobs, "77").await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.to_string(), "Job not found (HTTP 404)");
  }

  #[tokio::test]
  async fn test_unreachable_backend_is_transport_error() {
    let erp = client("http://127.0.0.1:9/api", None);
    let err = erp.list(Domain::Users, &ListQuery::default()).await.unwrap_err();
    assert!(matches!(err, ApiError::Transport(_) | ApiError::Timeout));
  }
}
