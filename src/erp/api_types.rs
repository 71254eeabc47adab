//! Serde types for request and response bodies of the ERP backend.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::cache::{CacheKey, Domain};

/// Error body returned by the backend on non-2xx responses.
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
  pub message: Option<String>,
  pub error: Option<String>,
}

impl ApiErrorBody {
  pub fn into_message(self) -> Option<String> {
    self
      .message
      .or(self.error)
      .filter(|m| !m.trim().is_empty())
  }
}

/// Paging and filtering for collection reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
  pub page: Option<u32>,
  pub limit: Option<u32>,
  pub search: Option<String>,
  pub filters: BTreeMap<String, String>,
}

impl ListQuery {
  pub fn page(mut self, page: u32) -> Self {
    self.page = Some(page);
    self
  }

  pub fn limit(mut self, limit: u32) -> Self {
    self.limit = Some(limit);
    self
  }

  pub fn search(mut self, search: impl Into<String>) -> Self {
    self.search = Some(search.into());
    self
  }

  pub fn filter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.filters.insert(name.into(), value.into());
    self
  }

  /// Query-string pairs, in a stable order.
  pub fn to_pairs(&self) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    if let Some(page) = self.page {
      pairs.push(("page".to_string(), page.to_string()));
    }
    if let Some(limit) = self.limit {
      pairs.push(("limit".to_string(), limit.to_string()));
    }
    if let Some(search) = &self.search {
      pairs.push(("search".to_string(), search.clone()));
    }
    pairs.extend(self.filters.iter().map(|(k, v)| (k.clone(), v.clone())));
    pairs
  }

  pub fn cache_key(&self, domain: Domain) -> CacheKey {
    CacheKey::domain(domain).with_params(self.to_pairs())
  }
}

/// Signed-in user as far as the client is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
  pub user: Option<String>,
  pub role: String,
}

impl Session {
  pub fn new(user: Option<String>, role: impl Into<String>) -> Self {
    Self {
      user,
      role: role.into(),
    }
  }

  pub fn has_role(&self, role: &str) -> bool {
    self.role.eq_ignore_ascii_case(role)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
  Approved,
  Rejected,
}

/// Body of `POST /expenses/{id}/review`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseReview {
  pub status: ReviewStatus,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub comment: Option<String>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_list_query_keys_differ_by_parameters() {
    let first = ListQuery::default().page(1).cache_key(Domain::Jobs);
    let second = ListQuery::default().page(2).cache_key(Domain::Jobs);
    assert_ne!(first, second);
    assert_eq!(first.tag(), second.tag());
    assert_eq!(
      ListQuery::default().cache_key(Domain::Jobs),
      CacheKey::domain(Domain::Jobs)
    );
  }

  #[test]
  fn test_list_query_pairs() {
    let query = ListQuery::default()
      .page(3)
      .limit(20)
      .search("tower")
      .filter("status", "open");
    assert_eq!(
      query.to_pairs(),
      vec![
        ("page".to_string(), "3".to_string()),
        ("limit".to_string(), "20".to_string()),
        ("search".to_string(), "tower".to_string()),
        ("status".to_string(), "open".to_string()),
      ]
    );
  }

  #[test]
  fn test_error_body_message() {
    let body: ApiErrorBody = serde_json::from_str(r#"{"error": "Not allowed"}"#).unwrap();
    assert_eq!(body.into_message().as_deref(), Some("Not allowed"));
    let body: ApiErrorBody = serde_json::from_str(r#"{"message": " "}"#).unwrap();
    assert_eq!(body.into_message(), None);
  }

  #[test]
  fn test_session_role_check_ignores_case() {
    assert!(Session::new(None, "Admin").has_role("admin"));
    assert!(!Session::new(None, "manager").has_role("admin"));
  }

  #[test]
  fn test_review_serializes_lowercase() {
    let review = ExpenseReview {
      status: ReviewStatus::Approved,
      comment: None,
    };
    assert_eq!(
      serde_json::to_string(&review).unwrap(),
      r#"{"status":"approved"}"#
    );
  }
}
