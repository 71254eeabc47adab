//! Cache keys and the registry of resource domains.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Every resource domain the front end reads through the cache.
///
/// The tag is the canonical name used for logging, configuration overrides and
/// console commands. The path is the REST collection the domain is served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Domain {
  Customers,
  Jobs,
  Teams,
  Users,
  Roles,
  Permissions,
  Expenses,
  ExpenseDashboard,
  Inventory,
  Dashboard,
  EricssonPurchaseOrders,
  HuaweiPurchaseOrders,
  ZtePurchaseOrders,
  EricssonRateCards,
  HuaweiRateCards,
  ZteRateCards,
  EricssonInvoices,
  HuaweiInvoices,
  ZteInvoices,
}

impl Domain {
  pub const ALL: &'static [Domain] = &[
    Domain::Customers,
    Domain::Jobs,
    Domain::Teams,
    Domain::Users,
    Domain::Roles,
    Domain::Permissions,
    Domain::Expenses,
    Domain::ExpenseDashboard,
    Domain::Inventory,
    Domain::Dashboard,
    Domain::EricssonPurchaseOrders,
    Domain::HuaweiPurchaseOrders,
    Domain::ZtePurchaseOrders,
    Domain::EricssonRateCards,
    Domain::HuaweiRateCards,
    Domain::ZteRateCards,
    Domain::EricssonInvoices,
    Domain::HuaweiInvoices,
    Domain::ZteInvoices,
  ];

  pub fn tag(self) -> &'static str {
    match self {
      Domain::Customers => "customers",
      Domain::Jobs => "jobs",
      Domain::Teams => "teams",
      Domain::Users => "users",
      Domain::Roles => "roles",
      Domain::Permissions => "permissions",
      Domain::Expenses => "expenses",
      Domain::ExpenseDashboard => "expense-dashboard",
      Domain::Inventory => "inventory",
      Domain::Dashboard => "dashboard",
      Domain::EricssonPurchaseOrders => "ericsson-purchase-orders",
      Domain::HuaweiPurchaseOrders => "huawei-purchase-orders",
      Domain::ZtePurchaseOrders => "zte-purchase-orders",
      Domain::EricssonRateCards => "ericsson-rate-cards",
      Domain::HuaweiRateCards => "huawei-rate-cards",
      Domain::ZteRateCards => "zte-rate-cards",
      Domain::EricssonInvoices => "ericsson-invoices",
      Domain::HuaweiInvoices => "huawei-invoices",
      Domain::ZteInvoices => "zte-invoices",
    }
  }

  /// REST collection path, relative to the API base URL.
  pub fn path(self) -> &'static str {
    match self {
      Domain::Customers => "customers",
      Domain::Jobs => "jobs",
      Domain::Teams => "teams",
      Domain::Users => "users",
      Domain::Roles => "roles",
      Domain::Permissions => "permissions",
      Domain::Expenses => "expenses",
      Domain::ExpenseDashboard => "dashboard/expenses",
      Domain::Inventory => "inventory",
      Domain::Dashboard => "dashboard",
      Domain::EricssonPurchaseOrders => "ericsson/purchase-orders",
      Domain::HuaweiPurchaseOrders => "huawei/purchase-orders",
      Domain::ZtePurchaseOrders => "zte/purchase-orders",
      Domain::EricssonRateCards => "ericsson/rate-cards",
      Domain::HuaweiRateCards => "huawei/rate-cards",
      Domain::ZteRateCards => "zte/rate-cards",
      Domain::EricssonInvoices => "ericsson/invoices",
      Domain::HuaweiInvoices => "huawei/invoices",
      Domain::ZteInvoices => "zte/invoices",
    }
  }

  /// Aggregate views are computed by the backend and cannot be written.
  pub fn is_aggregate(self) -> bool {
    matches!(self, Domain::Dashboard | Domain::ExpenseDashboard)
  }
}

impl fmt::Display for Domain {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.tag())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown resource domain '{0}'")]
pub struct UnknownDomain(pub String);

impl FromStr for Domain {
  type Err = UnknownDomain;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let wanted = s.trim().to_lowercase().replace('_', "-");
    Domain::ALL
      .iter()
      .copied()
      .find(|d| d.tag() == wanted)
      .ok_or_else(|| UnknownDomain(s.to_string()))
  }
}

/// Identifies one cached read: a domain, optionally narrowed to a single
/// entity or a parameterized query (page, filter, ...).
///
/// Equality is structural, so two keys built from the same parts hit the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
  domain: Domain,
  id: Option<String>,
  params: BTreeMap<String, String>,
}

impl CacheKey {
  /// Key for the unparameterized collection of a domain.
  pub fn domain(domain: Domain) -> Self {
    Self {
      domain,
      id: None,
      params: BTreeMap::new(),
    }
  }

  /// Key for a single entity.
  pub fn entity(domain: Domain, id: impl Into<String>) -> Self {
    Self {
      domain,
      id: Some(id.into()),
      params: BTreeMap::new(),
    }
  }

  pub fn with_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
    self.params.insert(name.into(), value.to_string());
    self
  }

  pub fn with_params<I, K, V>(mut self, params: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
  {
    self
      .params
      .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
    self
  }

  pub fn tag(&self) -> Domain {
    self.domain
  }

  pub fn id(&self) -> Option<&str> {
    self.id.as_deref()
  }

  pub fn params(&self) -> &BTreeMap<String, String> {
    &self.params
  }
}

impl From<Domain> for CacheKey {
  fn from(domain: Domain) -> Self {
    CacheKey::domain(domain)
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.domain)?;
    if let Some(id) = &self.id {
      write!(f, "/{}", id)?;
    }
    if !self.params.is_empty() {
      let query: Vec<String> = self
        .params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
      write!(f, "?{}", query.join("&"))?;
    }
    Ok(())
  }
}

/// Selects cache entries to drop.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPattern {
  /// Exactly one key.
  Exact(CacheKey),
  /// Every key of a domain, whatever its id or parameters.
  Tag(Domain),
}

impl KeyPattern {
  pub fn matches(&self, key: &CacheKey) -> bool {
    match self {
      KeyPattern::Exact(exact) => exact == key,
      KeyPattern::Tag(domain) => key.domain == *domain,
    }
  }
}

impl From<Domain> for KeyPattern {
  fn from(domain: Domain) -> Self {
    KeyPattern::Tag(domain)
  }
}

impl From<&Domain> for KeyPattern {
  fn from(domain: &Domain) -> Self {
    KeyPattern::Tag(*domain)
  }
}

impl From<CacheKey> for KeyPattern {
  fn from(key: CacheKey) -> Self {
    KeyPattern::Exact(key)
  }
}

impl fmt::Display for KeyPattern {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      KeyPattern::Exact(key) => write!(f, "{}", key),
      KeyPattern::Tag(domain) => write!(f, "{}/*", domain),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_keys_compare_structurally() {
    let a = CacheKey::domain(Domain::Jobs)
      .with_param("page", 2)
      .with_param("status", "open");
    let b = CacheKey::domain(Domain::Jobs)
      .with_param("status", "open")
      .with_param("page", "2");
    assert_eq!(a, b);
    assert_ne!(a, CacheKey::domain(Domain::Jobs));
  }

  #[test]
  fn test_tag_pattern_matches_every_parameterization() {
    let pattern = KeyPattern::Tag(Domain::Expenses);
    assert!(pattern.matches(&CacheKey::domain(Domain::Expenses)));
    assert!(pattern.matches(&CacheKey::entity(Domain::Expenses, "42")));
    assert!(pattern.matches(&CacheKey::domain(Domain::Expenses).with_param("page", 3)));
    assert!(!pattern.matches(&CacheKey::domain(Domain::ExpenseDashboard)));
  }

  #[test]
  fn test_exact_pattern_matches_only_its_key() {
    let key = CacheKey::entity(Domain::Users, "7");
    let pattern = KeyPattern::from(key.clone());
    assert!(pattern.matches(&key));
    assert!(!pattern.matches(&CacheKey::domain(Domain::Users)));
  }

  #[test]
  fn test_domain_parsing() {
    assert_eq!("jobs".parse::<Domain>(), Ok(Domain::Jobs));
    assert_eq!(
      "Ericsson_Purchase_Orders".parse::<Domain>(),
      Ok(Domain::EricssonPurchaseOrders)
    );
    assert!("payroll".parse::<Domain>().is_err());
    for domain in Domain::ALL {
      assert_eq!(domain.tag().parse::<Domain>(), Ok(*domain));
    }
  }

  #[test]
  fn test_key_display() {
    let key = CacheKey::entity(Domain::Expenses, "9").with_param("view", "full");
    assert_eq!(key.to_string(), "expenses/9?view=full");
    assert_eq!(KeyPattern::Tag(Domain::Jobs).to_string(), "jobs/*");
  }
}
