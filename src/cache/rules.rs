//! Static invalidation rules: which cache tags a successful mutation makes stale.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::key::{Domain, KeyPattern};
use super::store::CacheStore;

/// Kind of write performed against a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
  Create,
  Update,
  Delete,
}

impl Operation {
  pub const ALL: [Operation; 3] = [Operation::Create, Operation::Update, Operation::Delete];
}

impl fmt::Display for Operation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Operation::Create => "create",
      Operation::Update => "update",
      Operation::Delete => "delete",
    })
  }
}

/// A write that the backend confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutationEvent {
  pub domain: Domain,
  pub operation: Operation,
}

impl MutationEvent {
  pub fn new(domain: Domain, operation: Operation) -> Self {
    Self { domain, operation }
  }
}

/// Immutable mapping from mutation to the patterns it invalidates.
///
/// Dependencies on aggregate views are declared here explicitly; nothing is
/// inferred from names. Build one with [`RuleTable::builder`] or use
/// [`RuleTable::standard`].
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
  rules: HashMap<MutationEvent, Vec<KeyPattern>>,
}

impl RuleTable {
  pub fn builder() -> RuleTableBuilder {
    RuleTableBuilder::default()
  }

  /// Patterns to drop after `event`. Empty for mutations without a rule.
  pub fn patterns(&self, event: &MutationEvent) -> &[KeyPattern] {
    self.rules.get(event).map(Vec::as_slice).unwrap_or(&[])
  }

  /// All rules, ordered by domain then operation.
  pub fn iter(&self) -> impl Iterator<Item = (&MutationEvent, &[KeyPattern])> {
    let mut rules: Vec<_> = self.rules.iter().collect();
    rules.sort_by_key(|(event, _)| (event.domain, event.operation));
    rules
      .into_iter()
      .map(|(event, patterns)| (event, patterns.as_slice()))
  }

  /// The rule set of the ERP front end.
  ///
  /// Every writable domain drops its own tag on any write, plus the views
  /// that embed or summarize its data.
  pub fn standard() -> Self {
    use Domain::*;

    let dependents: &[(Domain, &[Domain])] = &[
      (Customers, &[Jobs, Dashboard]),
      (Jobs, &[Dashboard]),
      (Teams, &[Users]),
      (Users, &[Teams]),
      (Roles, &[Permissions, Users]),
      (Permissions, &[Roles]),
      (Expenses, &[ExpenseDashboard, Dashboard]),
      (Inventory, &[Dashboard]),
      (EricssonPurchaseOrders, &[EricssonInvoices, Dashboard]),
      (HuaweiPurchaseOrders, &[HuaweiInvoices, Dashboard]),
      (ZtePurchaseOrders, &[ZteInvoices, Dashboard]),
      (EricssonRateCards, &[EricssonPurchaseOrders]),
      (HuaweiRateCards, &[HuaweiPurchaseOrders]),
      (ZteRateCards, &[ZtePurchaseOrders]),
      (EricssonInvoices, &[EricssonPurchaseOrders, Dashboard]),
      (HuaweiInvoices, &[HuaweiPurchaseOrders, Dashboard]),
      (ZteInvoices, &[ZtePurchaseOrders, Dashboard]),
    ];

    let mut builder = Self::builder();
    for (domain, also) in dependents {
      for operation in Operation::ALL {
        builder = builder.rule(*domain, operation, std::iter::once(domain).chain(also.iter()));
      }
    }
    builder.build()
  }
}

#[derive(Debug, Default)]
pub struct RuleTableBuilder {
  rules: HashMap<MutationEvent, Vec<KeyPattern>>,
}

impl RuleTableBuilder {
  /// Declare that `operation` on `domain` invalidates `patterns`.
  /// Repeated declarations accumulate; duplicates are dropped.
  pub fn rule<I, P>(mut self, domain: Domain, operation: Operation, patterns: I) -> Self
  where
    I: IntoIterator<Item = P>,
    P: Into<KeyPattern>,
  {
    let entry = self
      .rules
      .entry(MutationEvent::new(domain, operation))
      .or_default();
    for pattern in patterns {
      let pattern = pattern.into();
      if !entry.contains(&pattern) {
        entry.push(pattern);
      }
    }
    self
  }

  pub fn build(self) -> RuleTable {
    RuleTable { rules: self.rules }
  }
}

/// Applies the rule table to the cache after confirmed mutations.
#[derive(Clone)]
pub struct InvalidationDispatcher {
  store: Arc<CacheStore>,
  rules: Arc<RuleTable>,
}

impl InvalidationDispatcher {
  pub fn new(store: Arc<CacheStore>, rules: Arc<RuleTable>) -> Self {
    Self { store, rules }
  }

  pub fn rules(&self) -> &RuleTable {
    &self.rules
  }

  /// Invalidate every pattern declared for `event`, each exactly once.
  /// Returns the number of cache entries removed.
  pub fn dispatch(&self, event: MutationEvent) -> usize {
    let patterns = self.rules.patterns(&event);
    if patterns.is_empty() {
      tracing::warn!(domain = %event.domain, operation = %event.operation, "No invalidation rule declared");
      return 0;
    }

    let removed: usize = patterns
      .iter()
      .map(|pattern| self.store.invalidate(pattern))
      .sum();
    tracing::debug!(
      domain = %event.domain,
      operation = %event.operation,
      patterns = patterns.len(),
      removed,
      "Dispatched invalidation"
    );
    removed
  }
}
