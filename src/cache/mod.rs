//! Client-side query cache.
//!
//! This module provides the in-memory read cache of the ERP client:
//! - Entries keyed by resource domain plus optional id / query parameters
//! - Per-domain staleness windows and lazy collection of unused entries
//! - Coalescing of concurrent reads of the same key into one backend request
//! - A static rule table mapping mutations to the tags they invalidate

mod key;
mod layer;
mod rules;
mod store;
mod traits;

pub use key::{CacheKey, Domain, KeyPattern, UnknownDomain};
pub use layer::QueryClient;
pub use rules::{InvalidationDispatcher, MutationEvent, Operation, RuleTable, RuleTableBuilder};
pub use store::{CacheEntry, CachePolicy, CacheStats, CacheStore, Lifetimes};
pub use traits::{CacheResult, CacheSource};
