//! Query cache and cross-session invalidation for the ERP REST backend.
//!
//! Reads go through a shared in-memory cache with per-domain staleness and
//! request coalescing. Confirmed writes invalidate every dependent query via a
//! static rule table, and an administrator can make every connected client drop
//! its cache through the push channel.

pub mod admin;
pub mod cache;
pub mod config;
pub mod erp;
pub mod push;

pub use admin::{ClearAllTrigger, TriggerError};
pub use cache::{CacheKey, CacheStore, Domain, QueryClient, RuleTable};
pub use config::Config;
pub use erp::{ApiError, CachedErpClient, ErpClient, Session};
pub use push::{PushChannel, WsConnector};
