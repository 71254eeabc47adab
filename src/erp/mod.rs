pub mod api_types;
pub mod cached_client;
pub mod client;
pub mod error;
#[cfg(test)]
pub(crate) mod stub;

pub use api_types::{ExpenseReview, ListQuery, ReviewStatus, Session};
pub use cached_client::CachedErpClient;
pub use client::ErpClient;
pub use error::ApiError;
