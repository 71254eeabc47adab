//! Uniform error type for backend calls.

use crate::cache::Domain;

/// Failure of a backend request.
///
/// `Clone` so one failed request can be reported to every reader that was
/// waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
  #[error("{message} (HTTP {status})")]
  Status { status: u16, message: String },
  #[error("request timed out")]
  Timeout,
  #[error("transport error: {0}")]
  Transport(String),
  #[error("invalid response: {0}")]
  Decode(String),
  #[error("client configuration error: {0}")]
  Config(String),
  #[error("{0} is read-only")]
  ReadOnly(Domain),
}

impl ApiError {
  pub fn status(&self) -> Option<u16> {
    match self {
      ApiError::Status { status, .. } => Some(*status),
      _ => None,
    }
  }

  pub fn is_unauthorized(&self) -> bool {
    matches!(self.status(), Some(401 | 403))
  }
}

impl From<reqwest::Error> for ApiError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_timeout() {
      ApiError::Timeout
    } else if err.is_decode() {
      ApiError::Decode(err.to_string())
    } else {
      ApiError::Transport(err.to_string())
    }
  }
}

impl From<serde_json::Error> for ApiError {
  fn from(err: serde_json::Error) -> Self {
    ApiError::Decode(err.to_string())
  }
}
