//! Push channel: server broadcasts that force every client to drop its cache.

mod channel;
mod message;
mod state;
mod ws;

pub use channel::{Connector, FrameStream, PushChannel};
pub use message::{BroadcastEvent, PushMessage};
pub use state::{ChannelState, ChannelStateMachine, InvalidTransition, Reconnect};
pub use ws::WsConnector;

#[derive(Debug, thiserror::Error)]
pub enum PushError {
  #[error("WebSocket error: {0}")]
  WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
  #[error("invalid push endpoint: {0}")]
  Config(String),
  #[error("connection closed: {0}")]
  Closed(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for PushError {
  fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
    Self::WebSocket(Box::new(err))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
  Info,
  Warning,
  Error,
}

/// A message for the user, e.g. a toast in a graphical front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub level: NotificationLevel,
  pub message: String,
}

impl Notification {
  pub fn info(message: impl Into<String>) -> Self {
    Self {
      level: NotificationLevel::Info,
      message: message.into(),
    }
  }

  pub fn warning(message: impl Into<String>) -> Self {
    Self {
      level: NotificationLevel::Warning,
      message: message.into(),
    }
  }

  pub fn error(message: impl Into<String>) -> Self {
    Self {
      level: NotificationLevel::Error,
      message: message.into(),
    }
  }
}

/// Surfaces notifications to the user.
pub trait Notifier: Send + Sync {
  fn notify(&self, notification: Notification);
}

impl<F> Notifier for F
where
  F: Fn(Notification) + Send + Sync,
{
  fn notify(&self, notification: Notification) {
    self(notification)
  }
}
