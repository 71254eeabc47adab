//! Push channel driver: connects, reacts to `cache:clear`, reconnects forever.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::cache::CacheStore;

use super::message::PushMessage;
use super::state::{ChannelState, ChannelStateMachine};
use super::{Notification, Notifier, PushError};

/// Text frames received from the server. The stream ends when the server closes.
pub type FrameStream = BoxStream<'static, Result<String, PushError>>;

/// Opens connections to the push endpoint.
pub trait Connector: Send + Sync + 'static {
  fn connect(&self) -> BoxFuture<'_, Result<FrameStream, PushError>>;
}

/// Best-effort subscription to server broadcasts.
///
/// A missed `cache:clear` only delays convergence: entries still go stale
/// on their own, so the channel never gives up and never surfaces errors
/// beyond a warning after repeated failures.
pub struct PushChannel<C> {
  connector: C,
  store: Arc<CacheStore>,
  notifier: Arc<dyn Notifier>,
  reconnect_delay: Duration,
  notify_after_failures: u32,
  state_tx: watch::Sender<ChannelState>,
}

impl<C: Connector> PushChannel<C> {
  pub fn new(connector: C, store: Arc<CacheStore>, notifier: Arc<dyn Notifier>) -> Self {
    let (state_tx, _) = watch::channel(ChannelState::Disconnected);
    Self {
      connector,
      store,
      notifier,
      reconnect_delay: Duration::from_secs(5),
      notify_after_failures: 5,
      state_tx,
    }
  }

  pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
    self.reconnect_delay = delay;
    self
  }

  /// Warn the user once this many connection attempts in a row have failed.
  /// Zero disables the warning.
  pub fn with_notify_after_failures(mut self, attempts: u32) -> Self {
    self.notify_after_failures = attempts;
    self
  }

  /// Watch connection state changes.
  pub fn subscribe(&self) -> watch::Receiver<ChannelState> {
    self.state_tx.subscribe()
  }

  pub fn spawn(self) -> JoinHandle<()> {
    tokio::spawn(self.run())
  }

  /// Drive the channel for the life of the process.
  pub async fn run(self) {
    let mut machine = ChannelStateMachine::new(self.reconnect_delay);

    loop {
      self.advance(&mut machine, ChannelStateMachine::begin_connect);
      tracing::debug!("Connecting push channel");

      match self.connector.connect().await {
        Ok(mut frames) => {
          self.advance(&mut machine, ChannelStateMachine::connected);
          tracing::info!("Push channel connected");

          while let Some(frame) = frames.next().await {
            match frame {
              Ok(text) => self.handle_frame(&text),
              Err(err) => {
                tracing::warn!(error = %err, "Push channel error");
                break;
              }
            }
          }
          tracing::info!("Push channel closed");
        }
        Err(err) => {
          tracing::warn!(error = %err, "Push channel connection failed");
        }
      }

      let reconnect = machine.disconnected();
      self.state_tx.send_replace(machine.state());

      if self.notify_after_failures > 0 && reconnect.failed_attempts == self.notify_after_failures {
        self.notifier.notify(Notification::warning(format!(
          "Live updates unavailable after {} attempts, still retrying",
          reconnect.failed_attempts
        )));
      }

      tracing::debug!(
        delay_ms = reconnect.delay.as_millis() as u64,
        failed_attempts = reconnect.failed_attempts,
        "Scheduling push channel reconnect"
      );
      tokio::time::sleep(reconnect.delay).await;
    }
  }

  fn advance<F, E>(&self, machine: &mut ChannelStateMachine, transition: F)
  where
    F: FnOnce(&mut ChannelStateMachine) -> Result<ChannelState, E>,
    E: std::fmt::Display,
  {
    if let Err(err) = transition(machine) {
      tracing::error!(error = %err, "Push channel state machine out of sync");
    }
    self.state_tx.send_replace(machine.state());
  }

  fn handle_frame(&self, text: &str) {
    match PushMessage::decode(text) {
      Ok(PushMessage::CacheClear(event)) => {
        let removed = self.store.clear();
        tracing::info!(issued_at = ?event.issued_at, removed, "Cache cleared by broadcast");
        self
          .notifier
          .notify(Notification::info("Cache cleared by administrator"));
      }
      Ok(PushMessage::Other) => {
        tracing::debug!(frame = text, "Ignoring push message");
      }
      Err(err) => {
        tracing::warn!(error = %err, "Undecodable push message");
      }
    }
  }
}
