use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use erpq::push::{ChannelState, Notification};

/// Console events
#[derive(Debug)]
pub enum Event {
  /// A line typed by the user
  Input(String),
  /// Stdin closed
  Eof,
  /// Message raised by a background component
  Notice(Notification),
  /// Push channel changed state
  PushState(ChannelState),
}

/// Event handler that merges stdin lines with events from background tasks
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Event>,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  pub fn new() -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    // Spawn stdin reader
    let input_tx = tx.clone();
    tokio::spawn(async move {
      let mut lines = BufReader::new(tokio::io::stdin()).lines();
      loop {
        let event = match lines.next_line().await {
          Ok(Some(line)) => Event::Input(line),
          Ok(None) => Event::Eof,
          Err(err) => {
            tracing::warn!(error = %err, "Failed to read stdin");
            Event::Eof
          }
        };
        let done = matches!(event, Event::Eof);
        if input_tx.send(event).is_err() || done {
          break;
        }
      }
    });

    Self { tx, rx }
  }

  /// Sender for background tasks
  pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
    self.tx.clone()
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
