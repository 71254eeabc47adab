//! Connection state machine of the push channel.

use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
  Disconnected,
  Connecting,
  Connected,
}

impl fmt::Display for ChannelState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      ChannelState::Disconnected => "disconnected",
      ChannelState::Connecting => "connecting",
      ChannelState::Connected => "connected",
    })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid push channel transition from {from} to {to}")]
pub struct InvalidTransition {
  pub from: ChannelState,
  pub to: ChannelState,
}

/// What to do after the connection went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconnect {
  pub delay: Duration,
  /// Connection attempts that failed in a row, including this one
  pub failed_attempts: u32,
}

/// `Disconnected -> Connecting -> Connected -> Disconnected`, retried forever
/// after a fixed delay.
#[derive(Debug, Clone)]
pub struct ChannelStateMachine {
  state: ChannelState,
  reconnect_delay: Duration,
  failed_attempts: u32,
}

impl ChannelStateMachine {
  pub fn new(reconnect_delay: Duration) -> Self {
    Self {
      state: ChannelState::Disconnected,
      reconnect_delay,
      failed_attempts: 0,
    }
  }

  pub fn state(&self) -> ChannelState {
    self.state
  }

  pub fn failed_attempts(&self) -> u32 {
    self.failed_attempts
  }

  pub fn begin_connect(&mut self) -> Result<ChannelState, InvalidTransition> {
    self.move_to(ChannelState::Disconnected, ChannelState::Connecting)
  }

  pub fn connected(&mut self) -> Result<ChannelState, InvalidTransition> {
    let state = self.move_to(ChannelState::Connecting, ChannelState::Connected)?;
    self.failed_attempts = 0;
    Ok(state)
  }

  /// Connection failed or closed. Always lands in `Disconnected`.
  pub fn disconnected(&mut self) -> Reconnect {
    match self.state {
      ChannelState::Connecting => self.failed_attempts += 1,
      ChannelState::Connected => self.failed_attempts = 0,
      ChannelState::Disconnected => {}
    }
    self.state = ChannelState::Disconnected;
    Reconnect {
      delay: self.reconnect_delay,
      failed_attempts: self.failed_attempts,
    }
  }

  fn move_to(
    &mut self,
    from: ChannelState,
    to: ChannelState,
  ) -> Result<ChannelState, InvalidTransition> {
    if self.state != from {
      return Err(InvalidTransition {
        from: self.state,
        to,
      });
    }
    self.state = to;
    Ok(to)
  }
}
