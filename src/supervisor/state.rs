//! Connection state machine.

use serde::{Deserialize, Serialize};

/// Current state of a supervised PPP link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Failed(i32),
    Disconnected,
}

impl ConnectionState {
    /// Returns true for the two terminal-failure-free live states.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

/// State machine tracking the lifecycle of one supervised link.
#[derive(Debug, Clone)]
pub struct LinkStateMachine {
    state: ConnectionState,
    connect_attempts: usize,
    disconnects: usize,
}

impl Default for LinkStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkStateMachine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Idle,
            connect_attempts: 0,
            disconnects: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn transition(&mut self, new_state: ConnectionState) {
        tracing::debug!(from = ?self.state, to = ?new_state, "Link state transition");
        self.state = new_state;
    }

    pub fn record_connect_attempt(&mut self) {
        self.connect_attempts = self.connect_attempts.saturating_add(1);
    }

    pub fn record_disconnect(&mut self) {
        self.disconnects = self.disconnects.saturating_add(1);
    }

    #[must_use]
    pub fn stats(&self) -> LinkStats {
        LinkStats {
            connect_attempts: self.connect_attempts,
            disconnects: self.disconnects,
        }
    }
}

/// Lifetime counters for one supervised link.
#[derive(Debug, Clone, Copy)]
pub struct LinkStats {
    pub connect_attempts: usize,
    pub disconnects: usize,
}
