//! Connection state machine

use crate::{Error, Result};

/// Lifecycle state of a broker connection handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// TCP connect and TLS handshake in progress
    Connecting,

    /// Secured transport established
    Open,

    /// Shutdown in progress
    Closing,

    /// Closed
    Closed,
}

impl ConnectionState {
    /// Check if transition is valid
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (Connecting, Open) | (Open, Closing) | (Closing, Closed) | (_, Closed)
        )
    }

    /// Transition to new state
    pub fn transition(&mut self, next: ConnectionState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(Error::Transport(format!(
                "invalid connection state transition from {} to {}",
                self, next
            )));
        }
        *self = next;
        Ok(())
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        let mut state = ConnectionState::Connecting;
        assert!(state.transition(ConnectionState::Open).is_ok());
        assert!(state.transition(ConnectionState::Closing).is_ok());
        assert!(state.transition(ConnectionState::Closed).is_ok());
    }

    #[test]
    fn test_invalid_transition() {
        let mut state = ConnectionState::Connecting;
        assert!(state.transition(ConnectionState::Closing).is_err());
        assert_eq!(state, ConnectionState::Connecting);
    }

    #[test]
    fn test_close_from_any_state() {
        let mut state = ConnectionState::Connecting;
        assert!(state.transition(ConnectionState::Closed).is_ok());
    }

    #[test]
    fn test_closed_is_terminal() {
        let mut state = ConnectionState::Closed;
        assert!(state.transition(ConnectionState::Open).is_err());
        assert!(state.transition(ConnectionState::Closed).is_ok());
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectionState::Open.to_string(), "open");
        assert_eq!(ConnectionState::Closed.to_string(), "closed");
    }
}
