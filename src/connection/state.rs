//! Handshake state machine

use crate::{Error, Result};

/// State of one backend connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialState {
    /// Nothing opened yet
    Start,

    /// Transport open, plaintext
    Connected,

    /// SSLRequest sent, awaiting S/N response
    Negotiating,

    /// TLS established
    Secured,

    /// Backend declined TLS (terminal)
    Rejected,

    /// Startup message relayed; ownership handed to the caller (terminal)
    Relayed,

    /// Attempt failed and the transport was closed (terminal)
    Failed,
}

impl DialState {
    /// Check if transition is valid
    pub fn can_transition_to(&self, next: DialState) -> bool {
        use DialState::*;

        matches!(
            (self, next),
            (Start, Connected)
                | (Connected, Negotiating)
                | (Connected, Relayed)
                | (Negotiating, Secured)
                | (Negotiating, Rejected)
                | (Secured, Relayed)
                | (Start | Connected | Negotiating | Secured, Failed)
        )
    }

    /// Transition to new state
    pub fn transition(&mut self, next: DialState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(Error::InvalidState {
                expected: format!("valid transition from {:?}", self),
                actual: format!("{:?}", next),
            });
        }
        *self = next;
        Ok(())
    }

    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Relayed | Self::Failed)
    }
}

impl std::fmt::Display for DialState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Connected => write!(f, "connected"),
            Self::Negotiating => write!(f, "negotiating"),
            Self::Secured => write!(f, "secured"),
            Self::Rejected => write!(f, "rejected"),
            Self::Relayed => write!(f, "relayed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
