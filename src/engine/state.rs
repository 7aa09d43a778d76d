//! Connection state machine

use std::fmt;

use crate::engine::error::{EngineError, EngineResult};

/// Connection state
///
/// `InTransaction` is only reachable from `Connected`, so a transaction can
/// never exist on a closed connection. At most one transaction is open at a
/// time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No live handle
    #[default]
    Disconnected,

    /// Live handle, autocommit
    Connected,

    /// Live handle with an open transaction
    InTransaction,
}

impl ConnectionState {
    /// Check if transition is valid
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (Disconnected, Connected)
                | (Connected, InTransaction)
                | (InTransaction, Connected)
                | (_, Disconnected)
        )
    }

    /// Transition to new state
    pub fn transition(&mut self, next: ConnectionState) -> EngineResult<()> {
        use ConnectionState::*;

        if !self.can_transition_to(next) {
            return Err(match (*self, next) {
                (Disconnected, _) => EngineError::not_connected(),
                (InTransaction, InTransaction) => {
                    EngineError::transaction_error("A transaction is already active")
                }
                (Connected, Connected) => EngineError::transaction_error("No active transaction"),
                (from, to) => EngineError::connection_failed(format!(
                    "Invalid connection state transition from {} to {}",
                    from, to
                )),
            });
        }
        *self = next;
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        !matches!(self, Self::Disconnected)
    }

    pub fn in_transaction(&self) -> bool {
        matches!(self, Self::InTransaction)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connected => write!(f, "connected"),
            Self::InTransaction => write!(f, "in_transaction"),
        }
    }
}
