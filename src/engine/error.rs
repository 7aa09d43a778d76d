//! Engine error taxonomy
//!
//! Every failure that crosses a strategy or connection boundary is one of the
//! variants below. Driver and tunnel errors are boxed into `source` so callers
//! can still walk the chain, but no vendor error type leaks as the top-level
//! error.

use thiserror::Error;

/// Boxed error used by the driver and tunnel capabilities.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type EngineResult<T> = Result<T, EngineError>;

/// Flat classification of [`EngineError`] for catch sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    Query,
    Transaction,
    Configuration,
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// Connect/disconnect failures and "not connected" preconditions.
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The SSH tunnel capability is not installed on this host.
    #[error("SSH tunnel provider unavailable: {message}")]
    TunnelUnavailable { message: String },

    /// Statement execution failures.
    #[error("Query error: {message}")]
    Query {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Begin/commit/rollback failures and wrapped transactional work.
    #[error("Transaction error: {message}")]
    Transaction {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Invalid identifiers, missing parameters, unsupported combinations.
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl EngineError {
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    pub fn connection_failed_with(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn not_connected() -> Self {
        Self::connection_failed("Not connected to database")
    }

    pub fn tunnel_unavailable(message: impl Into<String>) -> Self {
        Self::TunnelUnavailable {
            message: message.into(),
        }
    }

    pub fn query_failed(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Query {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn transaction_error(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
            source: None,
        }
    }

    pub fn transaction_failed(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Transaction {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } | Self::TunnelUnavailable { .. } => ErrorKind::Connection,
            Self::Query { .. } => ErrorKind::Query,
            Self::Transaction { .. } => ErrorKind::Transaction,
            Self::Configuration { .. } => ErrorKind::Configuration,
        }
    }

    pub fn is_connection(&self) -> bool {
        self.kind() == ErrorKind::Connection
    }

    pub fn is_query(&self) -> bool {
        self.kind() == ErrorKind::Query
    }

    pub fn is_transaction(&self) -> bool {
        self.kind() == ErrorKind::Transaction
    }

    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }
}
