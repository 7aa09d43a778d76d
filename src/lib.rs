// dbconnector - Unified multi-database connection layer
// Core library

//! One connection interface over PostgreSQL, MySQL, Oracle, SQL Server and
//! SQLite, reached directly or through an SSH tunnel, with a transaction
//! facade that rolls back on failure.
//!
//! ```ignore
//! use dbconnector::{ConnectionConfig, ConnectionFactory, Connector, StrategyKind, Vendor};
//!
//! let factory = ConnectionFactory::new();
//! let config = ConnectionConfig::new("db.internal", 5432, "app", "secret", "orders");
//! let mut connector = Connector::new(factory.create_connection(
//!     Vendor::Postgres,
//!     StrategyKind::Remote,
//!     config,
//!     None,
//! )?);
//!
//! connector.connect().await?;
//! connector
//!     .execute_transaction(&[
//!         ("INSERT INTO audit (event) VALUES ($1)", vec!["login".into()]),
//!         ("UPDATE users SET last_seen = now() WHERE id = $1", vec![42.into()]),
//!     ])
//!     .await?;
//! connector.close().await?;
//! ```

pub mod connections;
pub mod connector;
pub mod engine;
pub mod factory;
pub mod observability;
pub mod profile;

#[cfg(test)]
mod testing;

pub use connections::{
    MsSqlConnection, MySqlConnection, OracleConnection, PostgresConnection, SqliteConnection,
};
pub use connector::Connector;
pub use engine::{
    ConnectionConfig, ConnectionOptions, ConnectionState, ConnectionStrategy, DatabaseConnection,
    EngineError, EngineResult, ErrorKind, OptionValue, QueryOutput, RawResult, Row, SshAuth,
    StrategyKind, TunnelConfig, TunnelSettings, Value, Vendor,
};
pub use factory::ConnectionFactory;
pub use profile::ConnectionProfile;
