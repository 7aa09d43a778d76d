// Vendor Connections Module
// Vendor-flavored helpers on top of a connection strategy

//! Postgres, MySQL, Oracle and MSSQL connections hold a
//! [`ConnectionStrategy`] and forward the [`DatabaseConnection`] contract to
//! it. SQLite owns its driver session directly since a local file needs
//! neither remoting nor tunneling.
//!
//! Every helper probes the connection before building SQL. Identifiers that
//! end up in statement text are validated through
//! [`sql_safety`](crate::engine::sql_safety); values are always bound.

pub mod mssql;
pub mod mysql;
pub mod oracle;
pub mod postgres;
pub mod sqlite;

pub use mssql::{MsSqlConnection, MsSqlSettings};
pub use mysql::MySqlConnection;
pub use oracle::{OracleConnection, OracleSessionInfo};
pub use postgres::{PostgresConnection, PostgresTableInfo};
pub use sqlite::SqliteConnection;

use tracing::warn;

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::DatabaseConnection;
use crate::engine::types::{Row, Value};

/// Fails with a `Connection` error unless the liveness probe succeeds.
pub(crate) async fn ensure_connected<C>(conn: &mut C) -> EngineResult<()>
where
    C: DatabaseConnection + ?Sized,
{
    if conn.is_connected().await {
        Ok(())
    } else {
        Err(EngineError::not_connected())
    }
}

/// Runs `sql` and returns its rows whatever the statement kind.
pub(crate) async fn fetch_rows<C>(conn: &mut C, sql: &str, params: &[Value]) -> EngineResult<Vec<Row>>
where
    C: DatabaseConnection + ?Sized,
{
    Ok(conn.execute_query(sql, params).await?.into_rows())
}

/// Keeps a non-critical sub-result. A failure is logged and becomes `None`.
pub(crate) fn degrade<T>(part: &str, result: EngineResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(part, error = %e, "Metadata sub-query failed; leaving it empty");
            None
        }
    }
}

/// `column` of the first row as text (case-insensitive lookup).
pub(crate) fn first_text(rows: &[Row], column: &str) -> Option<String> {
    rows.first()
        .and_then(|row| row.get_ignore_case(column))
        .and_then(Value::to_text)
}

/// Comma-separated placeholder list for `count` parameters.
pub(crate) fn placeholders(count: usize, placeholder: impl Fn(usize) -> String) -> String {
    (1..=count).map(placeholder).collect::<Vec<_>>().join(", ")
}

/// Implements [`DatabaseConnection`] for a vendor type holding a
/// `strategy: Box<dyn ConnectionStrategy>` field, plus the shared
/// constructor and accessors.
macro_rules! strategy_connection {
    ($ty:ident, $vendor:expr) => {
        impl $ty {
            pub const VENDOR: $crate::engine::types::Vendor = $vendor;

            pub fn new(strategy: Box<dyn $crate::engine::traits::ConnectionStrategy>) -> Self {
                Self { strategy }
            }

            /// Fills the `driver` option with this vendor's canonical driver
            /// unless the caller chose one.
            pub fn prepare_config(
                mut config: $crate::engine::config::ConnectionConfig,
            ) -> $crate::engine::config::ConnectionConfig {
                config.default_driver(Self::VENDOR.canonical_driver());
                config
            }

            pub fn strategy(&self) -> &dyn $crate::engine::traits::ConnectionStrategy {
                self.strategy.as_ref()
            }
        }

        #[async_trait::async_trait]
        impl $crate::engine::traits::DatabaseConnection for $ty {
            fn vendor(&self) -> $crate::engine::types::Vendor {
                Self::VENDOR
            }

            async fn connect(&mut self) -> $crate::engine::error::EngineResult<()> {
                tracing::debug!(vendor = %Self::VENDOR, strategy = self.strategy.name(), "Connecting");
                self.strategy.connect().await
            }

            async fn disconnect(&mut self) -> $crate::engine::error::EngineResult<()> {
                tracing::debug!(vendor = %Self::VENDOR, "Disconnecting");
                self.strategy.disconnect().await
            }

            async fn execute_query(
                &mut self,
                sql: &str,
                params: &[$crate::engine::types::Value],
            ) -> $crate::engine::error::EngineResult<$crate::engine::types::QueryOutput> {
                self.strategy.execute_query(sql, params).await
            }

            async fn is_connected(&mut self) -> bool {
                self.strategy.is_connected().await
            }

            async fn begin_transaction(&mut self) -> $crate::engine::error::EngineResult<()> {
                self.strategy.begin_transaction().await
            }

            async fn commit(&mut self) -> $crate::engine::error::EngineResult<()> {
                self.strategy.commit().await
            }

            async fn rollback(&mut self) -> $crate::engine::error::EngineResult<()> {
                self.strategy.rollback().await
            }

            fn in_transaction(&self) -> bool {
                self.strategy.in_transaction()
            }
        }
    };
}

pub(crate) use strategy_connection;
