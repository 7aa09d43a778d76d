//! Driver capability
//!
//! A driver knows how to open a single connection from a URI and a set of
//! options. The strategies and the SQLite connection only ever talk to the
//! boxed [`DriverHandle`] it returns, so every vendor error type stays behind
//! [`BoxError`] until the strategy re-wraps it.
//!
//! Bundled drivers use SQLx. Oracle and MSSQL have no bundled driver; register
//! one in the [`DriverRegistry`](crate::engine::registry::DriverRegistry).

pub mod mysql;
pub mod postgres;
pub mod sqlite;

use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::engine::config::{ConnectionOptions, OptionValue, OPTION_CONNECT_TIMEOUT};
use crate::engine::error::BoxError;
use crate::engine::types::{RawResult, Value};

/// Connection provider for one database engine
#[async_trait]
pub trait Driver: Send + Sync {
    /// Returns the unique identifier for this driver (e.g., "postgres", "mysql")
    fn driver_id(&self) -> &'static str;

    /// Returns a human-readable name for this driver
    fn driver_name(&self) -> &'static str;

    /// URI schemes (driver identifiers) served by this driver
    fn schemes(&self) -> &'static [&'static str];

    /// Opens one connection.
    ///
    /// `options` carries every configured option, recognized or not.
    async fn open(
        &self,
        uri: &str,
        options: &ConnectionOptions,
    ) -> Result<Box<dyn DriverHandle>, BoxError>;
}

/// A single live driver connection
///
/// Transactions are plain `BEGIN`/`COMMIT`/`ROLLBACK` on this connection.
/// Engines with a different syntax override the defaults.
#[async_trait]
pub trait DriverHandle: Send {
    /// Executes one statement. An empty `params` slice means no bind.
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<RawResult, BoxError>;

    /// Trivial statement used as the liveness probe
    fn liveness_query(&self) -> &'static str {
        "SELECT 1"
    }

    async fn begin(&mut self) -> Result<(), BoxError> {
        self.execute("BEGIN", &[]).await.map(|_| ())
    }

    async fn commit(&mut self) -> Result<(), BoxError> {
        self.execute("COMMIT", &[]).await.map(|_| ())
    }

    async fn rollback(&mut self) -> Result<(), BoxError> {
        self.execute("ROLLBACK", &[]).await.map(|_| ())
    }

    /// Closes the connection gracefully.
    async fn close(self: Box<Self>) -> Result<(), BoxError>;
}

/// `connect_timeout` option as a duration. Zero or unparsable means none.
pub fn connect_timeout(options: &ConnectionOptions) -> Option<Duration> {
    options
        .get(OPTION_CONNECT_TIMEOUT)
        .and_then(OptionValue::as_u64)
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

/// Runs a connect future under the configured `connect_timeout`, if any.
pub(crate) async fn with_connect_timeout<T, E, F>(
    options: &ConnectionOptions,
    connect: F,
) -> Result<T, BoxError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<BoxError>,
{
    match connect_timeout(options) {
        Some(limit) => match tokio::time::timeout(limit, connect).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(format!(
                "Connection attempt timed out after {}s",
                limit.as_secs()
            )
            .into()),
        },
        None => connect.await.map_err(Into::into),
    }
}

pub(crate) fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_micros() as f64 / 1000.0
}
