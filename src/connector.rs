//! Connector
//!
//! Transaction facade over a [`DatabaseConnection`]: batch execution in one
//! transaction, closures run inside a transaction, and scoped
//! connect/close. Any failure inside a transaction rolls it back; a failed
//! rollback is logged and never replaces the error that triggered it.
//!
//! A `Connector` has a single owner. Open one per task when work must run
//! concurrently.

use futures::future::BoxFuture;
use tracing::{debug, info, instrument, warn};

use crate::engine::error::{BoxError, EngineError, EngineResult};
use crate::engine::traits::DatabaseConnection;
use crate::engine::types::{QueryOutput, Value};

pub struct Connector {
    connection: Box<dyn DatabaseConnection>,
}

impl Connector {
    pub fn new(connection: Box<dyn DatabaseConnection>) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &dyn DatabaseConnection {
        self.connection.as_ref()
    }

    pub fn connection_mut(&mut self) -> &mut dyn DatabaseConnection {
        self.connection.as_mut()
    }

    pub fn into_inner(self) -> Box<dyn DatabaseConnection> {
        self.connection
    }

    pub async fn connect(&mut self) -> EngineResult<()> {
        self.connection.connect().await
    }

    /// Disconnects. Idempotent.
    pub async fn close(&mut self) -> EngineResult<()> {
        self.connection.disconnect().await
    }

    pub async fn execute_query(&mut self, sql: &str, params: &[Value]) -> EngineResult<QueryOutput> {
        self.connection.execute_query(sql, params).await
    }

    pub async fn is_connected(&mut self) -> bool {
        self.connection.is_connected().await
    }

    pub fn in_transaction(&self) -> bool {
        self.connection.in_transaction()
    }

    pub async fn begin_transaction(&mut self) -> EngineResult<()> {
        self.connection.begin_transaction().await
    }

    pub async fn commit(&mut self) -> EngineResult<()> {
        self.connection.commit().await
    }

    pub async fn rollback(&mut self) -> EngineResult<()> {
        self.connection.rollback().await
    }

    /// Runs `statements` in order inside one transaction.
    ///
    /// Returns one result per statement. On the first failure the
    /// transaction is rolled back and the failure comes back wrapped in a
    /// `Transaction` error.
    #[instrument(
        skip(self, statements),
        fields(vendor = %self.connection.vendor(), statements = statements.len())
    )]
    pub async fn execute_transaction(
        &mut self,
        statements: &[(&str, Vec<Value>)],
    ) -> EngineResult<Vec<QueryOutput>> {
        if !self.connection.is_connected().await {
            return Err(EngineError::not_connected());
        }

        self.connection.begin_transaction().await?;

        let mut results = Vec::with_capacity(statements.len());
        for (index, (sql, params)) in statements.iter().enumerate() {
            match self.connection.execute_query(sql, params).await {
                Ok(output) => results.push(output),
                Err(e) => {
                    self.rollback_after_failure().await;
                    return Err(EngineError::transaction_failed(
                        format!("Statement {} of {} failed: {}", index + 1, statements.len(), e),
                        e,
                    ));
                }
            }
        }

        if let Err(e) = self.connection.commit().await {
            self.rollback_after_failure().await;
            return Err(e);
        }
        debug!(statements = results.len(), "Transaction committed");
        Ok(results)
    }

    /// Runs `work` inside a transaction.
    ///
    /// Commits when `work` returns `Ok`. When it returns `Err`, the
    /// transaction is rolled back and the error is wrapped in a
    /// `Transaction` error, reachable through `source()`.
    ///
    /// ```ignore
    /// connector
    ///     .with_transaction(|conn| {
    ///         Box::pin(async move {
    ///             conn.execute_query("UPDATE accounts SET balance = balance - 10 WHERE id = $1", &[1.into()])
    ///                 .await?;
    ///             conn.execute_query("UPDATE accounts SET balance = balance + 10 WHERE id = $1", &[2.into()])
    ///                 .await?;
    ///             Ok::<_, EngineError>(())
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn with_transaction<T, E, F>(&mut self, work: F) -> EngineResult<T>
    where
        F: for<'c> FnOnce(&'c mut dyn DatabaseConnection) -> BoxFuture<'c, Result<T, E>>,
        E: Into<BoxError>,
    {
        if !self.connection.is_connected().await {
            return Err(EngineError::not_connected());
        }

        self.connection.begin_transaction().await?;

        match work(self.connection.as_mut()).await {
            Ok(value) => {
                if let Err(e) = self.connection.commit().await {
                    self.rollback_after_failure().await;
                    return Err(e);
                }
                Ok(value)
            }
            Err(e) => {
                let source: BoxError = e.into();
                self.rollback_after_failure().await;
                Err(EngineError::transaction_failed(
                    format!("Transaction rolled back: {}", source),
                    source,
                ))
            }
        }
    }

    /// Scoped acquisition: connects, runs `work`, then always closes.
    ///
    /// When `work` fails with a transaction still open, it is rolled back
    /// before closing. Rollback and close failures on the way out are only
    /// logged, so the caller sees `work`'s own result.
    pub async fn with_connection<T, E, F>(&mut self, work: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut Connector) -> BoxFuture<'c, Result<T, E>>,
        E: From<EngineError>,
    {
        self.connect().await?;

        let outcome = work(self).await;

        if outcome.is_err() {
            self.rollback_after_failure().await;
        }
        if let Err(e) = self.close().await {
            warn!(error = %e, "Failed to close connection on scope exit");
        } else {
            info!("Connection scope closed");
        }
        outcome
    }

    async fn rollback_after_failure(&mut self) {
        if !self.connection.in_transaction() {
            return;
        }
        if let Err(e) = self.connection.rollback().await {
            warn!(error = %e, "Rollback after failure did not complete");
        }
    }
}
