//! Driver session
//!
//! Handle and transaction bookkeeping shared by the two strategies and the
//! self-contained SQLite connection. This is the single place where driver
//! errors are re-wrapped into [`EngineError`] and where the connection state
//! machine advances.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::engine::config::{ConnectionConfig, ConnectionOptions};
use crate::engine::drivers::DriverHandle;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::registry::DriverRegistry;
use crate::engine::sql_safety::is_select;
use crate::engine::state::ConnectionState;
use crate::engine::types::{QueryOutput, Value};

/// One driver handle plus its connection state
pub struct DriverSession {
    registry: Arc<DriverRegistry>,
    handle: Option<Box<dyn DriverHandle>>,
    state: ConnectionState,
}

impl DriverSession {
    pub fn new(registry: Arc<DriverRegistry>) -> Self {
        Self {
            registry,
            handle: None,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// True while a handle is held, without probing it
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    pub fn in_transaction(&self) -> bool {
        self.state.in_transaction()
    }

    /// Resolves the driver for `config` and opens a handle.
    ///
    /// Any failure, including an unknown driver, is a `Connection` error.
    pub async fn open(
        &mut self,
        config: &ConnectionConfig,
        options: &ConnectionOptions,
    ) -> EngineResult<()> {
        if self.handle.is_some() {
            debug!("Session already open");
            return Ok(());
        }

        let driver = self.registry.resolve(config.driver())?;
        let uri = config.connection_uri();
        debug!(driver = driver.driver_id(), uri = %config.redacted_uri(), "Opening driver connection");

        match driver.open(&uri, options).await {
            Ok(handle) => {
                self.handle = Some(handle);
                self.state.transition(ConnectionState::Connected)
            }
            Err(e) => {
                error!(uri = %config.redacted_uri(), error = %e, "Failed to connect to database");
                Err(EngineError::connection_failed_with(
                    format!("Failed to connect to {}: {}", config.redacted_uri(), e),
                    e,
                ))
            }
        }
    }

    /// Drops any open transaction and closes the handle.
    ///
    /// The session is disconnected afterwards even when the driver reports
    /// a close error.
    pub async fn close(&mut self) -> EngineResult<()> {
        let handle = self.handle.take();
        if self.state.in_transaction() {
            warn!("Closing connection with an open transaction; it will be rolled back");
        }
        self.state.transition(ConnectionState::Disconnected)?;

        match handle {
            Some(handle) => handle.close().await.map_err(|e| {
                error!(error = %e, "Error closing database connection");
                EngineError::connection_failed_with(format!("Error closing database connection: {}", e), e)
            }),
            None => Ok(()),
        }
    }

    fn handle_mut(&mut self) -> EngineResult<&mut Box<dyn DriverHandle>> {
        self.handle.as_mut().ok_or_else(EngineError::not_connected)
    }

    /// Executes one statement and shapes its result.
    pub async fn execute(&mut self, sql: &str, params: &[Value]) -> EngineResult<QueryOutput> {
        let handle = self.handle_mut()?;
        debug!(sql, params = params.len(), "Executing query");

        let raw = handle.execute(sql, params).await.map_err(|e| {
            error!(error = %e, "Error executing query");
            EngineError::query_failed(format!("Error executing query: {}", e), e)
        })?;

        if is_select(sql) {
            Ok(QueryOutput::Rows(raw.into_rows()))
        } else {
            Ok(QueryOutput::Raw(raw))
        }
    }

    /// Runs the driver's trivial query. Errors read as `false`.
    pub async fn probe(&mut self) -> bool {
        let Some(handle) = self.handle.as_mut() else {
            return false;
        };
        let sql = handle.liveness_query();
        match handle.execute(sql, &[]).await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "Liveness probe failed");
                false
            }
        }
    }

    pub async fn begin(&mut self) -> EngineResult<()> {
        if self.handle.is_none() {
            return Err(EngineError::not_connected());
        }
        if self.state.in_transaction() {
            return Err(EngineError::transaction_error(
                "A transaction is already active on this connection",
            ));
        }

        self.handle_mut()?.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transaction");
            EngineError::transaction_failed(format!("Failed to begin transaction: {}", e), e)
        })?;
        self.state.transition(ConnectionState::InTransaction)?;
        debug!("Transaction started");
        Ok(())
    }

    pub async fn commit(&mut self) -> EngineResult<()> {
        if !self.state.in_transaction() {
            return Err(EngineError::transaction_error("No active transaction to commit"));
        }

        self.handle_mut()?.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit transaction");
            EngineError::transaction_failed(format!("Failed to commit transaction: {}", e), e)
        })?;
        self.state.transition(ConnectionState::Connected)?;
        debug!("Transaction committed");
        Ok(())
    }

    pub async fn rollback(&mut self) -> EngineResult<()> {
        if !self.state.in_transaction() {
            return Err(EngineError::transaction_error("No active transaction to rollback"));
        }

        self.handle_mut()?.rollback().await.map_err(|e| {
            error!(error = %e, "Failed to rollback transaction");
            EngineError::transaction_failed(format!("Failed to rollback transaction: {}", e), e)
        })?;
        self.state.transition(ConnectionState::Connected)?;
        debug!("Transaction rolled back");
        Ok(())
    }
}
