//! Direct strategy
//!
//! Opens the driver connection straight to the configured endpoint. A
//! remote strategy applies a default connect timeout when the caller did not
//! set one; a local one applies none.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::engine::config::{ConnectionConfig, ConnectionOptions, OptionValue, OPTION_CONNECT_TIMEOUT};
use crate::engine::error::EngineResult;
use crate::engine::registry::DriverRegistry;
use crate::engine::session::DriverSession;
use crate::engine::traits::ConnectionStrategy;
use crate::engine::types::{QueryOutput, Value};

pub struct DirectStrategy {
    config: ConnectionConfig,
    remote: bool,
    session: DriverSession,
}

impl DirectStrategy {
    /// Default `connect_timeout` for remote endpoints, in seconds
    pub const REMOTE_CONNECT_TIMEOUT_SECS: i64 = 30;

    /// Strategy for a local endpoint (no default timeout)
    pub fn new(config: ConnectionConfig, registry: Arc<DriverRegistry>) -> Self {
        Self {
            config,
            remote: false,
            session: DriverSession::new(registry),
        }
    }

    /// Strategy for a remote endpoint
    pub fn remote(config: ConnectionConfig, registry: Arc<DriverRegistry>) -> Self {
        Self {
            remote: true,
            ..Self::new(config, registry)
        }
    }

    pub fn is_remote(&self) -> bool {
        self.remote
    }

    /// Options handed to the driver
    pub fn effective_options(&self) -> ConnectionOptions {
        let mut options = self.config.connection_options();
        if self.remote {
            options
                .entry(OPTION_CONNECT_TIMEOUT.to_string())
                .or_insert(OptionValue::Int(Self::REMOTE_CONNECT_TIMEOUT_SECS));
        }
        options
    }
}

#[async_trait]
impl ConnectionStrategy for DirectStrategy {
    fn name(&self) -> &'static str {
        if self.remote {
            "remote"
        } else {
            "direct"
        }
    }

    fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    #[instrument(
        skip(self),
        fields(
            strategy = self.name(),
            driver = %self.config.driver(),
            host = %self.config.host,
            port = self.config.port
        )
    )]
    async fn connect(&mut self) -> EngineResult<()> {
        if self.session.is_open() {
            debug!("Already connected");
            return Ok(());
        }

        let options = self.effective_options();
        self.session.open(&self.config, &options).await?;
        info!(
            host = %self.config.host,
            port = self.config.port,
            "Connected to database"
        );
        Ok(())
    }

    #[instrument(skip(self), fields(strategy = self.name(), host = %self.config.host))]
    async fn disconnect(&mut self) -> EngineResult<()> {
        let was_open = self.session.is_open();
        let result = self.session.close().await;
        if was_open {
            info!(host = %self.config.host, port = self.config.port, "Disconnected from database");
        }
        result
    }

    async fn execute_query(&mut self, sql: &str, params: &[Value]) -> EngineResult<QueryOutput> {
        self.session.execute(sql, params).await
    }

    async fn is_connected(&mut self) -> bool {
        self.session.probe().await
    }

    async fn begin_transaction(&mut self) -> EngineResult<()> {
        self.session.begin().await
    }

    async fn commit(&mut self) -> EngineResult<()> {
        self.session.commit().await
    }

    async fn rollback(&mut self) -> EngineResult<()> {
        self.session.rollback().await
    }

    fn in_transaction(&self) -> bool {
        self.session.in_transaction()
    }
}
