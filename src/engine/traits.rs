//! Connection capability traits
//!
//! `ConnectionStrategy` owns a transport (direct TCP or SSH-tunneled) and its
//! lifecycle. `DatabaseConnection` is what application code talks to: the
//! vendor connections implement it by delegating to a held strategy, except
//! SQLite which owns its transport directly.
//!
//! Every stateful method takes `&mut self`. An instance is meant for a single
//! owner; callers that need concurrency open separate instances.

use async_trait::async_trait;

use crate::engine::config::ConnectionConfig;
use crate::engine::error::EngineResult;
use crate::engine::types::{QueryOutput, Value, Vendor};

/// Transport-level connection lifecycle
#[async_trait]
pub trait ConnectionStrategy: Send {
    /// Short name used in logs ("direct", "ssh_tunnel")
    fn name(&self) -> &'static str;

    /// The caller's config. For a tunneled strategy host and port still
    /// name the real server.
    fn config(&self) -> &ConnectionConfig;

    /// Opens the transport and the database handle.
    ///
    /// Calling this on a connected strategy is a no-op.
    async fn connect(&mut self) -> EngineResult<()>;

    /// Releases the handle (and any tunnel). Idempotent.
    async fn disconnect(&mut self) -> EngineResult<()>;

    /// Executes one statement with positional parameters.
    ///
    /// Statements starting with `SELECT` come back as
    /// [`QueryOutput::Rows`], everything else as [`QueryOutput::Raw`].
    async fn execute_query(&mut self, sql: &str, params: &[Value]) -> EngineResult<QueryOutput>;

    /// Liveness probe. Never fails; any error reads as `false`.
    async fn is_connected(&mut self) -> bool;

    async fn begin_transaction(&mut self) -> EngineResult<()>;

    async fn commit(&mut self) -> EngineResult<()>;

    async fn rollback(&mut self) -> EngineResult<()>;

    /// True while a transaction opened by `begin_transaction` is pending.
    fn in_transaction(&self) -> bool;
}

/// Vendor-facing connection contract
#[async_trait]
pub trait DatabaseConnection: Send {
    fn vendor(&self) -> Vendor;

    async fn connect(&mut self) -> EngineResult<()>;

    async fn disconnect(&mut self) -> EngineResult<()>;

    async fn execute_query(&mut self, sql: &str, params: &[Value]) -> EngineResult<QueryOutput>;

    async fn is_connected(&mut self) -> bool;

    async fn begin_transaction(&mut self) -> EngineResult<()>;

    async fn commit(&mut self) -> EngineResult<()>;

    async fn rollback(&mut self) -> EngineResult<()>;

    fn in_transaction(&self) -> bool;
}
