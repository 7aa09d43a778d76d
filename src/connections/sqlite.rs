//! SQLite connection
//!
//! Owns its driver session directly: a local file needs no strategy. The
//! database file's directory must exist when the connection is built
//! (`:memory:` excepted); the file itself is created on first connect.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::connections::{ensure_connected, fetch_rows, first_text};
use crate::engine::config::{driver_base, is_sqlite_driver, ConnectionConfig};
use crate::engine::drivers::sqlite::MEMORY_DATABASE;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::registry::DriverRegistry;
use crate::engine::session::DriverSession;
use crate::engine::sql_safety::{validate_identifier, IdentifierCharset};
use crate::engine::traits::DatabaseConnection;
use crate::engine::types::{QueryOutput, Row, Value, Vendor};

const ALL_TABLES_SQL: &str = "SELECT name AS table_name, type AS table_type, sql \
     FROM sqlite_master \
     WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
     ORDER BY name";

pub struct SqliteConnection {
    config: ConnectionConfig,
    session: DriverSession,
}

impl SqliteConnection {
    /// Connection to the database file at `path` using the bundled driver.
    pub fn new(path: impl Into<String>) -> EngineResult<Self> {
        Self::from_config(
            ConnectionConfig::sqlite(path),
            Arc::new(DriverRegistry::with_defaults()),
        )
    }

    /// Builds from a config whose `database` is the file path.
    ///
    /// The `driver` option defaults to `sqlite`; any other driver family is
    /// rejected.
    pub fn from_config(
        mut config: ConnectionConfig,
        registry: Arc<DriverRegistry>,
    ) -> EngineResult<Self> {
        config.default_driver(Vendor::Sqlite.canonical_driver());
        if !is_sqlite_driver(config.driver()) {
            return Err(EngineError::configuration(format!(
                "SQLite connection cannot use driver '{}'",
                driver_base(config.driver())
            )));
        }
        check_parent_directory(&config.database)?;

        Ok(Self {
            config,
            session: DriverSession::new(registry),
        })
    }

    /// Database file path, or `:memory:`
    pub fn path(&self) -> &str {
        &self.config.database
    }

    /// Reads a PRAGMA, or sets it when `value` is given.
    ///
    /// `value` must be a bare token (`WAL`, `ON`) or a number. Returns the
    /// rows SQLite reports, which is usually nothing for a set.
    pub async fn pragma(&mut self, name: &str, value: Option<&str>) -> EngineResult<Vec<Row>> {
        ensure_connected(self).await?;
        validate_identifier("pragma", name, IdentifierCharset::Plain)?;

        let sql = match value {
            Some(value) => {
                if !is_pragma_value(value) {
                    return Err(EngineError::configuration(format!(
                        "Invalid PRAGMA value {:?}: expected a number or a bare word",
                        value
                    )));
                }
                format!("PRAGMA {} = {}", name, value)
            }
            None => format!("PRAGMA {}", name),
        };
        fetch_rows(self, &sql, &[]).await
    }

    /// One row per column, as reported by `PRAGMA table_info`.
    pub async fn get_table_info(&mut self, table: &str) -> EngineResult<Vec<Row>> {
        ensure_connected(self).await?;
        validate_identifier("table", table, IdentifierCharset::Plain)?;
        fetch_rows(self, &format!("PRAGMA table_info({})", table), &[]).await
    }

    /// User tables from `sqlite_master` with their DDL.
    pub async fn get_all_tables(&mut self) -> EngineResult<Vec<Row>> {
        ensure_connected(self).await?;
        fetch_rows(self, ALL_TABLES_SQL, &[]).await
    }

    pub async fn vacuum(&mut self) -> EngineResult<()> {
        ensure_connected(self).await?;
        self.execute_query("VACUUM", &[]).await?;
        info!(path = %self.config.database, "Database vacuumed");
        Ok(())
    }

    pub async fn get_sqlite_version(&mut self) -> EngineResult<Option<String>> {
        ensure_connected(self).await?;
        let rows = fetch_rows(self, "SELECT sqlite_version() AS version", &[]).await?;
        Ok(first_text(&rows, "version"))
    }
}

fn check_parent_directory(path: &str) -> EngineResult<()> {
    if path == MEMORY_DATABASE {
        return Ok(());
    }
    if path.is_empty() {
        return Err(EngineError::configuration("SQLite database path is empty"));
    }

    match Path::new(path).parent() {
        Some(dir) if !dir.as_os_str().is_empty() && !dir.is_dir() => {
            Err(EngineError::configuration(format!(
                "Directory for SQLite database does not exist: {}",
                dir.display()
            )))
        }
        _ => Ok(()),
    }
}

fn is_pragma_value(value: &str) -> bool {
    let word = !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    word || value.parse::<f64>().is_ok()
}

#[async_trait]
impl DatabaseConnection for SqliteConnection {
    fn vendor(&self) -> Vendor {
        Vendor::Sqlite
    }

    #[instrument(skip(self), fields(vendor = "sqlite", path = %self.config.database))]
    async fn connect(&mut self) -> EngineResult<()> {
        if self.session.is_open() {
            debug!("Already connected");
            return Ok(());
        }

        debug!(path = %self.config.database, "Connecting to SQLite database");
        let options = self.config.connection_options();
        self.session.open(&self.config, &options).await?;
        info!(path = %self.config.database, "Connected to SQLite database");
        Ok(())
    }

    #[instrument(skip(self), fields(vendor = "sqlite", path = %self.config.database))]
    async fn disconnect(&mut self) -> EngineResult<()> {
        let was_open = self.session.is_open();
        let result = self.session.close().await;
        if was_open {
            info!(path = %self.config.database, "Disconnected from SQLite database");
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
