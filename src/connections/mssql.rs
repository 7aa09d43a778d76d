//! Microsoft SQL Server connection
//!
//! Catalog helpers over the `sys.*` views, stored procedure calls and full
//! backups. Parameters use `@Pn` placeholders.
//!
//! No SQL Server driver is bundled; register one under the `mssql` scheme.

use serde::Serialize;
use tracing::info;

use crate::connections::{degrade, ensure_connected, fetch_rows, placeholders, strategy_connection};
use crate::engine::error::EngineResult;
use crate::engine::sql_safety::{escape_string_literal, validate_identifier, IdentifierCharset};
use crate::engine::traits::{ConnectionStrategy, DatabaseConnection};
use crate::engine::types::{QueryOutput, Row, Value, Vendor};

/// Schema assumed when a helper is not given one
pub const DEFAULT_SCHEMA: &str = "dbo";

pub struct MsSqlConnection {
    strategy: Box<dyn ConnectionStrategy>,
}

strategy_connection!(MsSqlConnection, Vendor::MsSql);

/// Database and server properties; each part is `None` when its query failed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MsSqlSettings {
    pub db_settings: Option<Row>,
    pub server_settings: Option<Row>,
}

const LINKED_SERVERS_SQL: &str = "SELECT name AS server_name, product AS product_name, \
     provider AS provider_name, data_source, catalog \
     FROM sys.servers WHERE is_linked = 1 ORDER BY name";

const DB_SETTINGS_SQL: &str = "SELECT name, recovery_model_desc AS recovery_model, \
     compatibility_level, collation_name, user_access_desc AS user_access, \
     state_desc AS state, is_read_only, is_auto_shrink_on, is_auto_close_on \
     FROM sys.databases WHERE name = DB_NAME()";

const SERVER_SETTINGS_SQL: &str = "SELECT SERVERPROPERTY('ProductVersion') AS version, \
     SERVERPROPERTY('Edition') AS edition, \
     SERVERPROPERTY('ProductLevel') AS level, \
     SERVERPROPERTY('ServerName') AS server_name";

const TABLES_SQL: &str = "SELECT t.name AS table_name, s.name AS schema_name, p.rows AS row_count, \
     CAST(ROUND((SUM(a.total_pages) * 8) / 1024.00, 2) AS DECIMAL(18,2)) AS size_mb \
     FROM sys.tables t \
     JOIN sys.schemas s ON t.schema_id = s.schema_id \
     JOIN sys.indexes i ON t.object_id = i.object_id \
     JOIN sys.partitions p ON i.object_id = p.object_id AND i.index_id = p.index_id \
     JOIN sys.allocation_units a ON p.partition_id = a.container_id \
     WHERE t.is_ms_shipped = 0 \
     GROUP BY t.name, s.name, p.rows \
     ORDER BY s.name, t.name";

const COLUMNS_SQL: &str = "SELECT c.name AS column_name, t.name AS data_type, c.max_length, \
     c.precision, c.scale, c.is_nullable, c.is_identity, c.column_id \
     FROM sys.columns c \
     JOIN sys.types t ON c.user_type_id = t.user_type_id \
     JOIN sys.tables tbl ON c.object_id = tbl.object_id \
     JOIN sys.schemas s ON tbl.schema_id = s.schema_id \
     WHERE tbl.name = @P1 AND s.name = @P2 \
     ORDER BY c.column_id";

const INDEXES_SQL: &str = "SELECT i.name AS index_name, i.type_desc AS index_type, i.is_unique, \
     i.is_primary_key, i.is_disabled, \
     STRING_AGG(c.name, ', ') WITHIN GROUP (ORDER BY ic.key_ordinal) AS columns \
     FROM sys.indexes i \
     JOIN sys.index_columns ic ON i.object_id = ic.object_id AND i.index_id = ic.index_id \
     JOIN sys.columns c ON ic.object_id = c.object_id AND ic.column_id = c.column_id \
     JOIN sys.tables t ON i.object_id = t.object_id \
     JOIN sys.schemas s ON t.schema_id = s.schema_id \
     WHERE t.name = @P1 AND s.name = @P2 \
     GROUP BY i.name, i.type_desc, i.is_unique, i.is_primary_key, i.is_disabled \
     ORDER BY i.name";

impl MsSqlConnection {
    /// Runs `EXEC name @P1, @P2, ...`.
    ///
    /// `name` may be multi-part and bracket-quoted (`[dbo].[usp_sync]`).
    pub async fn execute_stored_procedure(
        &mut self,
        name: &str,
        params: &[Value],
    ) -> EngineResult<QueryOutput> {
        ensure_connected(self).await?;
        validate_identifier("procedure", name, IdentifierCharset::Bracketed)?;

        let sql = if params.is_empty() {
            format!("EXEC {}", name)
        } else {
            format!(
                "EXEC {} {}",
                name,
                placeholders(params.len(), |i| format!("@P{}", i))
            )
        };
        self.execute_query(&sql, params).await
    }

    pub async fn get_linked_servers(&mut self) -> EngineResult<Vec<Row>> {
        ensure_connected(self).await?;
        fetch_rows(self, LINKED_SERVERS_SQL, &[]).await
    }

    pub async fn get_db_settings(&mut self) -> EngineResult<MsSqlSettings> {
        ensure_connected(self).await?;
        let db_settings = degrade("db_settings", fetch_rows(self, DB_SETTINGS_SQL, &[]).await)
            .and_then(|rows| rows.into_iter().next());
        let server_settings = degrade(
            "server_settings",
            fetch_rows(self, SERVER_SETTINGS_SQL, &[]).await,
        )
        .and_then(|rows| rows.into_iter().next());

        Ok(MsSqlSettings {
            db_settings,
            server_settings,
        })
    }

    /// Full backup of the configured database to `path` on the server.
    pub async fn backup_database(&mut self, path: &str) -> EngineResult<()> {
        ensure_connected(self).await?;
        let database = self.strategy.config().database.clone();
        validate_identifier("database", &database, IdentifierCharset::Bracketed)?;

        let sql = format!(
            "BACKUP DATABASE {} TO DISK = '{}' \
             WITH FORMAT, MEDIANAME = 'SQLServerBackup', NAME = 'Full Backup';",
            database,
            escape_string_literal(path)
        );
        self.execute_query(&sql, &[]).await?;
        info!(database = %database, path, "Backed up database");
        Ok(())
    }

    /// User tables with row counts and allocated size.
    pub async fn get_tables(&mut self) -> EngineResult<Vec<Row>> {
        ensure_connected(self).await?;
        fetch_rows(self, TABLES_SQL, &[]).await
    }

    /// `schema` defaults to `dbo`.
    pub async fn get_table_columns(
        &mut self,
        table: &str,
        schema: Option<&str>,
    ) -> EngineResult<Vec<Row>> {
        ensure_connected(self).await?;
        let params = [
            Value::from(table),
            Value::from(schema.unwrap_or(DEFAULT_SCHEMA)),
        ];
        fetch_rows(self, COLUMNS_SQL, &params).await
    }

    /// `schema` defaults to `dbo`.
    pub async fn get_table_indexes(
        &mut self,
        table: &str,
        schema: Option<&str>,
    ) -> EngineResult<Vec<Row>> {
        ensure_connected(self).await?;
        let params = [
            Value::from(table),
            Value::from(schema.unwrap_or(DEFAULT_SCHEMA)),
        ];
        fetch_rows(self, INDEXES_SQL, &params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::{ConnectionConfig, OPTION_DRIVER};
    use crate::engine::strategies::DirectStrategy;
    use crate::testing::{raw_rows, registry_with, MockDriver};

    async fn connected(driver: &MockDriver, database: &str) -> MsSqlConnection {
        let config = ConnectionConfig::new("sql01", 1433, "sa", "pw", database)
            .with_option(OPTION_DRIVER, "mock");
        let mut conn = MsSqlConnection::new(Box::new(DirectStrategy::new(
            config,
            registry_with(driver.clone()),
        )));
        conn.connect().await.expect("connect");
        conn
    }

    #[tokio::test]
    async fn stored_procedures_accept_bracketed_names() {
        let driver = MockDriver::new();
        let mut conn = connected(&driver, "Sales").await;

        conn.execute_stored_procedure("[dbo].[usp_sync]", &[Value::Int(7), Value::Bool(true)])
            .await
            .expect("exec");
        assert_eq!(
            driver.statements().last().map(String::as_str),
            Some("EXEC [dbo].[usp_sync] @P1, @P2")
        );

        assert!(conn
            .execute_stored_procedure("usp_sync'; SHUTDOWN --", &[])
            .await
            .expect_err("rejected")
            .is_configuration());
    }

    #[tokio::test]
    async fn backup_escapes_the_path() {
        let driver = MockDriver::new();
        let mut conn = connected(&driver, "Sales").await;

        conn.backup_database("D:\\backups\\o'brien.bak").await.expect("backup");

        let sql = driver.statements().last().cloned().unwrap_or_default();
        assert!(sql.starts_with("BACKUP DATABASE Sales TO DISK = 'D:\\backups\\o''brien.bak'"));
    }

    #[tokio::test]
    async fn backup_rejects_unsafe_database_names() {
        let driver = MockDriver::new();
        let mut conn = connected(&driver, "Sales; DROP DATABASE Sales").await;

        assert!(conn
            .backup_database("/tmp/x.bak")
            .await
            .expect_err("rejected")
            .is_configuration());
    }

    #[tokio::test]
    async fn db_settings_degrade_independently() {
        let driver = MockDriver::new();
        driver.fail_on("SYS.DATABASES", "VIEW DATABASE STATE permission denied");
        driver.respond(
            "SERVERPROPERTY",
            raw_rows(&["version", "edition"], vec![vec!["16.0.1000.6".into(), "Developer".into()]]),
        );
        let mut conn = connected(&driver, "Sales").await;

        let settings = conn.get_db_settings().await.expect("settings");

        assert!(settings.db_settings.is_none());
        assert_eq!(
            settings
                .server_settings
                .as_ref()
                .and_then(|row| row.get("edition"))
                .and_then(Value::as_str),
            Some("Developer")
        );
    }

    #[tokio::test]
    async fn table_columns_default_to_dbo() {
        let driver = MockDriver::new();
        let mut conn = connected(&driver, "Sales").await;

        conn.get_table_columns("Orders", None).await.expect("columns");
        assert_eq!(
            driver.executed().last().map(|(_, params)| params.clone()),
            Some(vec![Value::from("Orders"), Value::from("dbo")])
        );
    }
}
